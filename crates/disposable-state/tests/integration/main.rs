// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod config;
pub mod consumers;
pub mod metrics;
pub mod parent_cache;
pub mod tokio_timer;

pub use utils::*;
