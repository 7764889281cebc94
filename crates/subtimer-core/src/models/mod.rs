pub mod config;
pub mod timeout;

pub use config::{Config, CoordinatorConfig, DaemonConfig, WarningPolicy};
pub use timeout::{Extension, TimeoutRecord, TimeoutSpec, TimeoutStatus};
