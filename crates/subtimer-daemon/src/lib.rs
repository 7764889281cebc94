//! Subtimer Daemon Library
//!
//! Timeout coordination exposed as a library for embedding and testing.

pub mod config;
pub mod console;
pub mod event_manager;
pub mod timeout;

pub use config::ConfigManager;
pub use console::{Command, Console};
pub use event_manager::EventManager;
pub use timeout::{TimeoutCoordinator, TimeoutEvent, TimeoutEventType, TimeoutHandler};
