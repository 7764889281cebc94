pub mod coordinator;
pub mod events;
pub mod handler;


pub use coordinator::TimeoutCoordinator;
pub use events::{TimeoutEvent, TimeoutEventType};
pub use handler::{NoopHandler, TimeoutHandler};
