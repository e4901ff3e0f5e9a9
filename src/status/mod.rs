//! Monitor status: the state machine and the events it produces.

pub mod events;
pub mod machine;

pub use events::{MonitorEvent, MonitorListener, Status, StatusEvent};
pub use machine::StatusMachine;
