#![no_std]

// Shared crate for the network driver layer
// Scheduler-facing primitives: tick clock, task creation and notification

pub mod task;
pub mod timer;

// Re-export commonly used types
pub use task::{
    TaskEntry, TaskHandle, TaskNotifier, TaskPriority, TaskSpawner, TaskSpec, MINIMAL_STACK_SIZE,
};
pub use timer::{Clock, TickClock};
