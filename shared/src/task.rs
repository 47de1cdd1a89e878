// Task creation for long-lived driver workers

extern crate alloc;

use alloc::boxed::Box;

/// Scheduler priority of a task (higher runs first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskPriority(pub u8);

impl TaskPriority {
    /// Number of priority levels the scheduler is configured with
    pub const MAX_PRIORITIES: u8 = 8;

    /// Highest priority an application task may use
    pub const fn highest() -> Self {
        TaskPriority(Self::MAX_PRIORITIES - 1)
    }
}

/// Minimal stack size of a task, in words
pub const MINIMAL_STACK_SIZE: usize = 1024;

/// Parameters of a task to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: &'static str,
    /// Stack depth in words
    pub stack_size: usize,
    pub priority: TaskPriority,
}

/// Handle to a created task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(pub u32);

/// Entry point of a task; tasks never return
pub type TaskEntry = Box<dyn FnOnce() + Send + 'static>;

/// Scheduler interface used to create tasks
pub trait TaskSpawner: Send + Sync {
    /// Create a task running `entry`
    ///
    /// Returns `None` if the scheduler could not allocate the task.
    fn spawn(&self, spec: TaskSpec, entry: TaskEntry) -> Option<TaskHandle>;
}

/// Direct-to-task notification used to wake a deferred interrupt task
///
/// Maps onto the scheduler's task notification value: interrupt handlers OR
/// bits into it, the task blocks until it is non-zero. Implementations must
/// not busy-wait in [`TaskNotifier::wait`].
pub trait TaskNotifier: Send + Sync {
    /// OR `bits` into the notification value and wake the waiting task
    ///
    /// Called from interrupt context; must not block.
    fn notify_from_isr(&self, bits: u32);

    /// Block until the value is non-zero or `timeout_ms` elapses
    ///
    /// Returns the value and clears it; `0` means the wait timed out.
    fn wait(&self, timeout_ms: u64) -> u32;

    /// Current value without clearing it
    fn pending(&self) -> u32;
}
