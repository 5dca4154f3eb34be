//! Update prioritization: lane bitmasks and the external scheduler bridge.

pub mod lanes;
pub mod task;

pub use lanes::{lanes_to_priority, priority_to_lane, Lanes};
pub use task::{
    FrameScheduler, ManualScheduler, TaskCallback, TaskHandle, TaskOutcome, TaskPriority,
    TaskScheduler,
};
