pub mod attempts;
pub mod attendance;
pub mod calc;
pub mod core;
pub mod grades;
pub mod grading;
pub mod progress;
pub mod snapshot;

mod helpers;
