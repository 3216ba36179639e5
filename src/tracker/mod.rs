//! GPS Tracking Module
//!
//! The tracking state machine, the callback pipeline feeding it, and the
//! session persistence glue.

mod machine;
mod pipeline;
mod session;

pub use machine::{GpsTracker, TrackerHandle};
pub use pipeline::FixPipeline;
pub use session::{SessionSnapshot, SessionStore};
