//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry sweep: Removes expired cache entries at configured intervals

mod sweeper;

pub use sweeper::{run_sweeper, spawn_sweeper};
