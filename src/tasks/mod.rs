//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Collection sweep: delivers notifications for values that were dropped

mod sweep;

pub(crate) use sweep::spawn_sweep_task;
