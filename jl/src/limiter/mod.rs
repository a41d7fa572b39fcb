//! Bounded-concurrency job limiter
//!
//! Admits at most `concurrency` jobs at once, queues the rest in submission
//! order, and drains the queue as running jobs finish.

mod config;
mod core;
mod job;
mod map;
mod state;

pub use config::LimiterConfig;
pub use self::core::Limiter;
pub use job::JobHandle;
pub use state::{LimiterState, LimiterStats};
