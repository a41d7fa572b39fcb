//! joblimit - bounded-concurrency job limiter
//!
//! Runs async jobs so that at most N are in flight at once. Jobs submitted
//! while every slot is busy wait in a FIFO queue and start, oldest first, as
//! running jobs finish.
//!
//! # Example
//!
//! ```ignore
//! use joblimit::Limiter;
//!
//! let limiter = Limiter::new(2);
//!
//! let a = limiter.submit(|| fetch("a"));
//! let b = limiter.submit(|| fetch("b"));
//! let c = limiter.submit(|| fetch("c")); // waits for a or b
//! assert_eq!(limiter.queue_depth(), 1);
//!
//! let pages = limiter.map(urls, |url| fetch(url)).await?;
//! ```
//!
//! # Modules
//!
//! - [`limiter`] - the limiter, its configuration and snapshots
//! - [`error`] - errors delivered through job handles
//! - [`config`] - configuration file loading for the `jl` binary
//! - [`demo`] - simulated workload driven by `jl`
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod limiter;

pub use config::{Config, DemoConfig};
pub use error::LimitError;
pub use limiter::{JobHandle, Limiter, LimiterConfig, LimiterState, LimiterStats};
