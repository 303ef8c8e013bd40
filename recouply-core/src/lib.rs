//! Core functionality for the Recouply login guard
//!
//! This crate contains the attempt log types, the lockout configuration and
//! policy, the repository trait storage backends implement, and the
//! [`LockoutService`] that evaluates and records login attempts.
//!
//! Storage backends depend on this crate and implement
//! [`LoginAttemptRepository`]. The HTTP surface depends on it for
//! [`LockoutService`] and the [`Error`] taxonomy.
pub mod config;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod validation;

pub use config::{FailMode, KeyStrategy, LockoutConfig, LockoutPolicy};
pub use error::Error;
pub use events::{Event, EventBus, EventHandler};
pub use repositories::{LoginAttemptRepository, MemoryLoginAttemptRepository};
pub use services::LockoutService;
pub use storage::{
    AppendOutcome, AttemptKey, AttemptStats, LockoutStatus, LoginAttempt, NewLoginAttempt,
    RecordOutcome,
};
