//! Repository traits for the data access layer
//!
//! The lockout service talks to storage only through [`LoginAttemptRepository`].
//! Storage backends implement it; [`MemoryLoginAttemptRepository`] is the
//! in-process implementation shipped with the core crate.

pub mod login_attempt;
pub mod memory;

pub use login_attempt::LoginAttemptRepository;
pub use memory::MemoryLoginAttemptRepository;
