//! Service layer for business logic
//!
//! Services sit between the HTTP surface and the repositories.

pub mod lockout;

pub use lockout::LockoutService;
