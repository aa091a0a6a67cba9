//! HTTP handlers for invite-service.

pub mod health;
pub mod invitation;

pub use health::*;
pub use invitation::*;
