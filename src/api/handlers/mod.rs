//! API route handlers for Sano.

pub mod auth;
pub mod health;
pub mod me;
