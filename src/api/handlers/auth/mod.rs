//! Auth handlers and supporting modules.
//!
//! This module coordinates credential and OAuth sign-in, session management,
//! one-time-code verification, and password reset.
//!
//! ## Session lifecycle
//!
//! A session is created at login or OAuth callback, validated lazily on each
//! request, optionally extended by the client keep-alive via
//! `/v1/auth/session/refresh`, and ends at logout or expiry. Validation
//! fails closed in every unhappy path.
//!
//! ## Rate limiting
//!
//! Every unauthenticated mutation (register, login, send-code, verify-otp,
//! reset-password) is throttled per client IP and per identifier before any
//! database or credential work happens.
//!
//! ## Account enumeration
//!
//! Send and verify endpoints answer identically for known and unknown
//! identifiers, and login failures share one message regardless of cause.

pub mod error;
pub(crate) mod login;
pub mod oauth;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod reset;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, RateLimiter};
pub use state::{AuthConfig, AuthState};
