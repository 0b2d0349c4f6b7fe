//! # Sano (Account & Session Service)
//!
//! `sano` is the account backend for the Sano health platform. It handles
//! credential and OAuth sign-in, session lifecycle, one-time-code
//! verification over email/SMS, and password reset.
//!
//! ## Sessions
//!
//! Sessions are opaque bearer tokens delivered in an `HttpOnly` cookie and
//! stored server-side as SHA-256 hashes. Validation fails closed: a missing,
//! malformed, expired, or revoked token is indistinguishable from "no
//! session". Expiry is checked lazily at lookup time; there is no background
//! sweep.
//!
//! ## Verification & reset
//!
//! One-time codes are 6-digit numeric values with a single live code per
//! (user, purpose). Consumption is a single conditional `UPDATE`, so two
//! concurrent attempts against the same code can never both succeed.
//! Password resets are authorized by a single-use opaque token issued only
//! after a successful reset-code verification.
//!
//! ## Authorization
//!
//! Roles live in the `users` table and are resolved from the validated
//! session on every request. No client-supplied flag is ever trusted for
//! authorization decisions.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
