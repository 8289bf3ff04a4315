//! Credential protection.
//!
//! The credential is part of the connection descriptor but is never logged,
//! serialized, or displayed. It is zeroed when the last copy is dropped, so
//! its lifetime is bounded by the workflow session that owns it.

mod credentials;

pub use credentials::Credential;
