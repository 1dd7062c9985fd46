//! Credential and session backend for Quorum decision rooms.
//!
//! The service owns the account lifecycle: password signup with deferred
//! email verification, password reset over time-bound tokens, stateless JWT
//! cookie sessions, and Google sign-in that merges onto an existing account
//! by email. Decision-room content itself lives with the accounts only as an
//! owned collection; room CRUD is a separate concern.
//!
//! Layering, leaves first: [`account`] defines the record and its SQLite
//! store, [`token`]/[`password`]/[`session`] handle the credential material,
//! [`mailer`] delivers side-effect email, [`flow`] orchestrates all of it,
//! and [`gateway`] exposes the HTTP contract.

pub mod account;
pub mod config;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod mailer;
pub mod password;
pub mod session;
pub mod token;
