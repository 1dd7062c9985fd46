//! Account schema for the credential lifecycle.
//!
//! Provides:
//! - `Account`: the persisted record, timestamps as epoch seconds
//! - `AccountDraft`: validated input for creation; the constructors make the
//!   provider/password pairing structural (credentials accounts always carry
//!   a hash, federated accounts never do)
//! - `PublicAccount`: the redacted view handed to clients
//!
//! Emails are lowercased and trimmed before they reach the store, so
//! uniqueness and lookups are case-insensitive everywhere by construction.

pub mod store;

use serde::{Deserialize, Serialize};

/// How the account authenticates. Fixed at creation, never migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Credentials,
    Federated,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Credentials => "credentials",
            Provider::Federated => "federated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credentials" => Some(Provider::Credentials),
            "federated" => Some(Provider::Federated),
            _ => None,
        }
    }
}

/// A decision room owned by the account. Room CRUD lives elsewhere; the
/// account only carries the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub name: String,
    pub description: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub vote_count: u32,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    /// Lowercase, globally unique.
    pub email: String,
    /// `Some` iff `provider == Credentials`.
    pub password_hash: Option<String>,
    pub name: String,
    pub picture: Option<String>,
    pub provider: Provider,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<i64>,
    pub reset_token: Option<String>,
    pub reset_expires_at: Option<i64>,
    pub last_login: i64,
    pub decisions: Vec<Decision>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    /// Replaces the pending verification code. The pair moves together; a
    /// resend invalidates whatever code was outstanding.
    pub fn set_verification_token(&mut self, token: String, expires_at: i64) {
        self.verification_token = Some(token);
        self.verification_expires_at = Some(expires_at);
    }

    /// Replaces the pending reset token, invalidating any outstanding one.
    pub fn set_reset_token(&mut self, token: String, expires_at: i64) {
        self.reset_token = Some(token);
        self.reset_expires_at = Some(expires_at);
    }

    pub fn redacted(&self) -> PublicAccount {
        PublicAccount {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
            provider: self.provider,
            is_verified: self.is_verified,
            last_login: self.last_login,
            decisions: self.decisions.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Client-facing projection: no password hash, no token material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub provider: Provider,
    pub is_verified: bool,
    pub last_login: i64,
    pub decisions: Vec<Decision>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Validated creation input. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct AccountDraft {
    pub email: String,
    pub password_hash: Option<String>,
    pub name: String,
    pub picture: Option<String>,
    pub provider: Provider,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<i64>,
}

impl AccountDraft {
    /// Draft for a password signup: unverified, carrying the pending
    /// verification code.
    pub fn credentials(
        email: &str,
        password_hash: String,
        name: &str,
        verification_token: String,
        verification_expires_at: i64,
    ) -> Self {
        Self {
            email: normalize_email(email),
            password_hash: Some(password_hash),
            name: name.trim().to_string(),
            picture: None,
            provider: Provider::Credentials,
            is_verified: false,
            verification_token: Some(verification_token),
            verification_expires_at: Some(verification_expires_at),
        }
    }

    /// Draft for a federated signup: verified from the start, no password.
    pub fn federated(email: &str, name: &str, picture: Option<String>) -> Self {
        Self {
            email: normalize_email(email),
            password_hash: None,
            name: name.trim().to_string(),
            picture,
            provider: Provider::Federated,
            is_verified: true,
            verification_token: None,
            verification_expires_at: None,
        }
    }
}

/// Canonical address form used for storage and lookups alike.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
