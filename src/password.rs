//! Password hashing on PBKDF2-SHA256 in PHC string format.
//!
//! Hashes carry their own salt and parameters, so verification needs nothing
//! beyond the stored string. `dummy_verify` burns the same derivation cost on
//! lookups that found no account, keeping login timing flat for unknown
//! addresses.

use anyhow::{anyhow, Result};
use pbkdf2::password_hash::rand_core::OsRng;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;

/// Hash a plaintext password into a self-describing PHC string.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hashed = Pbkdf2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hashed.to_string())
}

/// Check a plaintext password against a stored PHC string.
pub fn verify(password: &str, phc_hash: &str) -> bool {
    match PasswordHash::new(phc_hash) {
        Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "stored password hash failed to parse");
            false
        }
    }
}

/// Burn one full derivation and discard it. Called when no account matched
/// so the unknown-address path costs the same as a real verification.
pub fn dummy_verify(password: &str) {
    let _ = hash(password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let hashed = hash("correct horse battery staple").unwrap();
        assert!(hashed.starts_with("$pbkdf2-sha256$"));
        assert!(verify("correct horse battery staple", &hashed));
        assert!(!verify("correct horse battery stapler", &hashed));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash("hunter2").unwrap();
        let b = hash("hunter2").unwrap();
        assert_ne!(a, b);
        assert!(verify("hunter2", &a));
        assert!(verify("hunter2", &b));
    }

    #[test]
    fn garbage_stored_hash_never_verifies() {
        assert!(!verify("anything", "not-a-phc-string"));
        assert!(!verify("anything", ""));
    }
}
