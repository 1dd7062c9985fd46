//! Minting for the two time-bound, single-use tokens.
//!
//! Verification codes are short because a person retypes them; reset tokens
//! ride inside a link, so they carry full 160-bit entropy. Both are validated
//! lazily at consumption time; nothing sweeps expired rows in the background.

use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

/// Verification codes stay valid for 24 hours.
pub const VERIFICATION_CODE_TTL_SECS: i64 = 24 * 3600;

/// Reset tokens stay valid for 1 hour.
pub const RESET_TOKEN_TTL_SECS: i64 = 3600;

/// Reset token byte length before hex encoding (20 bytes = 40 hex chars).
const RESET_TOKEN_BYTES: usize = 20;

/// Rejection-sampling ceiling: largest multiple of 1e6 that fits in a u32.
const CODE_DRAW_LIMIT: u32 = (u32::MAX / 1_000_000) * 1_000_000;

/// A six-digit verification code, uniform over `000000..=999999`.
/// Leading zeros are preserved; the code is always exactly six characters.
pub fn mint_verification_code() -> String {
    loop {
        let mut bytes = [0u8; 4];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let draw = u32::from_be_bytes(bytes);
        if draw < CODE_DRAW_LIMIT {
            return format!("{:06}", draw % 1_000_000);
        }
    }
}

/// A password-reset token: 20 random bytes, hex-encoded.
pub fn mint_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_codes_are_six_digits_with_leading_zeros() {
        for _ in 0..256 {
            let code = mint_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()), "code: {code}");
        }
    }

    #[test]
    fn verification_codes_vary() {
        let a = mint_verification_code();
        let distinct = (0..64).any(|_| mint_verification_code() != a);
        assert!(distinct, "64 consecutive draws all returned {a}");
    }

    #[test]
    fn reset_tokens_are_fixed_length_hex() {
        let token = mint_reset_token();
        assert_eq!(token.len(), RESET_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(mint_reset_token(), token);
    }

    #[test]
    fn epoch_advances() {
        let t = epoch_secs();
        assert!(t > 1_700_000_000, "clock looks wrong: {t}");
    }
}
