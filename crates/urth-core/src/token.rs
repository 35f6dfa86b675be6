// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Opaque bearer tokens.
//!
//! Tokens are handed out once and only their SHA-256 digest is persisted.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// A secret bearer token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    /// Mint a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Hex SHA-256 digest, as stored.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }

    /// True if this token hashes to `digest`.
    pub fn matches_digest(&self, digest: &str) -> bool {
        self.digest() == digest
    }

    /// The raw token value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True for the empty token.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ApiToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ApiToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = ApiToken::generate();
        let b = ApiToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), 43);
    }

    #[test]
    fn test_digest_matches() {
        let token = ApiToken::from("secret");
        assert_eq!(
            token.digest(),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
        assert!(token.matches_digest(&token.digest()));
        assert!(!ApiToken::from("other").matches_digest(&token.digest()));
    }

    #[test]
    fn test_debug_redacts() {
        let token = ApiToken::from("secret");
        assert_eq!(format!("{token:?}"), "ApiToken(***)");
    }
}
