// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Request signing for the Atom API.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `data` keyed with `credential`.
///
/// Streams without a credential are sent unsigned, so an empty credential
/// yields an empty signature.
pub fn sign(credential: &str, data: &str) -> String {
    if credential.is_empty() {
        return String::new();
    }
    // HMAC accepts keys of any length
    let Ok(mut mac) = HmacSha256::new_from_slice(credential.as_bytes()) else {
        return String::new();
    };
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        assert_eq!(
            sign("key", "The quick brown fox jumps over the lazy dog"),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_sign_without_credential_is_empty() {
        assert_eq!(sign("", "[\"a\"]"), "");
    }

    #[test]
    fn test_sign_depends_on_data() {
        assert_ne!(sign("key", "[\"a\"]"), sign("key", "[\"b\"]"));
        assert_eq!(sign("key", "[\"a\"]").len(), 64);
    }
}
