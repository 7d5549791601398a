//! Session-bound CSRF tokens.
//!
//! A token is `nonce.signature` where the signature is an HMAC-SHA256 over
//! the session binding (hash of the session token) and the nonce. Tokens are
//! derived on demand and never stored.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header browsers must echo on state-changing requests
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Readable cookie that carries the token to the page
pub const CSRF_COOKIE: &str = "csrf_token";

pub struct CsrfProtection {
    secret: Vec<u8>,
}

impl CsrfProtection {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, binding: &str, nonce: &str) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(binding.as_bytes());
        mac.update(b".");
        mac.update(nonce.as_bytes());
        mac
    }

    /// Issue a fresh token bound to `binding`
    pub fn issue(&self, binding: &str) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let nonce = hex::encode(nonce);
        let signature = hex::encode(self.mac(binding, &nonce).finalize().into_bytes());
        format!("{}.{}", nonce, signature)
    }

    /// Constant-time check that `token` was issued for `binding`
    pub fn verify(&self, binding: &str, token: &str) -> bool {
        let Some((nonce, signature)) = token.split_once('.') else {
            return false;
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        if nonce.len() != 32 {
            return false;
        }
        self.mac(binding, nonce).verify_slice(&signature).is_ok()
    }
}
