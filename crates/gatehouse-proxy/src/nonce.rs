use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;

/// Raw nonce length before base64 encoding
pub const NONCE_BYTES: usize = 16;

/// Single-use nonces authorizing the inline script and style blocks of one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonces {
    pub script: String,
    pub style: String,
}

impl Nonces {
    /// Draw both nonces from the operating system CSPRNG
    pub fn generate() -> Self {
        Self {
            script: random_nonce(),
            style: random_nonce(),
        }
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
