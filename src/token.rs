//! Opaque token generation and digesting (C1).
//!
//! Only digests are ever persisted; plaintext tokens exist solely in the
//! response that hands them to the caller.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const CHALLENGE_TOKEN_BYTES: usize = 32;
const REFRESH_TOKEN_BYTES: usize = 48;

pub fn generate_challenge_token() -> String {
  generate_token(CHALLENGE_TOKEN_BYTES)
}

pub fn generate_refresh_token() -> String {
  generate_token(REFRESH_TOKEN_BYTES)
}

fn generate_token(len: usize) -> String {
  let mut buf = vec![0u8; len];
  OsRng.fill_bytes(&mut buf);
  URL_SAFE_NO_PAD.encode(buf)
}

pub fn digest(token: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(token.as_bytes());
  hex::encode(hasher.finalize())
}
