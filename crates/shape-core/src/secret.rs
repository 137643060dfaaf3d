//! Digests for write-only credentials.
//!
//! Root passwords and authorized SSH keys are accepted by the provider on disk
//! creation but can never be read back. State keeps a digest instead of the
//! plaintext so a changed credential still shows up as drift.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Digest a secret for storage in state.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    STANDARD.encode(blake3::hash(secret.as_bytes()).as_bytes())
}

/// Digest a list of authorized keys; order matters, as it does on the host.
#[must_use]
pub fn authorized_keys_state<S: AsRef<str>>(keys: &[S]) -> String {
    let joined = keys.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n");
    hash_secret(&joined)
}
