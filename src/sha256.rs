//! SHA-256, used only for password validation (see [`crate::password`]).
//! Built on the `sha2` crate (the same pairing `tchaikov-ceph`'s `auth`
//! crate uses for its own key material), not hand-rolled.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `bytes`.
#[must_use]
pub fn hash(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
