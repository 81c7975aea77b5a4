//! AES-128 block decryption, used to unwrap metadata sections 2/3, record
//! entries, and CMP compressed blocks. Built on the `aes` crate (paired
//! with `sha2` the same way `tchaikov-ceph`'s `auth` crate pulls both for
//! its own password/session-key handling) rather than a hand-rolled
//! S-box/key-schedule implementation.
//!
//! MED encrypts each 16-byte block independently (no chaining across
//! blocks within a record/metadata section/CMP block — every block is
//! keyed from the same derived key and decrypted in place), so this is a
//! thin wrapper around the raw block cipher rather than a block-mode
//! (CBC/CTR/etc.) construction.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cipher::generic_array::GenericArray;

/// An expanded AES-128 key ready to decrypt (or, for round-tripping in
/// tests, encrypt) independent 16-byte blocks.
pub struct Aes128Key(Aes128);

impl Aes128Key {
    /// Expands a 16-byte key.
    #[must_use]
    pub fn new(key_bytes: [u8; 16]) -> Self {
        Self(Aes128::new(GenericArray::from_slice(&key_bytes)))
    }

    /// Decrypts a single 16-byte block in place.
    pub fn decrypt_block(&self, block: &mut [u8; 16]) {
        let mut ga = GenericArray::clone_from_slice(block);
        self.0.decrypt_block(&mut ga);
        block.copy_from_slice(&ga);
    }

    /// Decrypts every full 16-byte block in `data` in place. A trailing
    /// partial block (fewer than 16 bytes) is left untouched, matching the
    /// source's "encryptable blocks" capping rule (see
    /// [`crate::cmp::decrypt_region`]).
    pub fn decrypt_blocks_in_place(&self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(16) {
            let mut block = [0u8; 16];
            block.copy_from_slice(chunk);
            self.decrypt_block(&mut block);
            chunk.copy_from_slice(&block);
        }
    }

    /// Encrypts a single 16-byte block in place. Only used by this crate's
    /// write-side test fixtures; the read path never encrypts.
    #[cfg(test)]
    pub fn encrypt_block(&self, block: &mut [u8; 16]) {
        let mut ga = GenericArray::clone_from_slice(block);
        self.0.encrypt_block(&mut ga);
        block.copy_from_slice(&ga);
    }

    #[cfg(test)]
    pub fn encrypt_blocks_in_place(&self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(16) {
            let mut block = [0u8; 16];
            block.copy_from_slice(chunk);
            self.encrypt_block(&mut block);
            chunk.copy_from_slice(&block);
        }
    }
}
