//! Deterministic content encryption.
//!
//! Blocks, paths and metadata are all encrypted with AES-128-GCM under a key
//! derived from the user's passphrase (SHA3-256, truncated to the key size).
//! The nonce is not random: it is an HMAC-SHA256 of the plaintext under the
//! same key, truncated to 16 bytes. Identical plaintext therefore always
//! produces identical ciphertext, which is what makes block-level dedup and
//! encrypted-path addressing work across files and across runs. The price is
//! that the server can tell when two blocks are equal; it still cannot read
//! either of them.
//!
//! The encrypted envelope is `nonce (16) || tag (16) || ciphertext`.
//!
//! An empty passphrase disables encryption entirely: encrypt and decrypt
//! become the identity function.

use {
    aes_gcm::{aead::AeadInPlace, aes::Aes128, AesGcm, Key, KeyInit, Nonce, Tag},
    anyhow::{anyhow, bail, Result},
    blockhaus_protocol::{EncryptedMeta, EncryptedPath, NodeMeta, TreePath},
    generic_array::typenum::U16,
    hmac::{Hmac, Mac},
    sha2::Sha256,
    sha3::{Digest, Sha3_256},
};

type ContentAead = AesGcm<Aes128, U16>;

const KEY_LEN: usize = 16;
pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
/// Fixed size overhead of an encrypted envelope.
pub const ENVELOPE_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

struct Keyed {
    aead: ContentAead,
    key: [u8; KEY_LEN],
}

pub struct Cipher {
    keyed: Option<Keyed>,
}

impl Cipher {
    /// An empty passphrase selects plaintext mode.
    pub fn new(passphrase: &str) -> Self {
        if passphrase.is_empty() {
            return Self { keyed: None };
        }
        let digest = Sha3_256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest[..KEY_LEN]);
        Self {
            keyed: Some(Keyed {
                aead: ContentAead::new(Key::<ContentAead>::from_slice(&key)),
                key,
            }),
        }
    }

    pub fn is_plaintext(&self) -> bool {
        self.keyed.is_none()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(keyed) = &self.keyed else {
            return Ok(plaintext.to_vec());
        };
        let nonce_bytes = keyed.derive_nonce(plaintext);
        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);
        let mut buf = plaintext.to_vec();
        let tag = keyed
            .aead
            .encrypt_in_place_detached(nonce, b"", &mut buf)
            .map_err(|_| anyhow!("encryption failed"))?;
        let mut out = Vec::with_capacity(ENVELOPE_OVERHEAD + buf.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&buf);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let Some(keyed) = &self.keyed else {
            return Ok(data.to_vec());
        };
        if data.len() < ENVELOPE_OVERHEAD {
            bail!("encrypted data is too short: {} bytes", data.len());
        }
        let nonce = Nonce::<U16>::from_slice(&data[..NONCE_LEN]);
        let tag = Tag::<U16>::from_slice(&data[NONCE_LEN..ENVELOPE_OVERHEAD]);
        let mut buf = data[ENVELOPE_OVERHEAD..].to_vec();
        keyed
            .aead
            .decrypt_in_place_detached(nonce, b"", &mut buf, tag)
            .map_err(|_| anyhow!("authentication failed"))?;
        Ok(buf)
    }

    pub fn encrypt_tree_path(&self, path: &TreePath, is_dir: bool) -> Result<EncryptedPath> {
        Ok(EncryptedPath(self.encrypt(path.to_wire(is_dir).as_bytes())?))
    }

    pub fn decrypt_tree_path(&self, path: &EncryptedPath) -> Result<(TreePath, bool)> {
        let plaintext = self.decrypt(&path.0)?;
        TreePath::from_wire(&String::from_utf8(plaintext)?)
    }

    pub fn encrypt_meta(&self, meta: &NodeMeta) -> Result<EncryptedMeta> {
        Ok(EncryptedMeta(self.encrypt(&serde_json::to_vec(meta)?)?))
    }

    pub fn decrypt_meta(&self, meta: &EncryptedMeta) -> Result<NodeMeta> {
        Ok(serde_json::from_slice(&self.decrypt(&meta.0)?)?)
    }
}

impl Keyed {
    fn derive_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(plaintext);
        let digest = mac.finalize().into_bytes();
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn cipher() -> Cipher {
        Cipher::new("correct horse battery staple")
    }

    #[test]
    fn roundtrip() {
        let cipher = cipher();
        let plaintext = b"some file content".to_vec();
        let encrypted = cipher.encrypt(&plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(encrypted.len(), plaintext.len() + ENVELOPE_OVERHEAD);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn encryption_is_deterministic() {
        let cipher = cipher();
        let a = cipher.encrypt(b"identical block").unwrap();
        let b = cipher.encrypt(b"identical block").unwrap();
        assert_eq!(a, b);

        // A fresh cipher from the same passphrase gives the same bytes too,
        // which is what makes dedup work across runs.
        let c = Cipher::new("correct horse battery staple")
            .encrypt(b"identical block")
            .unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn distinct_plaintexts_give_distinct_ciphertexts() {
        let cipher = cipher();
        let a = cipher.encrypt(b"block one").unwrap();
        let b = cipher.encrypt(b"block two").unwrap();
        assert_ne!(a, b);

        let other_key = Cipher::new("a different passphrase");
        assert_ne!(other_key.encrypt(b"block one").unwrap(), a);
    }

    #[test]
    fn tampering_is_detected() {
        let cipher = cipher();
        let mut encrypted = cipher.encrypt(b"block").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 1;
        cipher.decrypt(&encrypted).unwrap_err();

        cipher.decrypt(&[0u8; 5]).unwrap_err();
    }

    #[test]
    fn plaintext_mode_is_identity() {
        let cipher = Cipher::new("");
        assert!(cipher.is_plaintext());
        let data = b"not a secret".to_vec();
        assert_eq!(cipher.encrypt(&data).unwrap(), data);
        assert_eq!(cipher.decrypt(&data).unwrap(), data);
    }

    #[test]
    fn path_roundtrip_keeps_kind_marker() {
        let cipher = cipher();
        let path: TreePath = "photos/2024/cat.jpg".parse().unwrap();

        let encrypted = cipher.encrypt_tree_path(&path, false).unwrap();
        assert_eq!(
            cipher.decrypt_tree_path(&encrypted).unwrap(),
            (path.clone(), false)
        );

        let encrypted_dir = cipher.encrypt_tree_path(&path, true).unwrap();
        assert_ne!(encrypted, encrypted_dir);
        assert_eq!(
            cipher.decrypt_tree_path(&encrypted_dir).unwrap(),
            (path, true)
        );
    }

    #[test]
    fn meta_roundtrip() {
        let cipher = cipher();
        let meta = NodeMeta {
            mode: 0o644,
            mtime: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            size: Some(12345),
        };
        let encrypted = cipher.encrypt_meta(&meta).unwrap();
        assert_eq!(cipher.decrypt_meta(&encrypted).unwrap(), meta);
    }
}
