//! Keyed cryptographic primitives shared by processors and the identifier pass

use crate::deid::config::settings::HashAlgorithm;
use crate::domain::ProcessingError;
use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

const IV_LEN: usize = 16;

fn crypto_err(context: &str, err: impl std::fmt::Display) -> ProcessingError {
    ProcessingError::Crypto(format!("{context}: {err}"))
}

/// HMAC-SHA256 of `data` under `key`
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], ProcessingError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| crypto_err("hmac key", e))?;
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Hex-encoded HMAC of `data` under `key` with the chosen digest
pub fn hmac_hex(algorithm: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<String, ProcessingError> {
    let digest = match algorithm {
        HashAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(key).map_err(|e| crypto_err("hmac key", e))?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha256 => hmac_sha256(key, data)?.to_vec(),
        HashAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(key).map_err(|e| crypto_err("hmac key", e))?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(hex::encode(digest))
}

/// Deterministic offset in `[-range, range]` derived from a keyed hash of `scope_key`
pub fn keyed_offset(key: &[u8], scope_key: &str, range: u32) -> Result<i64, ProcessingError> {
    let digest = hmac_sha256(key, scope_key.as_bytes())?;
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let modulus = 2 * u64::from(range) + 1;
    Ok((u64::from_be_bytes(head) % modulus) as i64 - i64::from(range))
}

/// UUID derived from a keyed hash of `value`
///
/// The first 16 digest bytes become a version-4-shaped UUID so the output is a valid
/// identifier in every reference shape, including `urn:uuid:`.
pub fn keyed_uuid(key: &[u8], value: &str) -> Result<uuid::Uuid, ProcessingError> {
    let digest = hmac_sha256(key, value.as_bytes())?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

/// AES-CBC encryption with PKCS#7 padding
///
/// The key length selects AES-128, AES-192 or AES-256. A random IV is prepended to
/// the ciphertext and the whole is base64-encoded.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<String, ProcessingError> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(|e| crypto_err("aes key", e))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, &iv)
            .map_err(|e| crypto_err("aes key", e))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, &iv)
            .map_err(|e| crypto_err("aes key", e))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        other => {
            return Err(ProcessingError::Crypto(format!(
                "encryption key must be 16, 24 or 32 bytes, got {other}"
            )))
        }
    };

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Reverses [`encrypt`] for key holders
pub fn decrypt(key: &[u8], encoded: &str) -> Result<Vec<u8>, ProcessingError> {
    let data = BASE64
        .decode(encoded.trim())
        .map_err(|e| crypto_err("base64", e))?;
    if data.len() < IV_LEN {
        return Err(ProcessingError::Crypto("ciphertext too short".to_string()));
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);

    let plaintext = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|e| crypto_err("aes key", e))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|e| crypto_err("aes key", e))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|e| crypto_err("aes key", e))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        other => {
            return Err(ProcessingError::Crypto(format!(
                "encryption key must be 16, 24 or 32 bytes, got {other}"
            )))
        }
    };
    plaintext.map_err(|e| crypto_err("padding", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let digest = hmac_hex(HashAlgorithm::Sha256, b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test_case(HashAlgorithm::Sha1, 40 ; "sha1")]
    #[test_case(HashAlgorithm::Sha256, 64 ; "sha256")]
    #[test_case(HashAlgorithm::Sha512, 128 ; "sha512")]
    fn test_hmac_hex_lengths(algorithm: HashAlgorithm, len: usize) {
        let a = hmac_hex(algorithm, b"key", b"value").unwrap();
        let b = hmac_hex(algorithm, b"key", b"value").unwrap();
        assert_eq!(a.len(), len);
        assert_eq!(a, b);
        assert_ne!(a, hmac_hex(algorithm, b"other", b"value").unwrap());
    }

    #[test]
    fn test_keyed_offset_in_range_and_deterministic() {
        for scope in ["a", "b", "patient-1", ""] {
            let offset = keyed_offset(b"secret", scope, 50).unwrap();
            assert!((-50..=50).contains(&offset));
            assert_eq!(offset, keyed_offset(b"secret", scope, 50).unwrap());
        }
    }

    #[test]
    fn test_keyed_uuid_is_stable_v4_shape() {
        let a = keyed_uuid(b"k", "example").unwrap();
        assert_eq!(a, keyed_uuid(b"k", "example").unwrap());
        assert_ne!(a, keyed_uuid(b"k", "example2").unwrap());
        assert_eq!(a.get_version_num(), 4);
    }

    #[test_case(16 ; "aes128")]
    #[test_case(24 ; "aes192")]
    #[test_case(32 ; "aes256")]
    fn test_encrypt_decrypt(key_len: usize) {
        let key = vec![7u8; key_len];
        let encoded = encrypt(&key, b"Chalmers").unwrap();
        assert_ne!(encoded, encrypt(&key, b"Chalmers").unwrap());
        assert_eq!(decrypt(&key, &encoded).unwrap(), b"Chalmers");
    }

    #[test]
    fn test_encrypt_rejects_bad_key() {
        assert!(encrypt(&[0u8; 10], b"x").is_err());
        assert!(decrypt(&[0u8; 16], "AAAA").is_err());
    }
}
