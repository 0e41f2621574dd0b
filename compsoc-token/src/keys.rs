use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use des::TdesEde3;
use jsonwebtoken::{DecodingKey, EncodingKey};
use md5::{Digest, Md5};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::fs::read_to_string;
use std::path::PathBuf;
use tracing::debug;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

use crate::error::TokenError;

const RSA_PRIVATE_KEY_TAG: &str = "RSA PRIVATE KEY";

/// Where the service's own RSA signing key comes from.
///
/// The key is read and parsed every time it is needed; nothing is cached between calls.
#[derive(Clone)]
pub enum KeySource {
    File {
        path: PathBuf,
        password: Option<String>,
    },
    Pem {
        pem: String,
        password: Option<String>,
    },
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::File { path, password } => f
                .debug_struct("File")
                .field("path", path)
                .field("encrypted", &password.is_some())
                .finish(),
            KeySource::Pem { password, .. } => f
                .debug_struct("Pem")
                .field("encrypted", &password.is_some())
                .finish_non_exhaustive(),
        }
    }
}

impl KeySource {
    pub fn file(path: impl Into<PathBuf>, password: Option<String>) -> Self {
        KeySource::File {
            path: path.into(),
            password,
        }
    }

    pub fn pem(pem: impl Into<String>, password: Option<String>) -> Self {
        KeySource::Pem {
            pem: pem.into(),
            password,
        }
    }

    /// Load and parse the signing key.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyLoad`] if the file is unreadable, is not PEM, holds a block
    /// other than `RSA PRIVATE KEY`, cannot be decrypted with the configured password, or
    /// does not contain a valid PKCS#1 key.
    pub fn load(&self) -> Result<ServiceKey, TokenError> {
        match self {
            KeySource::File { path, password } => {
                let text = read_to_string(path).map_err(|e| {
                    TokenError::key_load(format!("failed to read {}: {}", path.display(), e))
                })?;
                ServiceKey::from_pem(&text, password.as_deref())
            }
            KeySource::Pem { pem, password } => ServiceKey::from_pem(pem, password.as_deref()),
        }
    }
}

/// The service's RSA private key, ready for signing.
pub struct ServiceKey {
    private: RsaPrivateKey,
    pkcs1_der: Vec<u8>,
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKey")
            .field("bits", &(self.private.size() * 8))
            .finish_non_exhaustive()
    }
}

impl ServiceKey {
    /// Parse a PKCS#1 `RSA PRIVATE KEY` PEM block, decrypting it first when it carries
    /// OpenSSL's legacy `Proc-Type: 4,ENCRYPTED` headers.
    pub fn from_pem(text: &str, password: Option<&str>) -> Result<Self, TokenError> {
        let block = pem::parse(text)
            .map_err(|e| TokenError::key_load(format!("not a PEM document: {}", e)))?;

        if block.tag() != RSA_PRIVATE_KEY_TAG {
            return Err(TokenError::key_load(format!(
                "expected a {} block, found {}",
                RSA_PRIVATE_KEY_TAG,
                block.tag()
            )));
        }

        let pkcs1_der = if is_encrypted(&block) {
            let password = password.ok_or_else(|| {
                TokenError::key_load("key is encrypted but no password was configured")
            })?;
            decrypt_block(&block, password)?
        } else {
            if password.is_some() {
                debug!("signing key is not encrypted, ignoring configured password");
            }
            block.contents().to_vec()
        };

        let private = RsaPrivateKey::from_pkcs1_der(&pkcs1_der)
            .map_err(|e| TokenError::key_load(format!("invalid PKCS#1 key: {}", e)))?;

        Ok(Self { private, pkcs1_der })
    }

    pub fn public_key(&self) -> VerificationKey {
        VerificationKey(self.private.to_public_key())
    }

    pub(crate) fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_der(&self.pkcs1_der)
    }
}

/// An RSA public key that token signatures are checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey(RsaPublicKey);

impl VerificationKey {
    pub fn from_rsa(key: RsaPublicKey) -> Self {
        Self(key)
    }

    /// Parse a `PUBLIC KEY` (SubjectPublicKeyInfo) PEM document.
    pub fn from_spki_pem(pem: &str) -> Result<Self, TokenError> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(Self)
            .map_err(|e| TokenError::trust_material(format!("invalid public key: {}", e)))
    }

    /// Extract the subject public key from a PEM-encoded X.509 certificate.
    pub fn from_certificate_pem(pem: &str) -> Result<Self, TokenError> {
        let certificate = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| TokenError::trust_material(format!("invalid certificate: {}", e)))?;
        let spki = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| TokenError::trust_material(format!("invalid certificate key: {}", e)))?;
        RsaPublicKey::from_public_key_der(&spki)
            .map(Self)
            .map_err(|e| TokenError::trust_material(format!("certificate key is not RSA: {}", e)))
    }

    pub fn rsa(&self) -> &RsaPublicKey {
        &self.0
    }

    pub(crate) fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_rsa_raw_components(&self.0.n().to_bytes_be(), &self.0.e().to_bytes_be())
    }
}

fn is_encrypted(block: &pem::Pem) -> bool {
    block
        .headers()
        .get("Proc-Type")
        .map(|value| value.contains("ENCRYPTED"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy)]
enum LegacyCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
}

impl LegacyCipher {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "AES-128-CBC" => Some(LegacyCipher::Aes128Cbc),
            "AES-192-CBC" => Some(LegacyCipher::Aes192Cbc),
            "AES-256-CBC" => Some(LegacyCipher::Aes256Cbc),
            "DES-EDE3-CBC" => Some(LegacyCipher::DesEde3Cbc),
            _ => None,
        }
    }

    fn key_len(self) -> usize {
        match self {
            LegacyCipher::Aes128Cbc => 16,
            LegacyCipher::Aes192Cbc | LegacyCipher::DesEde3Cbc => 24,
            LegacyCipher::Aes256Cbc => 32,
        }
    }

    fn iv_len(self) -> usize {
        match self {
            LegacyCipher::DesEde3Cbc => 8,
            _ => 16,
        }
    }
}

fn decrypt_block(block: &pem::Pem, password: &str) -> Result<Vec<u8>, TokenError> {
    let dek_info = block
        .headers()
        .get("DEK-Info")
        .ok_or_else(|| TokenError::key_load("encrypted key has no DEK-Info header"))?;
    let (name, iv_hex) = dek_info
        .split_once(',')
        .ok_or_else(|| TokenError::key_load("malformed DEK-Info header"))?;
    let cipher = LegacyCipher::from_name(name.trim())
        .ok_or_else(|| TokenError::key_load(format!("unsupported key cipher {}", name.trim())))?;
    let iv = hex::decode(iv_hex.trim())
        .map_err(|e| TokenError::key_load(format!("malformed DEK-Info IV: {}", e)))?;
    if iv.len() != cipher.iv_len() {
        return Err(TokenError::key_load("DEK-Info IV has the wrong length"));
    }

    let key = evp_bytes_to_key(password.as_bytes(), &iv[..8], cipher.key_len());
    let data = block.contents();
    let invalid_length = |_| TokenError::key_load("invalid cipher parameters");

    let plain = match cipher {
        LegacyCipher::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(&key, &iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        LegacyCipher::Aes192Cbc => cbc::Decryptor::<Aes192>::new_from_slices(&key, &iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        LegacyCipher::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(&key, &iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        LegacyCipher::DesEde3Cbc => cbc::Decryptor::<TdesEde3>::new_from_slices(&key, &iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
    };

    plain.map_err(|_| TokenError::key_load("failed to decrypt key, is the password correct?"))
}

/// OpenSSL's `EVP_BytesToKey` with MD5 and a single iteration.
fn evp_bytes_to_key(password: &[u8], salt: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut digest: Vec<u8> = Vec::new();
    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&digest);
        hasher.update(password);
        hasher.update(salt);
        digest = hasher.finalize().to_vec();
        key.extend_from_slice(&digest);
    }
    key.truncate(key_len);
    key
}
