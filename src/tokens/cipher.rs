//! Authenticated symmetric encryption for tokens.
//!
//! Layout of a sealed message: `iv (16) ‖ AES-128-CBC ciphertext ‖ HMAC-SHA256 (32)`.
//! The MAC covers `iv ‖ ciphertext` and is checked before any decryption.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::generator::generate_iv;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

pub const KEY_LEN: usize = 16;
const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum CipherError {
    #[error("Invalid key length")]
    InvalidKey,
    #[error("Message authentication failed")]
    BadMac,
    #[error("Malformed ciphertext")]
    Malformed,
}

pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let iv = generate_iv();
    let ciphertext = Aes128CbcEnc::new_from_slices(key, &iv)
        .map_err(|_| CipherError::InvalidKey)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut sealed = Vec::with_capacity(IV_LEN + ciphertext.len() + MAC_LEN);
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CipherError::InvalidKey)?;
    mac.update(&sealed);
    sealed.extend_from_slice(&mac.finalize().into_bytes());
    Ok(sealed)
}

pub fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
    if sealed.len() < IV_LEN + BLOCK_LEN + MAC_LEN {
        return Err(CipherError::Malformed);
    }
    let (body, tag) = sealed.split_at(sealed.len() - MAC_LEN);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CipherError::InvalidKey)?;
    mac.update(body);
    mac.verify_slice(tag).map_err(|_| CipherError::BadMac)?;

    let (iv, ciphertext) = body.split_at(IV_LEN);
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CipherError::Malformed);
    }
    Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKey)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::Malformed)
}
