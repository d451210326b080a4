// title/crypto.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements the crypto operations shared across the Wii's title system.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};

use crate::title::keys::{common_key, KeyError};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Computes the SHA-1 digest of the provided data.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// Builds the IV used to wrap a Title Key: the owning Title ID followed by 8 zero bytes.
pub fn title_iv(title_id: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id.to_be_bytes());
    iv
}

/// Builds the IV used to encrypt a content: its index followed by 14 zero bytes.
pub fn content_iv(index: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..2].copy_from_slice(&index.to_be_bytes());
    iv
}

/// Encrypts data with AES-128-CBC. The data length must be a multiple of 16 bytes; callers are
/// responsible for padding.
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    assert!(data.len() % 16 == 0, "AES-CBC input must be a multiple of 16 bytes");
    let mut buf = data.to_vec();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
        .unwrap();
    buf
}

/// Decrypts data with AES-128-CBC. The data length must be a multiple of 16 bytes.
pub fn aes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    assert!(data.len() % 16 == 0, "AES-CBC input must be a multiple of 16 bytes");
    let mut buf = data.to_vec();
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .unwrap();
    buf
}

/// Unwraps an encrypted Title Key using the selected common key, with the owning Title ID as
/// the IV.
pub fn unwrap_title_key(title_key_enc: [u8; 16], common_key_index: u8, title_id: u64, is_dev: bool) -> Result<[u8; 16], KeyError> {
    let key = common_key(common_key_index, is_dev)?;
    let title_key = aes_cbc_decrypt(&key, &title_iv(title_id), &title_key_enc);
    Ok(title_key.try_into().unwrap())
}

/// Wraps a cleartext Title Key using the selected common key, with the owning Title ID as
/// the IV.
pub fn wrap_title_key(title_key: [u8; 16], common_key_index: u8, title_id: u64, is_dev: bool) -> Result<[u8; 16], KeyError> {
    let key = common_key(common_key_index, is_dev)?;
    let title_key_enc = aes_cbc_encrypt(&key, &title_iv(title_id), &title_key);
    Ok(title_key_enc.try_into().unwrap())
}

/// Decrypts a content using its Title Key and the IV built from its index. Input shorter than a
/// multiple of 16 bytes is zero-padded first.
pub fn decrypt_content(data: &[u8], title_key: [u8; 16], index: u16) -> Vec<u8> {
    let mut buf = data.to_vec();
    buf.resize((buf.len() + 15) & !15, 0);
    aes_cbc_decrypt(&title_key, &content_iv(index), &buf)
}

/// Encrypts a content using its Title Key and the IV built from its index. Input shorter than a
/// multiple of 16 bytes is zero-padded first.
pub fn encrypt_content(data: &[u8], title_key: [u8; 16], index: u16) -> Vec<u8> {
    let mut buf = data.to_vec();
    buf.resize((buf.len() + 15) & !15, 0);
    aes_cbc_encrypt(&title_key, &content_iv(index), &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_iv() {
        let iv = title_iv(0x0000000100000002);
        assert_eq!(iv, [0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_content_iv() {
        let iv = content_iv(0x0102);
        assert_eq!(iv, [1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_sha1() {
        assert_eq!(hex::encode(sha1(b"")), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_cbc_round_trip() {
        let key = [0x13; 16];
        let iv = [0x37; 16];
        let plain = [0xAB; 48];
        let enc = aes_cbc_encrypt(&key, &iv, &plain);
        assert_ne!(enc.as_slice(), plain.as_slice());
        assert_eq!(aes_cbc_decrypt(&key, &iv, &enc), plain.to_vec());
    }

    #[test]
    fn test_title_key_wrap_cycle() {
        let title_key = [0x42; 16];
        let wrapped = wrap_title_key(title_key, 0, 0x0001000848414241, false).unwrap();
        assert_ne!(wrapped, title_key);
        assert_eq!(unwrap_title_key(wrapped, 0, 0x0001000848414241, false).unwrap(), title_key);
    }

    #[test]
    fn test_content_crypt_round_trip() {
        let title_key = [0x99; 16];
        // 5 bytes, so the codec has to pad up to a full block internally.
        let plain = b"hello";
        let enc = encrypt_content(plain, title_key, 3);
        assert_eq!(enc.len(), 16);
        let mut dec = decrypt_content(&enc, title_key, 3);
        dec.truncate(plain.len());
        assert_eq!(dec, plain.to_vec());
    }
}
