// title/signing.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements the signed-blob header that TMDs, Tickets, and certificates all begin with.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature type `{0:#010X}` is not recognized")]
    UnsupportedSignatureType(u32),
    #[error("signature must be {expected} bytes for its type (was {found})")]
    BadSignatureLength { expected: usize, found: usize },
    #[error("signature data is not in a valid format")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Rsa4096,
    Rsa2048,
    Ecdsa,
}

impl SignatureType {
    /// Matches a signature type tag read from a signed blob to a signature type.
    pub fn from_tag(tag: u32) -> Result<SignatureType, SignatureError> {
        match tag {
            0x00010000 => Ok(SignatureType::Rsa4096),
            0x00010001 => Ok(SignatureType::Rsa2048),
            0x00010002 => Ok(SignatureType::Ecdsa),
            other => Err(SignatureError::UnsupportedSignatureType(other)),
        }
    }

    /// Gets the tag that identifies this signature type at the start of a signed blob.
    pub fn tag(&self) -> u32 {
        match self {
            SignatureType::Rsa4096 => 0x00010000,
            SignatureType::Rsa2048 => 0x00010001,
            SignatureType::Ecdsa => 0x00010002,
        }
    }

    /// Gets the length of a signature of this type, in bytes.
    pub fn sig_len(&self) -> usize {
        match self {
            SignatureType::Rsa4096 => 512,
            SignatureType::Rsa2048 => 256,
            SignatureType::Ecdsa => 60,
        }
    }
}

/// The header at the start of every signed Wii structure: a type tag, the signature itself, and
/// 60 bytes of padding. The signature covers everything from the end of the padding onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    sig_type: SignatureType,
    signature: Vec<u8>,
    fill: [u8; 60],
}

impl SignatureBlock {
    /// Creates a new SignatureBlock of the specified type with a zeroed signature.
    pub fn new(sig_type: SignatureType) -> Self {
        SignatureBlock {
            sig_type,
            signature: vec![0u8; sig_type.sig_len()],
            fill: [0u8; 60],
        }
    }

    /// Reads a signed-blob header from the reader, leaving it positioned at the signed body.
    pub fn parse<R: Read>(buf: &mut R) -> Result<Self, SignatureError> {
        let tag = buf.read_u32::<BigEndian>()?;
        let sig_type = SignatureType::from_tag(tag)?;
        let mut signature = vec![0u8; sig_type.sig_len()];
        buf.read_exact(&mut signature)?;
        let mut fill = [0u8; 60];
        buf.read_exact(&mut fill)?;
        Ok(SignatureBlock {
            sig_type,
            signature,
            fill,
        })
    }

    /// Writes the signed-blob header out to the provided buffer.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), std::io::Error> {
        buf.write_u32::<BigEndian>(self.sig_type.tag())?;
        buf.write_all(&self.signature)?;
        buf.write_all(&self.fill)?;
        Ok(())
    }

    /// Gets the type of the signature stored in this block.
    pub fn sig_type(&self) -> SignatureType {
        self.sig_type
    }

    /// Gets the signature stored in this block.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Replaces the signature stored in this block. The new signature must match the length
    /// required by the block's signature type.
    pub fn set_signature(&mut self, signature: &[u8]) -> Result<(), SignatureError> {
        if signature.len() != self.sig_type.sig_len() {
            return Err(SignatureError::BadSignatureLength {
                expected: self.sig_type.sig_len(),
                found: signature.len(),
            });
        }
        self.signature = signature.to_vec();
        Ok(())
    }

    /// Erases the signature stored in this block.
    pub fn zero(&mut self) {
        self.signature.fill(0);
    }

    /// Gets whether the signature stored in this block is entirely zeroes.
    pub fn is_zeroed(&self) -> bool {
        self.signature.iter().all(|&b| b == 0)
    }

    /// Gets the offset of the signed body within the serialized blob.
    pub fn body_offset(&self) -> usize {
        4 + self.sig_type.sig_len() + 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_body_offsets() {
        assert_eq!(SignatureBlock::new(SignatureType::Rsa2048).body_offset(), 320);
        assert_eq!(SignatureBlock::new(SignatureType::Rsa4096).body_offset(), 576);
        assert_eq!(SignatureBlock::new(SignatureType::Ecdsa).body_offset(), 124);
    }

    #[test]
    fn test_parse_round_trip() {
        let mut data = vec![0x00, 0x01, 0x00, 0x01];
        data.extend(vec![0xAA; 256]);
        data.extend(vec![0x00; 60]);
        let block = SignatureBlock::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(block.sig_type(), SignatureType::Rsa2048);
        assert_eq!(block.signature(), &[0xAA; 256]);
        let mut out = Vec::new();
        block.write_to(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_unknown_tag() {
        let data = [0x00, 0x02, 0x00, 0x05];
        match SignatureBlock::parse(&mut Cursor::new(&data[..])) {
            Err(SignatureError::UnsupportedSignatureType(0x00020005)) => {},
            other => panic!("expected unsupported signature type, got {:?}", other),
        }
    }

    #[test]
    fn test_zeroing() {
        let mut block = SignatureBlock::new(SignatureType::Rsa2048);
        block.set_signature(&[0xFF; 256]).unwrap();
        assert!(!block.is_zeroed());
        block.zero();
        assert!(block.is_zeroed());
        assert!(block.set_signature(&[0u8; 512]).is_err());
    }
}
