// title/cert.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements the certificate chain used to validate the signatures of Wii titles.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::{BigUint, RsaPublicKey};
use sha1::Sha1;
use thiserror::Error;

use crate::title::crypto;
use crate::title::signing::{SignatureBlock, SignatureError, SignatureType};
use crate::title::ticket::Ticket;
use crate::title::tmd::{Tmd, TmdError};

#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate data is malformed at offset {0:#X}")]
    MalformedCertificate(usize),
    #[error("certificate carries unknown key type `{0:#010X}`")]
    UnknownKeyType(u32),
    #[error("certificate chain contains a certificate that does not belong")]
    UnknownCertificate,
    #[error("certificate chain is missing the `{0}` certificate")]
    MissingCertificate(&'static str),
    #[error("expected the `{0}` certificate but was given a different one")]
    WrongCertificate(&'static str),
    #[error("the provided data was not signed with the provided certificate")]
    IssuerMismatch,
    #[error("signature processing error")]
    Signature(#[from] SignatureError),
    #[error("TMD processing error")]
    Tmd(#[from] TmdError),
    #[error("certificate data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// The signing root a certificate chain descends from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaRoot {
    Retail,
    Dev,
    Unknown,
}

// The public key the retail "Root" signs with, as distributed in the Wii's boot1.
const ROOT_KEY_MODULUS_RETAIL: &str = concat!(
    "f8246c58bae7500301fbb7c2ebe0010571da922378f0514ec0031dd0d21ed3d0",
    "7efc852069b5de9bb951a8bc90a244926d379295ae9436aaa6a302510c7b1ded",
    "d5fb20869d7f3016f6be65d383a16db3321b95351890b17002937ee193f57e99",
    "a2474e9d3824c7aee38541f567e7518c7a0e38e7ebaf41191bcff17b42a6b4ed",
    "e6ce8de7318f7f5204b3990e226745afd485b24493008b08c7f6b7e56b02b3e8",
    "fe0c9d859cb8b68223b8ab27ee5f6538078b2db91e2a153e85818072a23b6dd9",
    "3281054f6fb0f6f5ad283eca0b7af35455e03da7b68326f3ec834af314048ac6",
    "df20d28508673cab62a2c7bc131a533e0b66806b1c30664b372331bdc4b0cad8",
    "d11ee7bbd9285548aaec1f66e821b3c8a0476900c5e688e80cce3c61d69cbba1",
    "37c6604f7a72dd8c7b3e3d51290daa6a597b081f9d3633a3467a356109aca7dd",
    "7d2e2fb2c1aeb8e20f4892d8b9f8b46f4e3c11f4f47d8b757dfefea3899c3359",
    "5c5efdebcbabe8413e3a9a803c69356eb2b2ad5cc4c858455ef5f7b30644b47c",
    "64068cdf809f76025a2db446e03d7cf62f34e702457b02a4cf5d9dd53ca53a7c",
    "a629788c67ca08bfecca43a957ad16c94e1cd875ca107dce7e0118f0df6bfee5",
    "1ddbd991c26e60cd4858aa592c820075f29f526c917c6fe5403ea7d4a50cec3b",
    "7384de886e82d2eb4d4e42b5f2b149a81ea7ce7144dc2994cfc44e1f91cbd495",
);
const ROOT_KEY_EXPONENT: u32 = 0x00010001;

/// The types of public key a certificate can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa4096,
    Rsa2048,
    Ecc,
}

impl KeyType {
    /// Matches a key type value from a certificate to a key type.
    pub fn from_u32(value: u32) -> Result<KeyType, CertError> {
        match value {
            0x00000000 => Ok(KeyType::Rsa4096),
            0x00000001 => Ok(KeyType::Rsa2048),
            0x00000002 => Ok(KeyType::Ecc),
            other => Err(CertError::UnknownKeyType(other)),
        }
    }

    /// Gets the key type value stored in a certificate for this key type.
    pub fn as_u32(&self) -> u32 {
        match self {
            KeyType::Rsa4096 => 0x00000000,
            KeyType::Rsa2048 => 0x00000001,
            KeyType::Ecc => 0x00000002,
        }
    }

    /// Gets the length of the key material for this key type, in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            KeyType::Rsa4096 => 512,
            KeyType::Rsa2048 => 256,
            KeyType::Ecc => 60,
        }
    }

    /// Gets the space the key occupies in a certificate, including the exponent and trailing
    /// padding, in bytes.
    pub fn stored_len(&self) -> usize {
        match self {
            KeyType::Rsa4096 => 0x238,
            KeyType::Rsa2048 => 0x138,
            KeyType::Ecc => 0x78,
        }
    }
}

/// A single certificate from the Wii's signing chain, holding the public key used to verify its
/// child's signature.
#[derive(Debug, Clone)]
pub struct Certificate {
    signature: SignatureBlock,
    issuer: [u8; 64],
    key_type: KeyType,
    child_identity: [u8; 64],
    key_id: u32,
    modulus: Vec<u8>,
    exponent: u32,
}

impl Certificate {
    /// Creates a new Certificate instance from the binary data of a certificate.
    pub fn from_bytes(data: &[u8]) -> Result<Certificate, CertError> {
        let mut buf = Cursor::new(data);
        let signature = SignatureBlock::parse(&mut buf)?;
        let mut issuer = [0u8; 64];
        buf.read_exact(&mut issuer)?;
        let key_type = KeyType::from_u32(buf.read_u32::<BigEndian>()?)?;
        let mut child_identity = [0u8; 64];
        buf.read_exact(&mut child_identity)?;
        let key_id = buf.read_u32::<BigEndian>()?;
        let mut modulus = vec![0u8; key_type.key_len()];
        buf.read_exact(&mut modulus)?;
        // ECC keys have no exponent.
        let exponent = match key_type {
            KeyType::Rsa4096 | KeyType::Rsa2048 => buf.read_u32::<BigEndian>()?,
            KeyType::Ecc => 0,
        };
        Ok(Certificate {
            signature,
            issuer,
            key_type,
            child_identity,
            key_id,
            modulus,
            exponent,
        })
    }

    /// Dumps the data in a Certificate instance back into binary data, padded out to the 64-byte
    /// alignment certificates are stored at.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        self.signature.write_to(&mut buf)?;
        buf.write_all(&self.issuer)?;
        buf.write_u32::<BigEndian>(self.key_type.as_u32())?;
        buf.write_all(&self.child_identity)?;
        buf.write_u32::<BigEndian>(self.key_id)?;
        buf.write_all(&self.modulus)?;
        if matches!(self.key_type, KeyType::Rsa4096 | KeyType::Rsa2048) {
            buf.write_u32::<BigEndian>(self.exponent)?;
        }
        buf.resize((buf.len() + 63) & !63, 0);
        Ok(buf)
    }

    /// Gets the signature of the certificate.
    pub fn signature(&self) -> &[u8] {
        self.signature.signature()
    }

    /// Gets the type of the signature on the certificate.
    pub fn signature_type(&self) -> SignatureType {
        self.signature.sig_type()
    }

    /// Gets the offset of the signed body within the serialized certificate.
    pub fn body_offset(&self) -> usize {
        self.signature.body_offset()
    }

    /// Gets the name of the certificate's issuer as a string.
    pub fn issuer(&self) -> String {
        String::from_utf8_lossy(&self.issuer).trim_end_matches('\0').to_owned()
    }

    /// Gets the name of the certificate this certificate signs for, as a string.
    pub fn child_identity(&self) -> String {
        String::from_utf8_lossy(&self.child_identity).trim_end_matches('\0').to_owned()
    }

    /// Gets the type of the public key contained in the certificate.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Gets the ID of the public key contained in the certificate.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Gets the modulus of the public key contained in the certificate.
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Gets the exponent of the public key contained in the certificate.
    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    fn public_key(&self) -> Option<RsaPublicKey> {
        let modulus = BigUint::from_bytes_be(&self.modulus);
        let exponent = BigUint::from(self.exponent);
        RsaPublicKey::new(modulus, exponent).ok()
    }
}

/// The three certificates stored in a WAD that make up the Wii's signing chain: the CA
/// certificate, the CP certificate that signs TMDs, and the XS certificate that signs Tickets.
#[derive(Debug, Clone)]
pub struct CertChain {
    ca_cert: Certificate,
    tmd_cert: Certificate,
    ticket_cert: Certificate,
}

impl CertChain {
    /// Creates a new CertChain instance from the binary data of an entire certificate chain. The
    /// chain must contain a CA certificate, a CP (TMD) certificate, and an XS (Ticket)
    /// certificate.
    pub fn from_bytes(data: &[u8]) -> Result<CertChain, CertError> {
        let mut offset: usize = 0;
        let mut ca_cert: Option<Certificate> = None;
        let mut tmd_cert: Option<Certificate> = None;
        let mut ticket_cert: Option<Certificate> = None;
        for _ in 0..3 {
            // Size up the certificate from its signature and key types before parsing it, since
            // both determine variable-length sections.
            let header = data.get(offset..).ok_or(CertError::MalformedCertificate(offset))?;
            let mut buf = Cursor::new(header);
            let sig_type = SignatureType::from_tag(buf.read_u32::<BigEndian>()?)?;
            let key_type_offset = offset + 0x80 + sig_type.sig_len();
            let key_type_bytes = data.get(key_type_offset..key_type_offset + 4)
                .ok_or(CertError::MalformedCertificate(offset))?;
            let key_type = KeyType::from_u32(u32::from_be_bytes(key_type_bytes.try_into().unwrap()))?;
            let cert_size = (0xC8 + sig_type.sig_len() + key_type.stored_len() + 63) & !63;
            let cert_data = data.get(offset..offset + cert_size)
                .ok_or(CertError::MalformedCertificate(offset))?;
            let cert = Certificate::from_bytes(cert_data)?;
            if cert.issuer() == "Root" {
                ca_cert = Some(cert);
            } else if cert.issuer().contains("Root-CA") {
                if cert.child_identity().contains("CP") {
                    tmd_cert = Some(cert);
                } else if cert.child_identity().contains("XS") {
                    ticket_cert = Some(cert);
                } else {
                    return Err(CertError::UnknownCertificate);
                }
            } else {
                return Err(CertError::UnknownCertificate);
            }
            offset += cert_size;
        }
        Ok(CertChain {
            ca_cert: ca_cert.ok_or(CertError::MissingCertificate("CA"))?,
            tmd_cert: tmd_cert.ok_or(CertError::MissingCertificate("CP"))?,
            ticket_cert: ticket_cert.ok_or(CertError::MissingCertificate("XS"))?,
        })
    }

    /// Creates a new CertChain instance from three separate Certificate instances: the CA
    /// certificate, the CP (TMD) certificate, and the XS (Ticket) certificate.
    pub fn from_certs(ca_cert: Certificate, tmd_cert: Certificate, ticket_cert: Certificate) -> Result<CertChain, CertError> {
        if ca_cert.issuer() != "Root" {
            return Err(CertError::WrongCertificate("CA"));
        }
        if !tmd_cert.child_identity().contains("CP") {
            return Err(CertError::WrongCertificate("CP"));
        }
        if !ticket_cert.child_identity().contains("XS") {
            return Err(CertError::WrongCertificate("XS"));
        }
        Ok(CertChain {
            ca_cert,
            tmd_cert,
            ticket_cert,
        })
    }

    /// Dumps the entire CertChain back into binary data, in the order the chain is stored in a
    /// WAD: CA first, then CP, then XS.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_all(&self.ca_cert.to_bytes()?)?;
        buf.write_all(&self.tmd_cert.to_bytes()?)?;
        buf.write_all(&self.ticket_cert.to_bytes()?)?;
        Ok(buf)
    }

    /// Gets the CA certificate from the chain.
    pub fn ca_cert(&self) -> &Certificate {
        &self.ca_cert
    }

    /// Gets the CP (TMD) certificate from the chain.
    pub fn tmd_cert(&self) -> &Certificate {
        &self.tmd_cert
    }

    /// Gets the XS (Ticket) certificate from the chain.
    pub fn ticket_cert(&self) -> &Certificate {
        &self.ticket_cert
    }
}

/// Identifies the signing root a CA certificate descends from, based on its name.
pub fn ca_root(ca_cert: &Certificate) -> CaRoot {
    match ca_cert.child_identity().as_str() {
        "CA00000001" => CaRoot::Retail,
        "CA00000002" => CaRoot::Dev,
        _ => CaRoot::Unknown,
    }
}

fn verify_rsa_sha1(key: Option<RsaPublicKey>, digest: &[u8; 20], signature: &[u8]) -> bool {
    match key {
        Some(key) => key.verify(Pkcs1v15Sign::new::<Sha1>(), digest, signature).is_ok(),
        None => false,
    }
}

/// Verifies a Wii CA certificate against the root public key. Only the retail root key is
/// publicly distributable, so development CA certificates always fail verification.
pub fn verify_ca_cert(ca_cert: &Certificate) -> Result<bool, CertError> {
    if ca_cert.issuer() != "Root" {
        return Err(CertError::WrongCertificate("CA"));
    }
    match ca_root(ca_cert) {
        CaRoot::Retail => {
            let modulus = BigUint::from_bytes_be(&hex::decode(ROOT_KEY_MODULUS_RETAIL).unwrap());
            let root_key = RsaPublicKey::new(modulus, BigUint::from(ROOT_KEY_EXPONENT)).ok();
            let cert_body = ca_cert.to_bytes()?;
            let digest = crypto::sha1(&cert_body[ca_cert.body_offset()..]);
            Ok(verify_rsa_sha1(root_key, &digest, ca_cert.signature()))
        },
        CaRoot::Dev => Ok(false),
        CaRoot::Unknown => Err(CertError::UnknownCertificate),
    }
}

/// Verifies a CP or XS certificate against the CA certificate that issued it. The certificates
/// must actually belong to each other, or this function will return an error without attempting
/// signature verification.
pub fn verify_child_cert(ca_cert: &Certificate, child_cert: &Certificate) -> Result<bool, CertError> {
    if ca_cert.issuer() != "Root" || !ca_cert.child_identity().contains("CA") {
        return Err(CertError::WrongCertificate("CA"));
    }
    if format!("Root-{}", ca_cert.child_identity()) != child_cert.issuer() {
        return Err(CertError::IssuerMismatch);
    }
    let cert_body = child_cert.to_bytes()?;
    let digest = crypto::sha1(&cert_body[child_cert.body_offset()..]);
    Ok(verify_rsa_sha1(ca_cert.public_key(), &digest, child_cert.signature()))
}

/// Verifies the signature of a TMD against the CP certificate that signed it. The TMD's issuer
/// must name the CP certificate, or this function will return an error without attempting
/// signature verification.
pub fn verify_tmd_sig(tmd_cert: &Certificate, tmd: &Tmd) -> Result<bool, CertError> {
    if !tmd_cert.issuer().contains("Root-CA") || !tmd_cert.child_identity().contains("CP") {
        return Err(CertError::WrongCertificate("CP"));
    }
    if format!("{}-{}", tmd_cert.issuer(), tmd_cert.child_identity()) != tmd.issuer() {
        return Err(CertError::IssuerMismatch);
    }
    let tmd_body = tmd.to_bytes()?;
    let digest = crypto::sha1(&tmd_body[tmd.body_offset()..]);
    Ok(verify_rsa_sha1(tmd_cert.public_key(), &digest, tmd.signature()))
}

/// Verifies the signature of a Ticket against the XS certificate that signed it. The Ticket's
/// issuer must name the XS certificate, or this function will return an error without attempting
/// signature verification.
pub fn verify_ticket_sig(ticket_cert: &Certificate, ticket: &Ticket) -> Result<bool, CertError> {
    if !ticket_cert.issuer().contains("Root-CA") || !ticket_cert.child_identity().contains("XS") {
        return Err(CertError::WrongCertificate("XS"));
    }
    if format!("{}-{}", ticket_cert.issuer(), ticket_cert.child_identity()) != ticket.issuer() {
        return Err(CertError::IssuerMismatch);
    }
    let ticket_body = ticket.to_bytes()?;
    let digest = crypto::sha1(&ticket_body[ticket.body_offset()..]);
    Ok(verify_rsa_sha1(ticket_cert.public_key(), &digest, ticket.signature()))
}
