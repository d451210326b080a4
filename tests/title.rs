// tests/title.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// End-to-end tests that assemble a synthetic title, export it to a WAD, and read it back.

use wiikit::title::cert::{CertChain, KeyType};
use wiikit::title::content::{ContentError, ContentRegion};
use wiikit::title::crypto;
use wiikit::title::ticket::Ticket;
use wiikit::title::tmd::{ContentKind, ContentRecord, Tmd};
use wiikit::title::{Title, TitleError};

const TITLE_ID: u64 = 0x0001000848414241;
const TITLE_KEY: [u8; 16] = [0x42; 16];

fn build_cert_bytes(issuer: &str, child: &str) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    buf.extend(0x00010001u32.to_be_bytes()); // RSA-2048 signature
    buf.extend([0u8; 256]);
    buf.extend([0u8; 60]);
    let mut issuer = issuer.as_bytes().to_vec();
    issuer.resize(64, 0);
    buf.extend(issuer);
    buf.extend(KeyType::Rsa2048.as_u32().to_be_bytes());
    let mut child = child.as_bytes().to_vec();
    child.resize(64, 0);
    buf.extend(child);
    buf.extend(0u32.to_be_bytes()); // key_id
    buf.extend(vec![0x55u8; 256]); // modulus
    buf.extend(0x00010001u32.to_be_bytes()); // exponent
    buf.resize((buf.len() + 63) & !63, 0);
    buf
}

fn build_cert_chain() -> CertChain {
    let mut data = Vec::new();
    data.extend(build_cert_bytes("Root", "CA00000001"));
    data.extend(build_cert_bytes("Root-CA00000001", "CP00000004"));
    data.extend(build_cert_bytes("Root-CA00000001", "XS00000003"));
    CertChain::from_bytes(&data).unwrap()
}

fn build_ticket() -> Ticket {
    let mut buf: Vec<u8> = Vec::new();
    buf.extend(0x00010001u32.to_be_bytes());
    buf.extend([0u8; 256]);
    buf.extend([0u8; 60]);
    let mut issuer = b"Root-CA00000001-XS00000003".to_vec();
    issuer.resize(64, 0);
    buf.extend(issuer);
    buf.extend([0u8; 60]); // ecdh_data
    buf.push(0); // format_version
    buf.extend([0u8; 2]);
    buf.extend(crypto::wrap_title_key(TITLE_KEY, 0, TITLE_ID, false).unwrap());
    buf.push(0);
    buf.extend(1u64.to_be_bytes()); // ticket_id
    buf.extend(0u32.to_be_bytes()); // console_id
    buf.extend(TITLE_ID.to_be_bytes());
    buf.extend([0u8; 2]);
    buf.extend(1u16.to_be_bytes()); // title_version
    buf.extend(0u32.to_be_bytes());
    buf.extend(0u32.to_be_bytes());
    buf.push(0); // export_allowed
    buf.push(0); // common_key_index
    buf.extend([0u8; 48]);
    buf.extend([0u8; 64]); // content_access
    buf.extend([0u8; 2]);
    buf.extend([0u8; 64]); // time limits
    Ticket::from_bytes(&buf).unwrap()
}

fn build_tmd(records: &[ContentRecord]) -> Tmd {
    let mut buf: Vec<u8> = Vec::new();
    buf.extend(0x00010001u32.to_be_bytes());
    buf.extend([0u8; 256]);
    buf.extend([0u8; 60]);
    let mut issuer = b"Root-CA00000001-CP00000004".to_vec();
    issuer.resize(64, 0);
    buf.extend(issuer);
    buf.extend([0u8; 4]); // version through is_vwii
    buf.extend(0x000000010000003Au64.to_be_bytes()); // ios_tid
    buf.extend(TITLE_ID.to_be_bytes());
    buf.extend(0x00010001u32.to_be_bytes()); // title_type
    buf.extend(0x3031u16.to_be_bytes()); // group_id
    buf.extend([0u8; 2]);
    buf.extend(1u16.to_be_bytes()); // region
    buf.extend([0u8; 16 + 12 + 12 + 18]);
    buf.extend(0u32.to_be_bytes()); // access_rights
    buf.extend(1u16.to_be_bytes()); // title_version
    buf.extend((records.len() as u16).to_be_bytes());
    buf.extend(0u16.to_be_bytes()); // boot_index
    buf.extend(0u16.to_be_bytes()); // minor_version
    for record in records {
        buf.extend(record.content_id.to_be_bytes());
        buf.extend(record.index.to_be_bytes());
        buf.extend(record.kind.as_u16().to_be_bytes());
        buf.extend(record.size.to_be_bytes());
        buf.extend(record.hash);
    }
    Tmd::from_bytes(&buf).unwrap()
}

// Builds a complete title holding a single one-byte content, b"\x42".
fn build_title() -> Title {
    let records = [ContentRecord {
        content_id: 0x00000001,
        index: 0,
        kind: ContentKind::Normal,
        size: 1,
        hash: crypto::sha1(b"\x42"),
    }];
    let tmd = build_tmd(&records);
    let content_blob = crypto::encrypt_content(b"\x42", TITLE_KEY, 0);
    let content = ContentRegion::from_bytes(&content_blob, &records).unwrap();
    Title::from_parts(build_cert_chain(), None, build_ticket(), tmd, content, None)
}

#[test]
fn test_wad_round_trip() {
    let title = build_title();
    let wad_bytes = title.to_bytes().unwrap();
    assert_eq!(wad_bytes.len() % 64, 0);
    let reparsed = Title::from_bytes(&wad_bytes).unwrap();
    assert_eq!(reparsed.tmd.title_id(), TITLE_ID);
    assert_eq!(reparsed.ticket.title_id(), TITLE_ID);
    assert_eq!(reparsed.ticket.title_key().unwrap(), TITLE_KEY);
    assert_eq!(reparsed.get_content_by_index(0).unwrap(), b"\x42".to_vec());
    // A parse-serialize cycle with no edits must be byte-identical.
    assert_eq!(reparsed.to_bytes().unwrap(), wad_bytes);
}

#[test]
fn test_set_content_updates_tmd() {
    let mut title = build_title();
    title.set_content(0, b"new content").unwrap();
    let record = title.tmd.content_record(0).unwrap();
    assert_eq!(record.size, 11);
    assert_eq!(record.hash, crypto::sha1(b"new content"));
    // The edit must survive a full WAD round trip.
    let reparsed = Title::from_bytes(&title.to_bytes().unwrap()).unwrap();
    assert_eq!(reparsed.get_content_by_index(0).unwrap(), b"new content".to_vec());
}

#[test]
fn test_add_content() {
    let mut title = build_title();
    title.add_content(b"more data", 0x00000002, ContentKind::Normal).unwrap();
    assert_eq!(title.tmd.num_contents(), 2);
    let reparsed = Title::from_bytes(&title.to_bytes().unwrap()).unwrap();
    assert_eq!(reparsed.get_content_by_index(1).unwrap(), b"more data".to_vec());
}

#[test]
fn test_fakesign() {
    let mut title = build_title();
    assert!(!title.is_fakesigned());
    title.fakesign().unwrap();
    assert!(title.is_fakesigned());
    // Fakesigning forges the strncmp check, not the real RSA signatures.
    assert!(!title.is_signed().unwrap());
    let tmd_body = title.tmd.to_bytes().unwrap();
    assert_eq!(crypto::sha1(&tmd_body[title.tmd.body_offset()..])[0], 0);
    let ticket_body = title.ticket.to_bytes().unwrap();
    assert_eq!(crypto::sha1(&ticket_body[title.ticket.body_offset()..])[0], 0);
}

#[test]
fn test_set_title_id_rewraps_key() {
    let mut title = build_title();
    title.set_title_id(0x0001000848414242).unwrap();
    assert_eq!(title.tmd.title_id(), 0x0001000848414242);
    assert_eq!(title.ticket.title_id(), 0x0001000848414242);
    // The cleartext Title Key must survive the move, and the edit must leave both structures
    // fakesigned so the title still installs.
    assert_eq!(title.ticket.title_key().unwrap(), TITLE_KEY);
    assert!(title.is_fakesigned());
    let reparsed = Title::from_bytes(&title.to_bytes().unwrap()).unwrap();
    assert_eq!(reparsed.get_content_by_index(0).unwrap(), b"\x42".to_vec());
}

#[test]
fn test_corrupt_content_fails_hash_check() {
    let title = build_title();
    let mut wad = title.to_wad().unwrap();
    let mut content = wad.content().to_vec();
    content[0] ^= 0x01;
    wad.set_content(&content);
    let tampered = Title::from_wad(&wad).unwrap();
    match tampered.get_content_by_index(0) {
        Err(TitleError::Content(ContentError::HashMismatch { index: 0, .. })) => {},
        other => panic!("expected hash mismatch, got {:?}", other),
    }
}

#[test]
fn test_title_size() {
    let mut title = build_title();
    title.set_content(0, &[0xAA; 1000]).unwrap();
    title.add_content(&[0xBB; 500], 0x00000002, ContentKind::Shared).unwrap();
    assert_eq!(title.title_size(false), 1000);
    assert_eq!(title.title_size(true), 1500);
    assert_eq!(title.title_size_blocks(true), 1);
}
