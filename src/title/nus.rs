// title/nus.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements downloading title components from the NUS.

use std::io::Write;

use thiserror::Error;

use crate::title;
use crate::title::{cert, content, ticket, tmd};

const NUS_ENDPOINT_RETAIL: &str = "http://nus.cdn.shop.wii.com/ccs/download/";
const NUS_ENDPOINT_DEV: &str = "http://ccs.cdn.shop.wii.com/ccs/download/";
// The NUS only answers requests that identify themselves the way the console does.
const NUS_USER_AGENT: &str = "wii libnup/1.0";

#[derive(Debug, Error)]
pub enum NusError {
    #[error("the NUS returned status {0} for the requested file")]
    DownloadFailed(u16),
    #[error("the data returned by the NUS is not valid")]
    InvalidData,
    #[error("certificate processing error")]
    Cert(#[from] cert::CertError),
    #[error("TMD processing error")]
    Tmd(#[from] tmd::TmdError),
    #[error("Ticket processing error")]
    Ticket(#[from] ticket::TicketError),
    #[error("content processing error")]
    Content(#[from] content::ContentError),
    #[error("an error occurred while assembling a Title from the downloaded data")]
    Title(#[from] title::TitleError),
    #[error("data could not be downloaded from the NUS")]
    Request(#[from] reqwest::Error),
    #[error("an error occurred writing NUS data")]
    IO(#[from] std::io::Error),
}

fn endpoint(use_dev: bool) -> &'static str {
    if use_dev {
        NUS_ENDPOINT_DEV
    } else {
        NUS_ENDPOINT_RETAIL
    }
}

fn download_file(url: String) -> Result<Vec<u8>, NusError> {
    let client = reqwest::blocking::Client::new();
    let response = client.get(url)
        .header(reqwest::header::USER_AGENT, NUS_USER_AGENT)
        .send()?;
    if !response.status().is_success() {
        return Err(NusError::DownloadFailed(response.status().as_u16()));
    }
    Ok(response.bytes()?.to_vec())
}

/// Downloads the TMD for the specified Title ID from the NUS. The latest version is fetched
/// unless a specific one is requested.
pub fn download_tmd(title_id: u64, title_version: Option<u16>, use_dev: bool) -> Result<Vec<u8>, NusError> {
    // The URL structure is <endpoint>/<TID>/tmd for the latest version, with a .<version>
    // suffix for a specific one.
    let tmd_url = match title_version {
        Some(version) => format!("{}{:016x}/tmd.{}", endpoint(use_dev), title_id, version),
        None => format!("{}{:016x}/tmd", endpoint(use_dev), title_id),
    };
    let data = download_file(tmd_url)?;
    // Parse and re-dump the TMD so that malformed server data fails here rather than later.
    let tmd = tmd::Tmd::from_bytes(&data).map_err(|_| NusError::InvalidData)?;
    tmd.to_bytes().map_err(|_| NusError::InvalidData)
}

/// Downloads the common Ticket for the specified Title ID from the NUS. Only titles with free
/// tickets, like IOSes and channels, have one available.
pub fn download_ticket(title_id: u64, use_dev: bool) -> Result<Vec<u8>, NusError> {
    let tik_url = format!("{}{:016x}/cetk", endpoint(use_dev), title_id);
    let data = download_file(tik_url)?;
    // The cetk file is a Ticket with the certificate chain appended, so re-dumping trims it.
    let tik = ticket::Ticket::from_bytes(&data).map_err(|_| NusError::InvalidData)?;
    tik.to_bytes().map_err(|_| NusError::InvalidData)
}

/// Downloads the specified content file belonging to the specified Title ID from the NUS.
pub fn download_content(title_id: u64, content_id: u32, use_dev: bool) -> Result<Vec<u8>, NusError> {
    let content_url = format!("{}{:016x}/{:08X}", endpoint(use_dev), title_id, content_id);
    download_file(content_url)
}

/// Downloads every content listed in the provided TMD from the NUS, in record order.
pub fn download_contents(tmd: &tmd::Tmd, use_dev: bool) -> Result<Vec<Vec<u8>>, NusError> {
    tmd.content_records().iter()
        .map(|record| download_content(tmd.title_id(), record.content_id, use_dev))
        .collect()
}

/// Downloads the certificate chain from the NUS. The chain isn't offered on its own, so it is
/// assembled from the signed TMD and Ticket of a known title (the Wii Menu, version 513).
pub fn download_cert_chain(use_dev: bool) -> Result<Vec<u8>, NusError> {
    let tmd = download_file(format!("{}0000000100000002/tmd.513", endpoint(use_dev)))?;
    let tik = download_file(format!("{}0000000100000002/cetk", endpoint(use_dev)))?;
    if tik.len() < 0x2A4 + 768 || tmd.len() < 0x328 + 768 {
        return Err(NusError::InvalidData);
    }
    // The CA certificate follows the XS certificate in the cetk, and the CP certificate
    // follows the TMD body.
    let mut cert_chain: Vec<u8> = Vec::new();
    cert_chain.write_all(&tik[0x2A4 + 768..])?;
    cert_chain.write_all(&tmd[0x328..0x328 + 768])?;
    cert_chain.write_all(&tik[0x2A4..0x2A4 + 768])?;
    Ok(cert_chain)
}

/// Downloads an entire title from the NUS and assembles the components into a Title instance.
pub fn download_title(title_id: u64, title_version: Option<u16>, use_dev: bool) -> Result<title::Title, NusError> {
    let cert_chain = cert::CertChain::from_bytes(&download_cert_chain(use_dev)?)?;
    let tmd = tmd::Tmd::from_bytes(&download_tmd(title_id, title_version, use_dev)?)?;
    let tik = ticket::Ticket::from_bytes(&download_ticket(title_id, use_dev)?)?;
    let content_region = content::ContentRegion::from_parts(
        download_contents(&tmd, use_dev)?,
        tmd.content_records(),
    )?;
    Ok(title::Title::from_parts(cert_chain, None, tik, tmd, content_region, None))
}
