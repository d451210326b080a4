// archive/lz77.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements the compression and decompression routines for the Wii's LZ77 scheme.

use std::cmp::min;
use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Lz77Error {
    #[error("compression is type `{0:#04X}` but only 0x10 is supported")]
    InvalidCompressionType(u8),
    #[error("LZ77 data is not in a valid format")]
    IO(#[from] std::io::Error),
}

const LZ_MIN_LENGTH: usize = 0x03;
const LZ_MAX_LENGTH: usize = 0x12;
const LZ_MAX_DISTANCE: usize = 0x1000;

// Finds the longest match for the data at `pos` within the sliding window behind it. Returns
// the match length and its distance; lengths under LZ_MIN_LENGTH aren't worth a reference.
fn find_match(data: &[u8], pos: usize) -> (usize, usize) {
    let max_len = min(LZ_MAX_LENGTH, data.len() - pos);
    let window_start = pos.saturating_sub(LZ_MAX_DISTANCE);
    let mut best_len = 0;
    let mut best_dist = 0;
    for start in window_start..pos {
        let mut len = 0;
        while len < max_len && data[start + len] == data[pos + len] {
            len += 1;
        }
        if len > best_len {
            best_len = len;
            best_dist = pos - start;
            if best_len == max_len {
                break;
            }
        }
    }
    (best_len, best_dist)
}

/// Compresses data using the Wii's LZ77 compression scheme and returns the compressed result.
pub fn compress_lz77(data: &[u8]) -> Result<Vec<u8>, Lz77Error> {
    let mut buf: Vec<u8> = Vec::new();
    buf.extend(b"LZ77\x10");
    buf.write_u24::<LittleEndian>(data.len() as u32)?;
    let mut pos = 0;
    while pos < data.len() {
        // Each flag byte covers the next 8 tokens, most significant bit first.
        let flag_pos = buf.len();
        buf.push(0);
        let mut flag = 0u8;
        for i in 0..8 {
            if pos >= data.len() {
                break;
            }
            let (len, dist) = find_match(data, pos);
            if len >= LZ_MIN_LENGTH {
                let encoded = (((len - LZ_MIN_LENGTH) & 0xF) << 12) | ((dist - 1) & 0xFFF);
                buf.write_u16::<BigEndian>(encoded as u16)?;
                flag |= 1 << (7 - i);
                pos += len;
            } else {
                buf.push(data[pos]);
                pos += 1;
            }
        }
        buf[flag_pos] = flag;
    }
    Ok(buf)
}

/// Decompresses LZ77-compressed data and returns the decompressed result.
pub fn decompress_lz77(data: &[u8]) -> Result<Vec<u8>, Lz77Error> {
    let mut buf = Cursor::new(data);
    // Data extracted from inside another file may be missing the magic and start at the
    // compression type immediately.
    let mut magic = [0u8; 4];
    buf.read_exact(&mut magic)?;
    if &magic != b"LZ77" {
        buf.seek(SeekFrom::Start(0))?;
    }
    let compression_type = buf.read_u8()?;
    if compression_type != 0x10 {
        return Err(Lz77Error::InvalidCompressionType(compression_type));
    }
    let decompressed_size = buf.read_u24::<LittleEndian>()? as usize;
    let mut out = vec![0u8; decompressed_size];
    let mut pos = 0;
    'outer: while pos < decompressed_size {
        let flag = buf.read_u8()?;
        for bit in (0..8).rev() {
            if pos >= decompressed_size {
                break 'outer;
            }
            if flag & (1 << bit) != 0 {
                let reference = buf.read_u16::<BigEndian>()?;
                let len = LZ_MIN_LENGTH + ((reference >> 12) & 0xF) as usize;
                let mut src = pos - ((reference & 0xFFF) as usize + 1);
                // Copies may overlap their own output, so they go byte by byte.
                for _ in 0..len {
                    out[pos] = out[src];
                    pos += 1;
                    src += 1;
                    if pos >= decompressed_size {
                        break;
                    }
                }
            } else {
                out[pos] = buf.read_u8()?;
                pos += 1;
            }
        }
    }
    Ok(out)
}
