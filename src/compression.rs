//! Self-describing compression container.
//!
//! Wire layout (little-endian):
//!
//! ```text
//! offset 0   3 bytes   magic "CMP"
//! offset 3   1 byte    container version (3)
//! offset 4   1 byte    algorithm tag
//! offset 5   8 bytes   original (uncompressed) length
//! offset 13  ...       payload
//! ```
//!
//! Both algorithms are variable-width LZW: codes start at 9 bits and grow
//! to 16, the dictionary is capped at 2^16 entries. When the next code to
//! assign reaches `2^width` the width grows by one and the bit stream is
//! **aligned to the next byte boundary** — the alignment is part of the
//! wire format and both sides must mirror it. The two algorithms differ
//! only in dictionary policy: `LzwAll` admits every new phrase, `LzwAlpha`
//! admits a phrase only when every byte of it is an ASCII letter.

use crate::content::Content;
use crate::error::{Result, VfsError};

pub const MAGIC: [u8; 3] = *b"CMP";
pub const CONTAINER_VERSION: u8 = 3;
pub const HEADER_LEN: usize = 13;

const MIN_BITS: u32 = 9;
const MAX_BITS: u32 = 16;
const FIRST_FREE: u32 = 256;
const DICT_LIMIT: u32 = 1 << MAX_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Algorithm {
    /// Dictionary extended with every new phrase until the limit.
    LzwAll = 2,
    /// Dictionary extended only with all-letter phrases.
    LzwAlpha = 3,
}

impl Algorithm {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(Algorithm::LzwAll),
            3 => Some(Algorithm::LzwAlpha),
            _ => None,
        }
    }

    fn alpha_only(self) -> bool {
        matches!(self, Algorithm::LzwAlpha)
    }
}

/// LSB-first bit accumulator.
struct BitWriter {
    bit_buf: u32,
    bit_count: u32,
    out: Vec<u8>,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter {
            bit_buf: 0,
            bit_count: 0,
            out: Vec::new(),
        }
    }

    fn put(&mut self, value: u32, nbits: u32) {
        let mask = if nbits >= 32 {
            u32::MAX
        } else {
            (1u32 << nbits) - 1
        };
        self.bit_buf |= (value & mask) << self.bit_count;
        self.bit_count += nbits;
        while self.bit_count >= 8 {
            self.out.push((self.bit_buf & 0xFF) as u8);
            self.bit_buf >>= 8;
            self.bit_count -= 8;
        }
    }

    fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            self.out.push((self.bit_buf & 0xFF) as u8);
            self.bit_buf = 0;
            self.bit_count = 0;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.out
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u32,
    bit_count: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn get(&mut self, nbits: u32) -> Option<u32> {
        while self.bit_count < nbits {
            if self.pos >= self.data.len() {
                return None;
            }
            self.bit_buf |= (self.data[self.pos] as u32) << self.bit_count;
            self.pos += 1;
            self.bit_count += 8;
        }
        let mask = if nbits >= 32 {
            u32::MAX
        } else {
            (1u32 << nbits) - 1
        };
        let value = self.bit_buf & mask;
        self.bit_buf >>= nbits;
        self.bit_count -= nbits;
        Some(value)
    }

    /// Discard buffered bits so the next read starts at a byte boundary.
    fn align_to_byte(&mut self) {
        self.bit_buf = 0;
        self.bit_count = 0;
    }
}

fn phrase_admissible(alpha_only: bool, phrase: &[u8]) -> bool {
    !alpha_only || phrase.iter().all(|b| b.is_ascii_alphabetic())
}

fn encode(input: &[u8], alpha_only: bool) -> Vec<u8> {
    let mut writer = BitWriter::new();
    if input.is_empty() {
        return writer.finish();
    }

    let mut dict: std::collections::HashMap<Vec<u8>, u32> =
        (0..256u32).map(|i| (vec![i as u8], i)).collect();
    let mut phrase = vec![input[0]];
    let mut next_code = FIRST_FREE;
    let mut code_bits = MIN_BITS;

    for &byte in &input[1..] {
        let mut extended = phrase.clone();
        extended.push(byte);
        if dict.contains_key(&extended) {
            phrase = extended;
            continue;
        }

        writer.put(dict[&phrase], code_bits);

        if next_code < DICT_LIMIT && phrase_admissible(alpha_only, &extended) {
            if next_code == (1 << code_bits) && code_bits < MAX_BITS {
                code_bits += 1;
                writer.align_to_byte();
            }
            dict.insert(extended, next_code);
            next_code += 1;
        }

        phrase = vec![byte];
    }

    writer.put(dict[&phrase], code_bits);
    writer.finish()
}

fn decode(payload: &[u8], alpha_only: bool) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = BitReader::new(payload);
    let first = reader
        .get(MIN_BITS)
        .ok_or_else(|| VfsError::Corrupted("truncated bit stream".into()))?;
    if first >= FIRST_FREE {
        return Err(VfsError::Corrupted("initial code outside byte range".into()));
    }

    let mut dict: Vec<Vec<u8>> = (0..256u32).map(|i| vec![i as u8]).collect();
    let mut prev = dict[first as usize].clone();
    let mut out = prev.clone();
    let mut next_code = FIRST_FREE;
    let mut code_bits = MIN_BITS;

    while let Some(code) = reader.get(code_bits) {
        let entry = if (code as usize) < dict.len() {
            dict[code as usize].clone()
        } else if code == next_code {
            // KωKωK: the code refers to the phrase being defined right now.
            let mut entry = prev.clone();
            entry.push(prev[0]);
            entry
        } else {
            return Err(VfsError::Corrupted(format!(
                "code {code} beyond dictionary of {}",
                dict.len()
            )));
        };

        out.extend_from_slice(&entry);

        if next_code < DICT_LIMIT {
            let mut candidate = prev.clone();
            candidate.push(entry[0]);
            if phrase_admissible(alpha_only, &candidate) {
                if next_code == (1 << code_bits) && code_bits < MAX_BITS {
                    code_bits += 1;
                    reader.align_to_byte();
                }
                dict.push(candidate);
                next_code += 1;
            }
        }

        prev = entry;
    }

    Ok(out)
}

/// True iff the buffer starts with a well-formed container header.
pub fn is_compressed(content: &Content) -> bool {
    let bytes = content.bytes();
    bytes.len() >= HEADER_LEN
        && bytes[..3] == MAGIC
        && bytes[3] == CONTAINER_VERSION
        && Algorithm::from_u8(bytes[4]).is_some()
}

/// Wrap the buffer in a container. No-op when already compressed.
pub fn compress_in_place(content: &mut Content, algorithm: Algorithm) -> Result<()> {
    if is_compressed(content) {
        return Ok(());
    }
    let raw = content.bytes();
    let payload = encode(raw, algorithm.alpha_only());
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(CONTAINER_VERSION);
    out.push(algorithm as u8);
    out.extend_from_slice(&(raw.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    content.replace_all(out);
    Ok(())
}

/// Unwrap a container, restoring the original bytes.
pub fn decompress_in_place(content: &mut Content) -> Result<()> {
    let bytes = content.bytes();
    if bytes.len() < HEADER_LEN || bytes[..3] != MAGIC {
        return Err(VfsError::InvalidArg("missing container magic".into()));
    }
    if bytes[3] != CONTAINER_VERSION {
        return Err(VfsError::Unsupported(format!(
            "container version {}",
            bytes[3]
        )));
    }
    let algorithm = Algorithm::from_u8(bytes[4])
        .ok_or_else(|| VfsError::Unsupported(format!("algorithm tag {}", bytes[4])))?;
    let mut advertised = [0u8; 8];
    advertised.copy_from_slice(&bytes[5..13]);
    let advertised = u64::from_le_bytes(advertised);

    let raw = decode(&bytes[HEADER_LEN..], algorithm.alpha_only())?;
    if raw.len() as u64 != advertised {
        return Err(VfsError::Corrupted(format!(
            "length mismatch: header says {advertised}, payload decodes to {}",
            raw.len()
        )));
    }
    content.replace_all(raw);
    Ok(())
}
