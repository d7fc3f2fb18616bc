//! Postings list encodings.
//!
//! Every codec maps a strictly increasing list of doc ids to a byte blob and
//! back. The three variants trade decode speed for size:
//!
//! * [`PostingsEncoding::Standard`]: 32-bit little-endian ids, no compression.
//! * [`PostingsEncoding::VariableByte`]: first id plus gaps, each written with
//!   variable-byte encoding (high bit marks the last byte of a number).
//! * [`PostingsEncoding::EliasGamma`]: each id written as the gamma code of
//!   `id + 1`, bit-packed behind a variable-byte bit-count header.

use std::fmt;
use std::str::FromStr;

use bit_vec::BitVec;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::DocId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostingsEncoding {
    #[serde(rename = "standard")]
    Standard,
    #[default]
    #[serde(rename = "vbe")]
    VariableByte,
    #[serde(rename = "elias-gamma")]
    EliasGamma,
}

impl PostingsEncoding {
    pub const ALL: [PostingsEncoding; 3] = [
        PostingsEncoding::Standard,
        PostingsEncoding::VariableByte,
        PostingsEncoding::EliasGamma,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PostingsEncoding::Standard => "standard",
            PostingsEncoding::VariableByte => "vbe",
            PostingsEncoding::EliasGamma => "elias-gamma",
        }
    }

    /// Byte recorded in an index directory so readers can detect a codec mismatch.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            PostingsEncoding::Standard => 0,
            PostingsEncoding::VariableByte => 1,
            PostingsEncoding::EliasGamma => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        PostingsEncoding::ALL.into_iter().find(|e| e.tag() == tag)
    }

    /// Encode a strictly increasing postings list.
    pub fn encode(&self, postings: &[DocId]) -> Result<Vec<u8>> {
        check_strictly_increasing(postings)?;
        match self {
            PostingsEncoding::Standard => Ok(encode_standard(postings)),
            PostingsEncoding::VariableByte => Ok(encode_vbe(postings)),
            PostingsEncoding::EliasGamma => encode_elias_gamma(postings),
        }
    }

    /// Decode a blob produced by [`PostingsEncoding::encode`] with the same variant.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<DocId>> {
        let postings = match self {
            PostingsEncoding::Standard => decode_standard(bytes)?,
            PostingsEncoding::VariableByte => decode_vbe(bytes)?,
            PostingsEncoding::EliasGamma => decode_elias_gamma(bytes)?,
        };
        if let Err(IndexError::NotStrictlyIncreasing { position, .. }) =
            check_strictly_increasing(&postings)
        {
            return Err(IndexError::malformed(
                *self,
                format!("decoded ids are not strictly increasing at position {position}"),
            ));
        }
        Ok(postings)
    }
}

impl fmt::Display for PostingsEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PostingsEncoding {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "fixed" | "fixed-width" => Ok(PostingsEncoding::Standard),
            "vbe" | "vb" | "variable-byte" => Ok(PostingsEncoding::VariableByte),
            "elias-gamma" | "gamma" | "eg" => Ok(PostingsEncoding::EliasGamma),
            _ => Err(IndexError::UnknownEncoding(s.to_string())),
        }
    }
}

fn check_strictly_increasing(postings: &[DocId]) -> Result<()> {
    for (i, pair) in postings.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(IndexError::NotStrictlyIncreasing {
                position: i + 1,
                previous: pair[0],
                current: pair[1],
            });
        }
    }
    Ok(())
}

fn encode_standard(postings: &[DocId]) -> Vec<u8> {
    let mut out = vec![0u8; postings.len() * 4];
    LittleEndian::write_u32_into(postings, &mut out);
    out
}

fn decode_standard(bytes: &[u8]) -> Result<Vec<DocId>> {
    if bytes.len() % 4 != 0 {
        return Err(IndexError::malformed(
            PostingsEncoding::Standard,
            format!("length {} is not a multiple of 4", bytes.len()),
        ));
    }
    let mut postings = vec![0; bytes.len() / 4];
    LittleEndian::read_u32_into(bytes, &mut postings);
    Ok(postings)
}

/// Append the variable-byte form of `number`: 7-bit groups, most significant
/// first, with the high bit set only on the final (least significant) group.
pub fn vb_encode_number(mut number: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    loop {
        groups[len] = (number % 128) as u8;
        len += 1;
        if number < 128 {
            break;
        }
        number /= 128;
    }
    groups[0] |= 0x80;
    out.extend(groups[..len].iter().rev());
}

pub fn vb_encode(numbers: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(numbers.len());
    for &n in numbers {
        vb_encode_number(n, &mut out);
    }
    out
}

/// Read one variable-byte number from the front of `bytes`, returning it with
/// the number of bytes consumed.
fn read_vb_number(bytes: &[u8]) -> std::result::Result<(u32, usize), &'static str> {
    let mut n: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        n = n * 128 + u64::from(byte & 0x7F);
        if n > u64::from(u32::MAX) {
            return Err("number exceeds 32 bits");
        }
        if byte & 0x80 != 0 {
            return Ok((n as u32, i + 1));
        }
    }
    Err("truncated variable-byte number")
}

pub fn vb_decode(bytes: &[u8]) -> Result<Vec<u32>> {
    let mut numbers = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let (n, used) = read_vb_number(&bytes[pos..]).map_err(|reason| {
            IndexError::malformed(
                PostingsEncoding::VariableByte,
                format!("{reason} at byte {pos}"),
            )
        })?;
        numbers.push(n);
        pos += used;
    }
    Ok(numbers)
}

fn encode_vbe(postings: &[DocId]) -> Vec<u8> {
    let mut out = Vec::with_capacity(postings.len());
    let mut prev = None;
    for &doc_id in postings {
        let gap = match prev {
            Some(p) => doc_id - p,
            None => doc_id,
        };
        vb_encode_number(gap, &mut out);
        prev = Some(doc_id);
    }
    out
}

fn decode_vbe(bytes: &[u8]) -> Result<Vec<DocId>> {
    let gaps = vb_decode(bytes)?;
    let mut postings = Vec::with_capacity(gaps.len());
    let mut acc: Option<DocId> = None;
    for gap in gaps {
        let doc_id = match acc {
            Some(prev) => prev.checked_add(gap).ok_or_else(|| {
                IndexError::malformed(PostingsEncoding::VariableByte, "doc id overflows 32 bits")
            })?,
            None => gap,
        };
        postings.push(doc_id);
        acc = Some(doc_id);
    }
    Ok(postings)
}

fn encode_elias_gamma(postings: &[DocId]) -> Result<Vec<u8>> {
    let mut bits = BitVec::new();
    for &doc_id in postings {
        let x = u64::from(doc_id) + 1;
        let n = 63 - x.leading_zeros();
        for _ in 0..n {
            bits.push(false);
        }
        bits.push(true);
        for shift in (0..n).rev() {
            bits.push((x >> shift) & 1 == 1);
        }
    }
    let bit_len = u32::try_from(bits.len()).map_err(|_| {
        IndexError::malformed(PostingsEncoding::EliasGamma, "bit stream exceeds 2^32 bits")
    })?;
    let mut out = Vec::with_capacity(5 + bits.len().div_ceil(8));
    vb_encode_number(bit_len, &mut out);
    out.extend(bits.to_bytes());
    Ok(out)
}

fn decode_elias_gamma(bytes: &[u8]) -> Result<Vec<DocId>> {
    let malformed = |reason: String| IndexError::malformed(PostingsEncoding::EliasGamma, reason);

    let (bit_len, header_len) =
        read_vb_number(bytes).map_err(|reason| malformed(format!("bit-length header: {reason}")))?;
    let bit_len = bit_len as usize;
    let payload = &bytes[header_len..];
    if payload.len() != bit_len.div_ceil(8) {
        return Err(malformed(format!(
            "{bit_len} bits need {} payload bytes, found {}",
            bit_len.div_ceil(8),
            payload.len()
        )));
    }

    let bits = BitVec::from_bytes(payload);
    let mut postings = Vec::new();
    let mut pos = 0;
    while pos < bit_len {
        let mut n = 0u32;
        loop {
            if pos >= bit_len {
                return Err(malformed(format!("unterminated unary prefix at bit {pos}")));
            }
            let bit = bits[pos];
            pos += 1;
            if bit {
                break;
            }
            n += 1;
        }
        if n > 32 {
            return Err(malformed(format!("unary length {n} exceeds 32")));
        }
        if pos + n as usize > bit_len {
            return Err(malformed(format!("truncated remainder at bit {pos}")));
        }
        let mut x: u64 = 1;
        for _ in 0..n {
            x = (x << 1) | u64::from(bits[pos]);
            pos += 1;
        }
        let doc_id = DocId::try_from(x - 1)
            .map_err(|_| malformed(format!("value {} exceeds 32 bits", x - 1)))?;
        postings.push(doc_id);
    }
    Ok(postings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Vec<DocId>> {
        vec![
            vec![],
            vec![0],
            vec![7],
            vec![34, 67, 89, 454, 2345738],
            vec![0, 1, 2, 3, 4, 5, 127, 128, 129, 16383, 16384],
            vec![0, u32::MAX],
            vec![u32::MAX],
        ]
    }

    #[test]
    fn every_codec_round_trips() {
        for encoding in PostingsEncoding::ALL {
            for postings in samples() {
                let bytes = encoding.encode(&postings).unwrap();
                assert_eq!(encoding.decode(&bytes).unwrap(), postings, "{encoding}");
            }
        }
    }

    #[test]
    fn standard_is_little_endian_u32() {
        let bytes = PostingsEncoding::Standard.encode(&[1, 256]).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn vb_number_layout() {
        let mut out = Vec::new();
        vb_encode_number(824, &mut out);
        assert_eq!(out, vec![6, 184]);

        out.clear();
        vb_encode_number(5, &mut out);
        assert_eq!(out, vec![133]);

        out.clear();
        vb_encode_number(0, &mut out);
        assert_eq!(out, vec![128]);
    }

    #[test]
    fn vbe_stores_gaps() {
        let bytes = PostingsEncoding::VariableByte
            .encode(&[824, 829, 215406])
            .unwrap();
        assert_eq!(bytes, vec![6, 184, 133, 13, 12, 177]);
        assert_eq!(vb_encode(&[824, 5, 214577]), bytes);
        assert_eq!(vb_decode(&bytes).unwrap(), vec![824, 5, 214577]);
    }

    #[test]
    fn elias_gamma_bit_layout() {
        // 0 -> gamma(1) = "1"
        let bytes = PostingsEncoding::EliasGamma.encode(&[0]).unwrap();
        assert_eq!(bytes, vec![0x81, 0b1000_0000]);

        // 4 -> gamma(5) = "00101"
        let bytes = PostingsEncoding::EliasGamma.encode(&[4]).unwrap();
        assert_eq!(bytes, vec![0x85, 0b0010_1000]);

        // empty list keeps its zero-length header
        let bytes = PostingsEncoding::EliasGamma.encode(&[]).unwrap();
        assert_eq!(bytes, vec![0x80]);
    }

    #[test]
    fn compression_shrinks_dense_lists() {
        let dense: Vec<DocId> = (0..1000).collect();
        let standard = PostingsEncoding::Standard.encode(&dense).unwrap();
        let vbe = PostingsEncoding::VariableByte.encode(&dense).unwrap();
        assert_eq!(standard.len(), 4000);
        assert_eq!(vbe.len(), 1000);
    }

    #[test]
    fn rejects_unsorted_or_duplicate_input() {
        for encoding in PostingsEncoding::ALL {
            let err = encoding.encode(&[3, 3]).unwrap_err();
            assert!(err.is_codec_violation());
            let err = encoding.encode(&[5, 9, 2]).unwrap_err();
            match err {
                IndexError::NotStrictlyIncreasing {
                    position,
                    previous,
                    current,
                } => assert_eq!((position, previous, current), (2, 9, 2)),
                other => panic!("unexpected error {other}"),
            }
        }
    }

    #[test]
    fn rejects_malformed_streams() {
        // no terminating byte
        assert!(PostingsEncoding::VariableByte.decode(&[0x05]).is_err());
        // more than 32 bits
        assert!(PostingsEncoding::VariableByte
            .decode(&[0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0xFF])
            .is_err());
        // ragged fixed-width stream
        assert!(PostingsEncoding::Standard.decode(&[1, 0, 0]).is_err());
        // header promises more bits than stored
        assert!(PostingsEncoding::EliasGamma.decode(&[0x90, 0xFF]).is_err());
        // unary prefix never terminates
        assert!(PostingsEncoding::EliasGamma.decode(&[0x88, 0x00]).is_err());
        // missing header
        assert!(PostingsEncoding::EliasGamma.decode(&[]).is_err());
        // zero gap decodes to a duplicate
        let err = PostingsEncoding::VariableByte
            .decode(&[0x83, 0x80])
            .unwrap_err();
        assert!(matches!(err, IndexError::MalformedPostings { .. }));
    }

    #[test]
    fn parses_encoding_names() {
        assert_eq!("vbe".parse::<PostingsEncoding>().unwrap(), PostingsEncoding::VariableByte);
        assert_eq!("Gamma".parse::<PostingsEncoding>().unwrap(), PostingsEncoding::EliasGamma);
        assert_eq!("fixed".parse::<PostingsEncoding>().unwrap(), PostingsEncoding::Standard);
        assert!("lz4".parse::<PostingsEncoding>().is_err());
        for encoding in PostingsEncoding::ALL {
            assert_eq!(encoding.to_string().parse::<PostingsEncoding>().unwrap(), encoding);
            assert_eq!(PostingsEncoding::from_tag(encoding.tag()), Some(encoding));
        }
    }
}
