//! Base64 packing of numeric arrays.
//!
//! Large arrays travel as base64 text of little-endian packed elements,
//! keyed by a field name that tells the client the element type:
//!
//! | field    | element |
//! |----------|---------|
//! | `b64dbl` | f64     |
//! | `b64int` | i32     |
//! | `b64srt` | i16     |
//! | `b64byt` | u8      |
//!
//! Byte order is always little-endian, independent of the host.

use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use crate::error::ProtocolError;

/// Integer range that still fits the byte encoding.
///
/// Negative values down to -128 are accepted and wrap into `0..=255` the same
/// way the browser client's `Uint8Array` view reads them.
const BYTE_RANGE: (i64, i64) = (-128, 255);
const SHORT_RANGE: (i64, i64) = (i16::MIN as i64, i16::MAX as i64);
const INT_RANGE: (i64, i64) = (i32::MIN as i64, i32::MAX as i64);

/// A numeric array packed for the wire. Serializes as a single
/// `"b64xxx": "<base64>"` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EncodedArray {
    #[serde(rename = "b64dbl")]
    Float64(String),
    #[serde(rename = "b64int")]
    Int32(String),
    #[serde(rename = "b64srt")]
    Int16(String),
    #[serde(rename = "b64byt")]
    UInt8(String),
}

impl EncodedArray {
    /// Packs floating-point elements as f64.
    pub fn from_doubles(values: &[f64]) -> Self {
        Self::Float64(pack(values.iter().flat_map(|v| v.to_le_bytes())))
    }

    /// Packs integer elements using the narrowest type covering the observed
    /// min/max. Returns `None` for an empty slice.
    ///
    /// Arrays exceeding the i32 range are sent as `b64dbl` rather than
    /// `b64int`. Clients must accept a float64 array for integer channels
    /// whose values do not fit in 32 bits; elements beyond 2^53 lose
    /// precision instead of wrapping.
    pub fn from_ints(values: &[i64]) -> Option<Self> {
        let min = values.iter().copied().min()?;
        let max = values.iter().copied().max()?;
        let within = |(lo, hi): (i64, i64)| min >= lo && max <= hi;

        let encoded = if within(BYTE_RANGE) {
            Self::UInt8(pack(values.iter().map(|v| *v as u8)))
        } else if within(SHORT_RANGE) {
            Self::Int16(pack(values.iter().flat_map(|v| (*v as i16).to_le_bytes())))
        } else if within(INT_RANGE) {
            Self::Int32(pack(values.iter().flat_map(|v| (*v as i32).to_le_bytes())))
        } else {
            Self::Float64(pack(values.iter().flat_map(|v| (*v as f64).to_le_bytes())))
        };
        Some(encoded)
    }

    /// The wire field name carrying this array.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Float64(_) => "b64dbl",
            Self::Int32(_) => "b64int",
            Self::Int16(_) => "b64srt",
            Self::UInt8(_) => "b64byt",
        }
    }

    /// The base64 payload.
    pub fn as_base64(&self) -> &str {
        match self {
            Self::Float64(s) | Self::Int32(s) | Self::Int16(s) | Self::UInt8(s) => s,
        }
    }
}

fn pack(bytes: impl Iterator<Item = u8>) -> String {
    let buf: Vec<u8> = bytes.collect();
    general_purpose::STANDARD.encode(buf)
}

fn unpack<const N: usize>(b64: &str) -> Result<Vec<[u8; N]>, ProtocolError> {
    let bytes = general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| ProtocolError::InvalidArray(e.to_string()))?;

    if bytes.len() % N != 0 {
        return Err(ProtocolError::InvalidArray(format!(
            "{} bytes is not a multiple of {N}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(N)
        .filter_map(|chunk| <[u8; N]>::try_from(chunk).ok())
        .collect())
}

/// Decodes a `b64dbl` payload.
pub fn decode_f64(b64: &str) -> Result<Vec<f64>, ProtocolError> {
    Ok(unpack::<8>(b64)?.into_iter().map(f64::from_le_bytes).collect())
}

/// Decodes a `b64int` payload.
pub fn decode_i32(b64: &str) -> Result<Vec<i32>, ProtocolError> {
    Ok(unpack::<4>(b64)?.into_iter().map(i32::from_le_bytes).collect())
}

/// Decodes a `b64srt` payload.
pub fn decode_i16(b64: &str) -> Result<Vec<i16>, ProtocolError> {
    Ok(unpack::<2>(b64)?.into_iter().map(i16::from_le_bytes).collect())
}

/// Decodes a `b64byt` payload.
pub fn decode_u8(b64: &str) -> Result<Vec<u8>, ProtocolError> {
    general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| ProtocolError::InvalidArray(e.to_string()))
}
