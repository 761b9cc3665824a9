//! Decoding raw blocks to physical values
//!
//! Every parameter is decoded independently. A field that does not fit in
//! the block yields `NaN` and never aborts the rest of the record.

use crate::precision::round_to_precision;
use crate::types::{DataSource, Parameter};

/// Interpret up to four bytes as a little-endian unsigned integer
pub fn read_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .enumerate()
        .fold(0u32, |acc, (i, &b)| acc | (u32::from(b) << (8 * i)))
}

/// Decode one parameter from a raw block
///
/// Returns `NaN` when the block is too short to contain the field.
pub fn decode(block: &[u8], parameter: &Parameter) -> f64 {
    let Some(slice) = block.get(parameter.byte_offset..parameter.byte_end()) else {
        return f64::NAN;
    };

    let raw = read_le(slice);
    round_to_precision(parameter.conversion.apply(raw), parameter.precision)
}

/// Decode every parameter of a source, appending in declared order
pub fn decode_source_into(block: &[u8], source: &DataSource, out: &mut Vec<f64>) {
    out.extend(source.parameters.iter().map(|p| decode(block, p)));
}

/// Decode every parameter of a source
pub fn decode_source(block: &[u8], source: &DataSource) -> Vec<f64> {
    let mut values = Vec::with_capacity(source.parameters.len());
    decode_source_into(block, source, &mut values);
    values
}
