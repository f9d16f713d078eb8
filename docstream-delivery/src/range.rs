//! Range planning: turns an optional `bytes=<start>-[<end>]` spec into a
//! validated, clipped byte interval.
//!
//! The planner knows nothing about HTTP status codes; callers map
//! [`DeliveryError::InvalidRange`] to a 416-style response.

use crate::error::{DeliveryError, DeliveryResult};
use crate::types::{ByteRange, CHUNK_SIZE};

const UNIT_PREFIX: &str = "bytes=";

/// Interval to serve and whether it is a partial transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangePlan {
    pub range: ByteRange,
    pub is_partial: bool,
}

/// Plans the byte interval for a request against a document of `total_size` bytes.
pub fn plan(requested: Option<&str>, total_size: u64) -> DeliveryResult<RangePlan> {
    if total_size == 0 {
        return Err(DeliveryError::InvalidRange("document is empty".to_string()));
    }

    let Some(spec) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(RangePlan {
            range: ByteRange::new(0, total_size - 1),
            is_partial: false,
        });
    };

    let Some(body) = spec.strip_prefix(UNIT_PREFIX) else {
        return Err(DeliveryError::InvalidRange(format!(
            "range must start with '{UNIT_PREFIX}': {spec}"
        )));
    };

    if body.contains(',') {
        return Err(DeliveryError::InvalidRange(format!(
            "multiple ranges are not supported: {spec}"
        )));
    }

    let Some((start_str, end_str)) = body.split_once('-') else {
        return Err(DeliveryError::InvalidRange(format!("missing '-' in range: {spec}")));
    };

    let start_str = start_str.trim();
    let end_str = end_str.trim();

    if start_str.is_empty() {
        return Err(DeliveryError::InvalidRange(format!(
            "range start is required: {spec}"
        )));
    }

    let start = parse_bound(start_str, "start")?;
    let end = if end_str.is_empty() {
        total_size - 1
    } else {
        parse_bound(end_str, "end")?
    };

    if start > end {
        return Err(DeliveryError::InvalidRange(format!(
            "start {start} is after end {end}"
        )));
    }
    if start >= total_size {
        return Err(DeliveryError::InvalidRange(format!(
            "start {start} is beyond document size {total_size}"
        )));
    }

    Ok(RangePlan {
        range: ByteRange::new(start, end.min(total_size - 1)),
        is_partial: true,
    })
}

fn parse_bound(raw: &str, which: &str) -> DeliveryResult<u64> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DeliveryError::InvalidRange(format!(
            "range {which} is not a non-negative integer: {raw}"
        )));
    }
    raw.parse::<u64>()
        .map_err(|_| DeliveryError::InvalidRange(format!("range {which} out of bounds: {raw}")))
}

/// Formats a `Content-Range` value: `bytes <start>-<end>/<total>`.
pub fn content_range(range: &ByteRange, total_size: u64) -> String {
    format!("bytes {}-{}/{}", range.start, range.end, total_size)
}

/// Number of logical chunks in a document: `ceil(total_size / CHUNK_SIZE)`.
pub fn total_chunks(total_size: u64) -> u64 {
    total_size.div_ceil(CHUNK_SIZE)
}

/// Index of the chunk holding `offset`.
pub fn chunk_index_of(offset: u64) -> u64 {
    offset / CHUNK_SIZE
}

/// Byte interval of chunk `chunk_index`. The last chunk may be short.
pub fn chunk_range(chunk_index: u64, total_size: u64) -> DeliveryResult<ByteRange> {
    let chunks = total_chunks(total_size);
    if chunk_index >= chunks {
        return Err(DeliveryError::InvalidRange(format!(
            "chunk {chunk_index} out of range (document has {chunks} chunks)"
        )));
    }

    let start = chunk_index * CHUNK_SIZE;
    let end = (start + CHUNK_SIZE - 1).min(total_size - 1);
    Ok(ByteRange::new(start, end))
}

/// Offset of the first byte after the chunk holding `offset`.
pub(crate) fn next_chunk_boundary(offset: u64) -> u64 {
    (chunk_index_of(offset) + 1) * CHUNK_SIZE
}
