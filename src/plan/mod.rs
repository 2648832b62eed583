//! Pagination planning
//!
//! Turns a requested row count and a per-call row cap into the ordered
//! sequence of page descriptors covering it. Offsets are contiguous and
//! non-overlapping; the sequence index fixes result ordering independent of
//! completion order.
//!
//! Open-ended requests (row limit 0) cannot be planned upfront: the
//! scheduler asks for bounded [`look_ahead`] batches and extends until a
//! page comes back short.

use serde::{Deserialize, Serialize};

/// One planned page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// First row of the page
    pub offset: u64,

    /// Rows to request
    pub rows: u32,

    /// Position in the planned sequence; fixes output ordering
    pub seq: usize,
}

/// Plan the full descriptor sequence for a bounded request.
///
/// Produces `ceil(row_limit / rows_per_call)` pages; the last page carries
/// the remainder when the cap does not divide evenly. An empty plan means
/// nothing to fetch.
pub fn plan(row_limit: u64, rows_per_call: u32) -> Vec<PageDescriptor> {
    debug_assert!(rows_per_call > 0, "uncapped endpoints are fetched in one call");
    if rows_per_call == 0 {
        return Vec::new();
    }

    let cap = u64::from(rows_per_call);
    let mut pages = Vec::with_capacity(row_limit.div_ceil(cap) as usize);
    let mut offset = 0;
    let mut seq = 0;
    while offset < row_limit {
        let rows = cap.min(row_limit - offset) as u32;
        pages.push(PageDescriptor { offset, rows, seq });
        offset += u64::from(rows);
        seq += 1;
    }
    pages
}

/// Plan the next look-ahead batch of an open-ended fetch: `pages` full-size
/// descriptors continuing from the given offset and sequence position.
pub fn look_ahead(
    next_offset: u64,
    next_seq: usize,
    pages: usize,
    rows_per_call: u32,
) -> Vec<PageDescriptor> {
    (0..pages)
        .map(|i| PageDescriptor {
            offset: next_offset + i as u64 * u64::from(rows_per_call),
            rows: rows_per_call,
            seq: next_seq + i,
        })
        .collect()
}
