//! Page execution scheduling
//!
//! Executes a descriptor sequence either strictly in order or through a
//! bounded pool of concurrent page fetches. Concurrent execution runs in
//! waves of at most `max_workers` pages; between waves the scheduler decides
//! whether to continue (open-ended fetches extend wave by wave until a page
//! comes back short). Results are re-ordered by sequence index, so both
//! modes produce identical output for identical server responses.
//!
//! A fatal failure in any page raises the shared cancellation flag; workers
//! check it before acquiring a rate token, so in-flight calls finish
//! naturally and no new call starts.

use crate::error::{Error, Result};
use crate::plan::{self, PageDescriptor};
use crate::retry::PageFetcher;
use crate::types::PageResult;
use futures::future::join_all;
use tracing::debug;

/// Executes planned pages for one logical fetch
pub struct Scheduler<'a> {
    fetcher: &'a PageFetcher,
    max_workers: usize,
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler over a page fetcher with the given pool size
    pub fn new(fetcher: &'a PageFetcher, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_workers: max_workers.max(1),
        }
    }

    /// Execute a bounded plan
    pub async fn run_bounded(
        &self,
        descriptors: Vec<PageDescriptor>,
        concurrent: bool,
    ) -> Result<Vec<PageResult>> {
        if concurrent {
            self.run_bounded_concurrent(descriptors).await
        } else {
            self.run_bounded_sequential(descriptors).await
        }
    }

    /// Execute an open-ended fetch, extending until the first short page
    pub async fn run_open_ended(
        &self,
        rows_per_call: u32,
        concurrent: bool,
    ) -> Result<Vec<PageResult>> {
        if concurrent {
            self.run_open_concurrent(rows_per_call).await
        } else {
            self.run_open_sequential(rows_per_call).await
        }
    }

    async fn run_bounded_sequential(
        &self,
        descriptors: Vec<PageDescriptor>,
    ) -> Result<Vec<PageResult>> {
        let mut pages = Vec::with_capacity(descriptors.len());
        for desc in &descriptors {
            let page = self.fetcher.fetch(desc).await?;
            let last = page.is_last();
            pages.push(page);
            if last {
                debug!(seq = desc.seq, "end of data before plan exhausted");
                break;
            }
        }
        Ok(pages)
    }

    async fn run_bounded_concurrent(
        &self,
        descriptors: Vec<PageDescriptor>,
    ) -> Result<Vec<PageResult>> {
        let mut pages = Vec::with_capacity(descriptors.len());
        for wave in descriptors.chunks(self.max_workers) {
            let wave_pages = self.run_wave(wave).await?;
            let done = wave_pages.iter().any(PageResult::is_last);
            pages.extend(wave_pages);
            if done {
                break;
            }
        }
        pages.sort_by_key(|p| p.seq);
        Ok(pages)
    }

    async fn run_open_sequential(&self, rows_per_call: u32) -> Result<Vec<PageResult>> {
        let mut pages = Vec::new();
        let mut offset = 0u64;
        let mut seq = 0usize;
        loop {
            let desc = PageDescriptor {
                offset,
                rows: rows_per_call,
                seq,
            };
            let page = self.fetcher.fetch(&desc).await?;
            let last = page.is_last();
            pages.push(page);
            if last {
                break;
            }
            offset += u64::from(rows_per_call);
            seq += 1;
        }
        Ok(pages)
    }

    async fn run_open_concurrent(&self, rows_per_call: u32) -> Result<Vec<PageResult>> {
        let mut pages = Vec::new();
        let mut offset = 0u64;
        let mut seq = 0usize;
        loop {
            let batch = plan::look_ahead(offset, seq, self.max_workers, rows_per_call);
            let wave_pages = self.run_wave(&batch).await?;
            let done = wave_pages.iter().any(PageResult::is_last);
            pages.extend(wave_pages);
            if done {
                break;
            }
            offset += self.max_workers as u64 * u64::from(rows_per_call);
            seq += self.max_workers;
        }
        pages.sort_by_key(|p| p.seq);
        Ok(pages)
    }

    /// Run one wave of concurrent page fetches. Cancelled pages are
    /// dropped; the lowest-sequence real error wins so the surfaced failure
    /// is deterministic.
    async fn run_wave(&self, batch: &[PageDescriptor]) -> Result<Vec<PageResult>> {
        let outcomes = join_all(
            batch
                .iter()
                .map(|desc| async move { (desc.seq, self.fetcher.fetch(desc).await) }),
        )
        .await;

        let mut pages = Vec::with_capacity(outcomes.len());
        let mut first_error: Option<(usize, Error)> = None;
        for (seq, outcome) in outcomes {
            match outcome {
                Ok(page) => pages.push(page),
                Err(Error::Cancelled) => {}
                Err(e) => {
                    if first_error.as_ref().map_or(true, |(s, _)| seq < *s) {
                        first_error = Some((seq, e));
                    }
                }
            }
        }

        if let Some((_, error)) = first_error {
            return Err(error);
        }
        if pages.is_empty() && !batch.is_empty() && self.fetcher.cancel_flag().is_set() {
            return Err(Error::Cancelled);
        }
        Ok(pages)
    }
}
