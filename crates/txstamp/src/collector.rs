// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Report collection.
//!
//! The report source is pull-based and paginated: each call returns up to
//! the requested number of records, and an empty batch means exhausted.
//! [`drain`] requests randomly sized batches (seeded, so runs are
//! reproducible) to exercise the source's pagination, validates every
//! record and concatenates batches in the order they were returned.
//!
//! Collection is all-or-nothing: any source failure discards what was
//! already collected.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::error::{ReconcileError, SourceError};
use crate::report::{RawReport, TimestampReport};

/// Pull-based, paginated report source.
pub trait ReportSource {
    /// Return up to `max` records; an empty batch means exhausted.
    fn fetch(&mut self, max: usize) -> Result<Vec<RawReport>, SourceError>;
}

impl<S: ReportSource + ?Sized> ReportSource for &mut S {
    fn fetch(&mut self, max: usize) -> Result<Vec<RawReport>, SourceError> {
        (**self).fetch(max)
    }
}

impl<S: ReportSource + ?Sized> ReportSource for Box<S> {
    fn fetch(&mut self, max: usize) -> Result<Vec<RawReport>, SourceError> {
        (**self).fetch(max)
    }
}

/// In-memory report queue.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    queue: VecDeque<RawReport>,
    calls: usize,
}

impl MemorySource {
    /// Create a source holding `records`.
    pub fn new(records: Vec<RawReport>) -> Self {
        Self {
            queue: records.into(),
            calls: 0,
        }
    }

    /// Create a source from validated reports.
    pub fn from_reports<I>(reports: I) -> Self
    where
        I: IntoIterator<Item = TimestampReport>,
    {
        Self::new(reports.into_iter().map(RawReport::from).collect())
    }

    /// Append records (new traffic).
    pub fn push(&mut self, record: RawReport) {
        self.queue.push_back(record);
    }

    /// Records not yet fetched.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of `fetch` calls served.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl ReportSource for MemorySource {
    fn fetch(&mut self, max: usize) -> Result<Vec<RawReport>, SourceError> {
        self.calls += 1;
        let n = max.min(self.queue.len());
        Ok(self.queue.drain(..n).collect())
    }
}

/// Batch policy for [`drain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainConfig {
    /// Smallest batch requested (>= 1).
    pub min_batch: usize,
    /// Largest batch requested.
    pub max_batch: usize,
    /// Stop after the first call regardless of its size.
    pub single_call: bool,
    /// Seed of the batch-size generator.
    pub seed: u64,
}

impl DrainConfig {
    /// Batches drawn from `[min_batch, max_batch]`.
    pub fn new(min_batch: usize, max_batch: usize) -> Self {
        Self {
            min_batch,
            max_batch,
            ..Self::default()
        }
    }

    /// Fixed batch size.
    pub fn fixed(batch: usize) -> Self {
        Self::new(batch, batch)
    }

    /// Take exactly one snapshot.
    pub fn single_call(mut self) -> Self {
        self.single_call = true;
        self
    }

    /// Set the batch-size seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the batch range.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.min_batch == 0 {
            return Err(ReconcileError::config("min_batch must be at least 1"));
        }
        if self.min_batch > self.max_batch {
            return Err(ReconcileError::config(format!(
                "min_batch {} exceeds max_batch {}",
                self.min_batch, self.max_batch
            )));
        }
        Ok(())
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            min_batch: 1,
            max_batch: 64,
            single_call: false,
            seed: 0x7473_7461_6d70,
        }
    }
}

/// Drain `source` into one ordered, validated report sequence.
pub fn drain<S>(source: &mut S, config: &DrainConfig) -> Result<Vec<TimestampReport>, ReconcileError>
where
    S: ReportSource + ?Sized,
{
    config.validate()?;

    let mut rng = fastrand::Rng::with_seed(config.seed);
    let mut reports = Vec::new();
    let mut calls = 0usize;

    loop {
        let requested = rng.usize(config.min_batch..=config.max_batch);
        let batch = source.fetch(requested)?;
        calls += 1;

        if batch.len() > requested {
            return Err(SourceError::Oversized {
                requested,
                returned: batch.len(),
            }
            .into());
        }
        trace!(
            "[collector] call #{}: requested {}, got {}",
            calls,
            requested,
            batch.len()
        );

        let exhausted = batch.is_empty();
        for raw in batch {
            let index = reports.len();
            reports.push(raw.validate(index)?);
        }

        if exhausted || config.single_call {
            break;
        }
    }

    debug!(
        "[collector] drained {} reports in {} calls",
        reports.len(),
        calls
    );
    Ok(reports)
}
