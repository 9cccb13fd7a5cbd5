//! Paginated range scans.
//!
//! A [`Scan`] describes a windowed walk over one partition along either the
//! sort key or the score axis. [`Scan::run`] turns it into a lazy
//! [`RangeScan`] that fetches pages on demand, following the store's cursor,
//! skipping the first `offset` matches and stopping after `count` (0 means
//! all). Each page request asks for exactly the items still needed, skipped
//! ones included.
//!
//! Negative indices are not understood here; resolve them first with
//! [`normalize_range`] or [`normalize_index`].

use std::collections::VecDeque;

use futures::Stream;
use tracing::debug;

use crate::backend::{Axis, Backend, Cursor, Query, Select};
use crate::error::Result;
use crate::expression::SortCondition;
use crate::item::Item;
use crate::range::{self, RangeCap};

/// Description of a range scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    partition: String,
    axis: Axis,
    condition: Option<SortCondition>,
    offset: usize,
    count: usize,
    forward: bool,
    select: Select,
    consistent: bool,
}

impl Scan {
    /// Ascending scan of every item in `partition`, ordered by sort key.
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            axis: Axis::SortKey,
            condition: None,
            offset: 0,
            count: 0,
            forward: true,
            select: Select::Items,
            consistent: true,
        }
    }

    /// Order by score instead of sort key.
    pub fn by_score(mut self) -> Self {
        self.axis = Axis::Score;
        self
    }

    pub fn axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }

    /// Restrict to `[lower, upper]` on the scan axis.
    pub fn range(mut self, lower: &RangeCap, upper: &RangeCap) -> Self {
        self.condition = range::condition(lower, upper);
        self
    }

    /// Restrict with an explicit predicate on the scan axis.
    pub fn condition(mut self, condition: SortCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Maximum number of results; 0 for all.
    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn reverse(mut self) -> Self {
        self.forward = false;
        self
    }

    pub fn forward(mut self, forward: bool) -> Self {
        self.forward = forward;
        self
    }

    /// Return keys and scores only.
    pub fn keys_only(mut self) -> Self {
        self.select = Select::Keys;
        self
    }

    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent = consistent;
        self
    }

    /// Start the scan.
    pub fn run(self, backend: &dyn Backend) -> RangeScan<'_> {
        RangeScan {
            backend,
            scan: self,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
            seen: 0,
            returned: 0,
        }
    }

    /// Run to completion and collect the results.
    pub async fn collect(self, backend: &dyn Backend) -> Result<Vec<Item>> {
        self.run(backend).collect().await
    }

    /// Number of matches inside the window, using count-only queries.
    pub async fn matches(self, backend: &dyn Backend) -> Result<usize> {
        let mut query = self.query(Select::Count);
        let mut total = 0;
        loop {
            let page = backend.query(&query).await?;
            total += page.count;
            match page.cursor {
                Some(cursor) => query.cursor = Some(cursor),
                None => break,
            }
        }

        let windowed = total.saturating_sub(self.offset);
        Ok(if self.count > 0 {
            windowed.min(self.count)
        } else {
            windowed
        })
    }

    fn query(&self, select: Select) -> Query {
        Query {
            partition: self.partition.clone(),
            axis: self.axis,
            condition: self.condition.clone(),
            forward: self.forward,
            limit: None,
            cursor: None,
            select,
            consistent: self.consistent,
        }
    }
}

/// A running scan. Finite and not restartable; every page is a fresh round
/// trip.
pub struct RangeScan<'a> {
    backend: &'a dyn Backend,
    scan: Scan,
    buffer: VecDeque<Item>,
    cursor: Option<Cursor>,
    exhausted: bool,
    /// Matches consumed so far, skipped ones included.
    seen: usize,
    returned: usize,
}

impl<'a> RangeScan<'a> {
    /// Next item in scan order, or `None` when the window is exhausted.
    pub async fn next(&mut self) -> Result<Option<Item>> {
        loop {
            if self.scan.count > 0 && self.returned >= self.scan.count {
                return Ok(None);
            }

            if let Some(item) = self.buffer.pop_front() {
                let position = self.seen;
                self.seen += 1;
                if position < self.scan.offset {
                    continue;
                }
                self.returned += 1;
                return Ok(Some(item));
            }

            if self.exhausted {
                return Ok(None);
            }
            self.fetch().await?;
        }
    }

    async fn fetch(&mut self) -> Result<()> {
        let mut query = self.scan.query(self.scan.select);
        query.cursor = self.cursor.take();
        if self.scan.count > 0 {
            let needed = (self.scan.offset + self.scan.count).saturating_sub(self.seen);
            query.limit = Some(needed.max(1));
        }

        let page = self.backend.query(&query).await?;
        debug!(
            partition = %self.scan.partition,
            limit = ?query.limit,
            fetched = page.items.len(),
            more = page.cursor.is_some(),
            "Scanned page"
        );

        self.buffer.extend(page.items);
        match page.cursor {
            Some(cursor) => self.cursor = Some(cursor),
            None => self.exhausted = true,
        }
        Ok(())
    }

    /// Drain the remaining window.
    pub async fn collect(mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Expose the scan as a stream of items.
    pub fn into_stream(self) -> impl Stream<Item = Result<Item>> + 'a {
        futures::stream::try_unfold(self, |mut scan| async move {
            Ok(scan.next().await?.map(|item| (item, scan)))
        })
    }
}

/// Resolve an inclusive `[start, stop]` range of possibly negative indices
/// against a collection of `len` elements.
///
/// Returns `None` when the resolved range is empty.
pub fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if start < 0 { start.saturating_add(len) } else { start }.max(0);
    let stop = if stop < 0 { stop.saturating_add(len) } else { stop };

    if len == 0 || start > stop || start >= len {
        return None;
    }
    let stop = stop.min(len - 1);
    Some((start as usize, stop as usize))
}

/// Resolve a single possibly negative index. `None` when out of range.
pub fn normalize_index(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let index = if index < 0 { index.saturating_add(len) } else { index };
    (0..len).contains(&index).then_some(index as usize)
}
