//! Lists.
//!
//! Each element is one item in the list's partition: its score is the index
//! handed out by the [`IndexAllocator`](crate::allocator::IndexAllocator)
//! and its sort key the composite `(value, index)` encoding of
//! [`list_key`]. Elements are never updated in place. Positions are ranks in
//! score order, resolved against the current length for every call.

use tracing::{debug, warn};

use crate::allocator::Side;
use crate::backend::ReturnValues;
use crate::client::{validate_key, Client};
use crate::error::{Error, Result};
use crate::expression::{ExpressionBuilder, SortCondition};
use crate::item::{list_key, Attribute, Item, Key};
use crate::scan::{normalize_index, normalize_range};
use crate::value::Value;

/// Pops give up after losing this many races for the list end.
const MAX_POP_ATTEMPTS: usize = 5;

impl Client {
    /// Prepend values one at a time, so the last value ends up first.
    /// Returns the new length.
    pub async fn lpush<I>(&self, key: &str, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.push(key, Side::Left, values.into_iter().map(Into::into).collect())
            .await
    }

    /// Append values. Returns the new length.
    pub async fn rpush<I>(&self, key: &str, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.push(key, Side::Right, values.into_iter().map(Into::into).collect())
            .await
    }

    /// `LPUSH` only if the list already exists. Returns the length, 0 if absent.
    pub async fn lpushx<I>(&self, key: &str, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        validate_key(key)?;
        if !self.key_exists(key).await? {
            return Ok(0);
        }
        self.lpush(key, values).await
    }

    /// `RPUSH` only if the list already exists. Returns the length, 0 if absent.
    pub async fn rpushx<I>(&self, key: &str, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        validate_key(key)?;
        if !self.key_exists(key).await? {
            return Ok(0);
        }
        self.rpush(key, values).await
    }

    async fn push(&self, key: &str, side: Side, values: Vec<Value>) -> Result<usize> {
        validate_key(key)?;
        let allocator = self.allocator();

        let mut pushed = 0;
        for value in values {
            let index = allocator
                .allocate(key, side)
                .await
                .map_err(|e| e.after(pushed))?;
            match self.put_element(key, &value, index).await {
                Ok(()) => pushed += 1,
                Err(Error::ConditionFailed) => {
                    warn!(key = %key, index, "List element already present, push skipped");
                }
                Err(e) => return Err(e.after(pushed)),
            }
        }

        debug!(key = %key, ?side, pushed, "Pushed list elements");
        self.llen(key).await.map_err(|e| e.after(pushed))
    }

    async fn put_element(&self, key: &str, value: &Value, index: i64) -> Result<()> {
        let item = Item::new(Key::new(key, list_key::encode(value, index))).with_score(index as f64);
        let not_exists = ExpressionBuilder::new().not_exists(Attribute::PartitionKey);
        self.backend()
            .put_item(item, &not_exists, ReturnValues::None)
            .await?;
        Ok(())
    }

    /// Remove and return the first element.
    pub async fn lpop(&self, key: &str) -> Result<Option<Value>> {
        self.pop(key, Side::Left).await
    }

    /// Remove and return the last element.
    pub async fn rpop(&self, key: &str) -> Result<Option<Value>> {
        self.pop(key, Side::Right).await
    }

    async fn pop(&self, key: &str, side: Side) -> Result<Option<Value>> {
        validate_key(key)?;
        let exists = ExpressionBuilder::new().exists(Attribute::PartitionKey);

        // Each attempt is a fresh read of the list end and a conditional delete.
        for attempt in 1..=MAX_POP_ATTEMPTS {
            let end = self
                .scan(key)
                .by_score()
                .keys_only()
                .forward(side == Side::Left)
                .count(1)
                .run(self.backend())
                .next()
                .await?;
            let Some(end) = end else {
                return Ok(None);
            };

            match self
                .backend()
                .delete_item(&end.key, &exists, ReturnValues::None)
                .await
            {
                Ok(_) => {
                    let (value, _) = list_key::decode(end.sort_key())?;
                    return Ok(Some(value));
                }
                // Someone else popped it first; take the next one.
                Err(Error::ConditionFailed) => {
                    debug!(key = %key, attempt, "List end removed concurrently, retrying pop");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(key = %key, attempts = MAX_POP_ATTEMPTS, "Pop kept losing the list end");
        Err(Error::TransactionConflict(format!(
            "list {key} end removed concurrently {MAX_POP_ATTEMPTS} times"
        )))
    }

    /// Number of elements.
    pub async fn llen(&self, key: &str) -> Result<usize> {
        validate_key(key)?;
        self.scan(key).matches(self.backend()).await
    }

    /// Elements between `start` and `stop` inclusive. Negative indices count
    /// from the end.
    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Value>> {
        validate_key(key)?;
        let len = self.llen(key).await?;
        let Some((start, stop)) = normalize_range(len, start, stop) else {
            return Ok(Vec::new());
        };

        self.scan(key)
            .by_score()
            .keys_only()
            .offset(start)
            .count(stop - start + 1)
            .collect(self.backend())
            .await?
            .iter()
            .map(|item| list_key::decode(item.sort_key()).map(|(value, _)| value))
            .collect()
    }

    /// Element at `index`, negative counting from the end.
    pub async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>> {
        Ok(self
            .element_at(key, index)
            .await?
            .map(|(value, _)| value))
    }

    /// Locate the element at `index`: its value and item.
    async fn element_at(&self, key: &str, index: i64) -> Result<Option<(Value, Item)>> {
        validate_key(key)?;
        let len = self.llen(key).await?;
        let Some(offset) = normalize_index(len, index) else {
            return Ok(None);
        };

        let item = self
            .scan(key)
            .by_score()
            .keys_only()
            .offset(offset)
            .count(1)
            .run(self.backend())
            .next()
            .await?;
        match item {
            Some(item) => {
                let (value, _) = list_key::decode(item.sort_key())?;
                Ok(Some((value, item)))
            }
            None => Ok(None),
        }
    }

    /// Replace the element at `index`. Returns `false` if the index is out
    /// of range.
    ///
    /// Not atomic: the old element is deleted, then the new one written at
    /// the same index.
    pub async fn lset(&self, key: &str, index: i64, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        let Some((old_value, old)) = self.element_at(key, index).await? else {
            return Ok(false);
        };
        let (_, position) = list_key::decode(old.sort_key())?;

        let exists = ExpressionBuilder::new().exists(Attribute::PartitionKey);
        match self
            .backend()
            .delete_item(&old.key, &exists, ReturnValues::None)
            .await
        {
            Ok(_) => {}
            Err(Error::ConditionFailed) => return Ok(false),
            Err(e) => return Err(e),
        }

        self.put_element(key, &value, position).await.map_err(|e| {
            warn!(key = %key, index, error = %e, "LSET removed the old element but failed to write the new one");
            e.stranding(1, old_value)
        })?;
        Ok(true)
    }

    /// Remove elements equal to `value`: the first `count` from the head if
    /// `count > 0`, the last `-count` from the tail if `count < 0`, all if 0.
    ///
    /// Returns the new length and whether anything matched.
    pub async fn lrem(
        &self,
        key: &str,
        count: i64,
        value: impl Into<Value>,
    ) -> Result<(usize, bool)> {
        validate_key(key)?;
        let value = value.into();

        let mut matches = self
            .scan(key)
            .keys_only()
            .condition(SortCondition::BeginsWith(list_key::value_prefix(&value)))
            .collect(self.backend())
            .await?
            .into_iter()
            .map(|item| list_key::decode(item.sort_key()).map(|(_, index)| (index, item)))
            .collect::<Result<Vec<_>>>()?;
        if matches.is_empty() {
            return Ok((self.llen(key).await?, false));
        }

        matches.sort_by_key(|(index, _)| *index);
        if count < 0 {
            matches.reverse();
        }
        let limit = match count.unsigned_abs() {
            0 => matches.len(),
            n => usize::try_from(n).unwrap_or(usize::MAX).min(matches.len()),
        };

        let mut removed = 0;
        for (_, item) in matches.into_iter().take(limit) {
            self.backend()
                .delete_item(&item.key, &ExpressionBuilder::new(), ReturnValues::None)
                .await
                .map_err(|e| e.after(removed))?;
            removed += 1;
        }

        debug!(key = %key, removed, "Removed list elements");
        let len = self.llen(key).await.map_err(|e| e.after(removed))?;
        Ok((len, true))
    }

    /// Keep only the elements between `start` and `stop` inclusive. An
    /// empty range empties the list. Returns the new length.
    ///
    /// Not atomic: elements are deleted one at a time.
    pub async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<usize> {
        validate_key(key)?;
        let len = self.llen(key).await?;

        let doomed = match normalize_range(len, start, stop) {
            None => self.scan(key).keys_only().collect(self.backend()).await?,
            Some((start, stop)) => {
                let mut doomed = Vec::new();
                if start > 0 {
                    doomed.extend(
                        self.scan(key)
                            .by_score()
                            .keys_only()
                            .count(start)
                            .collect(self.backend())
                            .await?,
                    );
                }
                let tail = len - 1 - stop;
                if tail > 0 {
                    doomed.extend(
                        self.scan(key)
                            .by_score()
                            .keys_only()
                            .reverse()
                            .count(tail)
                            .collect(self.backend())
                            .await?,
                    );
                }
                doomed
            }
        };

        let mut deleted = 0;
        for item in &doomed {
            self.backend()
                .delete_item(&item.key, &ExpressionBuilder::new(), ReturnValues::None)
                .await
                .map_err(|e| {
                    warn!(key = %key, deleted, error = %e, "LTRIM stopped part way");
                    e.after(deleted)
                })?;
            deleted += 1;
        }

        debug!(key = %key, deleted, "Trimmed list");
        self.llen(key).await.map_err(|e| e.after(deleted))
    }

    /// Pop from the tail of `source` and push onto the head of
    /// `destination`. `source` and `destination` may be the same list.
    ///
    /// Not atomic: if the push fails the element has already left `source`
    /// and is returned in the error's [`pending`](Error::pending) value.
    pub async fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<Value>> {
        validate_key(destination)?;
        let Some(value) = self.rpop(source).await? else {
            return Ok(None);
        };

        match self.lpush(destination, [value.clone()]).await {
            Ok(_) => Ok(Some(value)),
            Err(e) => {
                warn!(source = %source, destination = %destination, error = %e, "RPOPLPUSH lost the popped element");
                Err(e.stranding(1, value))
            }
        }
    }
}
