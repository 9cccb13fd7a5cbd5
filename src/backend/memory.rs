//! In-memory backend.
//!
//! Holds items in ordered maps behind a tokio `RwLock`. The score axis is
//! sparse: only items carrying a score are visible to score queries. Pages
//! are cut at a configurable size so callers exercise cursor-following.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    Axis, Backend, Cursor, Query, QueryPage, ReturnValues, Select, WriteOp,
    MAX_TRANSACTION_ITEMS,
};
use crate::error::{Error, Result};
use crate::expression::ExpressionBuilder;
use crate::item::{Item, Key};
use crate::value::Value;

/// Default page size, roughly what fits in one DynamoDB response for small items.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type Partition = BTreeMap<String, Item>;

/// In-memory [`Backend`].
pub struct MemoryBackend {
    partitions: RwLock<BTreeMap<String, Partition>>,
    page_size: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Cut query pages after `page_size` matches (minimum 1).
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Total number of stored items, bookkeeping included.
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(|p| p.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn lookup<'a>(partitions: &'a BTreeMap<String, Partition>, key: &Key) -> Option<&'a Item> {
    partitions.get(&key.partition)?.get(&key.sort)
}

fn store(partitions: &mut BTreeMap<String, Partition>, item: Item) {
    partitions
        .entry(item.key.partition.clone())
        .or_default()
        .insert(item.key.sort.clone(), item);
}

fn remove(partitions: &mut BTreeMap<String, Partition>, key: &Key) -> Option<Item> {
    let partition = partitions.get_mut(&key.partition)?;
    let removed = partition.remove(&key.sort);
    if partition.is_empty() {
        partitions.remove(&key.partition);
    }
    removed
}

fn validate_key(key: &Key) -> Result<()> {
    if key.partition.is_empty() || key.sort.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "key attributes must not be empty: {key:?}"
        )));
    }
    Ok(())
}

fn validate_item(item: &Item) -> Result<()> {
    validate_key(&item.key)?;
    if let Some(score) = item.score {
        if !score.is_finite() {
            return Err(Error::UnsupportedValue(format!("non-finite score {score}")));
        }
    }
    if let Some(Value::Float(f)) = &item.value {
        if !f.is_finite() {
            return Err(Error::UnsupportedValue(format!("non-finite number {f}")));
        }
    }
    Ok(())
}

/// Store numbers the way they read back over the wire.
fn normalized(mut item: Item) -> Item {
    item.value = item.value.map(Value::normalized);
    item
}

fn pick(returns: ReturnValues, old: Option<Item>, new: Option<&Item>) -> Option<Item> {
    match returns {
        ReturnValues::None => None,
        ReturnValues::AllOld => old,
        ReturnValues::AllNew => new.cloned(),
    }
}

/// Compute the post-update state of an item without touching the store.
fn updated(current: Option<&Item>, key: &Key, expression: &ExpressionBuilder) -> Result<Item> {
    let mut next = current.cloned().unwrap_or_else(|| Item::new(key.clone()));
    for action in expression.updates() {
        action.apply(&mut next)?;
    }
    validate_item(&next)?;
    Ok(normalized(next))
}

fn position_cmp(axis: Axis, a: (Option<f64>, &str), b: (Option<f64>, &str)) -> Ordering {
    match axis {
        Axis::SortKey => a.1.cmp(b.1),
        Axis::Score => a
            .0
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&b.0.unwrap_or(f64::NEG_INFINITY))
            .then_with(|| a.1.cmp(b.1)),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_item(&self, key: &Key, _consistent: bool) -> Result<Option<Item>> {
        validate_key(key)?;
        Ok(lookup(&*self.partitions.read().await, key).cloned())
    }

    async fn put_item(
        &self,
        item: Item,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>> {
        validate_item(&item)?;
        let item = normalized(item);
        if !expression.updates().is_empty() {
            return Err(Error::InvalidArgument(
                "put requests carry no update actions".into(),
            ));
        }

        let mut partitions = self.partitions.write().await;
        let old = lookup(&partitions, &item.key).cloned();
        if !expression.check(old.as_ref()) {
            return Err(Error::ConditionFailed);
        }
        let result = pick(returns, old, Some(&item));
        store(&mut partitions, item);
        Ok(result)
    }

    async fn update_item(
        &self,
        key: &Key,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>> {
        validate_key(key)?;
        let mut partitions = self.partitions.write().await;
        let old = lookup(&partitions, key).cloned();
        if !expression.check(old.as_ref()) {
            return Err(Error::ConditionFailed);
        }
        let next = updated(old.as_ref(), key, expression)?;
        let result = pick(returns, old, Some(&next));
        store(&mut partitions, next);
        Ok(result)
    }

    async fn delete_item(
        &self,
        key: &Key,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>> {
        validate_key(key)?;
        let mut partitions = self.partitions.write().await;
        if !expression.check(lookup(&partitions, key)) {
            return Err(Error::ConditionFailed);
        }
        let old = remove(&mut partitions, key);
        Ok(pick(returns, old, None))
    }

    async fn query(&self, query: &Query) -> Result<QueryPage> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(&query.partition) else {
            return Ok(QueryPage::default());
        };

        let mut candidates: Vec<&Item> = match query.axis {
            Axis::SortKey => partition.values().collect(),
            Axis::Score => {
                let mut scored: Vec<&Item> =
                    partition.values().filter(|i| i.score.is_some()).collect();
                scored.sort_by(|a, b| {
                    position_cmp(
                        Axis::Score,
                        (a.score, a.sort_key()),
                        (b.score, b.sort_key()),
                    )
                });
                scored
            }
        };
        if !query.forward {
            candidates.reverse();
        }

        let after_cursor = |item: &Item| match &query.cursor {
            None => true,
            Some(cursor) => {
                let ord = position_cmp(
                    query.axis,
                    (item.score, item.sort_key()),
                    (cursor.score, cursor.key.sort.as_str()),
                );
                if query.forward {
                    ord == Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            }
        };
        let in_range = |item: &Item| match &query.condition {
            None => true,
            Some(condition) => {
                let axis_value = match query.axis {
                    Axis::SortKey => Value::String(item.key.sort.clone()),
                    Axis::Score => Value::Float(item.score.unwrap_or(f64::NAN)),
                };
                condition.matches(&axis_value)
            }
        };

        let budget = query
            .limit
            .map_or(self.page_size, |limit| limit.max(1).min(self.page_size));
        let mut matches = candidates
            .into_iter()
            .filter(|item| after_cursor(*item) && in_range(*item));

        let page: Vec<&Item> = matches.by_ref().take(budget).collect();
        let more = matches.next().is_some();
        let cursor = match page.last() {
            Some(last) if more => Some(Cursor {
                key: last.key.clone(),
                score: last.score,
            }),
            _ => None,
        };

        let count = page.len();
        let items = match query.select {
            Select::Items => page.into_iter().cloned().collect(),
            Select::Keys => page
                .into_iter()
                .map(|i| Item {
                    key: i.key.clone(),
                    score: i.score,
                    value: None,
                })
                .collect(),
            Select::Count => Vec::new(),
        };

        Ok(QueryPage {
            items,
            count,
            cursor,
        })
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.len() > MAX_TRANSACTION_ITEMS {
            return Err(Error::InvalidArgument(format!(
                "transaction of {} items exceeds the limit of {MAX_TRANSACTION_ITEMS}",
                ops.len()
            )));
        }
        let mut seen = HashSet::new();
        for op in &ops {
            validate_key(op.key())?;
            if !seen.insert(op.key().clone()) {
                return Err(Error::InvalidArgument(format!(
                    "transaction touches {:?} more than once",
                    op.key()
                )));
            }
        }

        let mut partitions = self.partitions.write().await;

        // Evaluate every op against the pre-transaction state first.
        enum Effect {
            Store(Item),
            Remove(Key),
            Nothing,
        }
        let mut effects = Vec::with_capacity(ops.len());
        for op in ops {
            let current = lookup(&partitions, op.key());
            let effect = match op {
                WriteOp::Put { item, expression } => {
                    validate_item(&item)?;
                    if !expression.check(current) {
                        return Err(Error::ConditionFailed);
                    }
                    Effect::Store(normalized(item))
                }
                WriteOp::Update { key, expression } => {
                    if !expression.check(current) {
                        return Err(Error::ConditionFailed);
                    }
                    Effect::Store(updated(current, &key, &expression)?)
                }
                WriteOp::Delete { key, expression } => {
                    if !expression.check(current) {
                        return Err(Error::ConditionFailed);
                    }
                    Effect::Remove(key)
                }
                WriteOp::ConditionCheck { expression, .. } => {
                    if !expression.check(current) {
                        return Err(Error::ConditionFailed);
                    }
                    Effect::Nothing
                }
            };
            effects.push(effect);
        }

        for effect in effects {
            match effect {
                Effect::Store(item) => store(&mut partitions, item),
                Effect::Remove(key) => {
                    remove(&mut partitions, &key);
                }
                Effect::Nothing => {}
            }
        }
        Ok(())
    }

    async fn transact_get(&self, keys: &[Key]) -> Result<Vec<Option<Item>>> {
        if keys.len() > MAX_TRANSACTION_ITEMS {
            return Err(Error::InvalidArgument(format!(
                "transaction of {} items exceeds the limit of {MAX_TRANSACTION_ITEMS}",
                keys.len()
            )));
        }
        for key in keys {
            validate_key(key)?;
        }
        let partitions = self.partitions.read().await;
        Ok(keys.iter().map(|k| lookup(&partitions, k).cloned()).collect())
    }
}
