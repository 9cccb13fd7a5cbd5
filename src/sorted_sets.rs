//! Sorted sets.
//!
//! One item per member: the sort key is the member name and the score is
//! the member's score, so score-ordered commands scan the score axis and lex
//! commands scan the sort-key axis. Ties on score are ordered by member.

use std::collections::HashMap;

use tracing::debug;

use crate::backend::ReturnValues;
use crate::client::{validate_key, validate_member, Client};
use crate::error::{Error, Result};
use crate::expression::{ExpressionBuilder, SortCondition};
use crate::item::{Attribute, Item, Key};
use crate::range::{self, RangeCap};
use crate::scan::{normalize_range, Scan};
use crate::value::Value;

/// Write preconditions for [`Client::zadd`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flags {
    /// Add new members and update existing ones.
    #[default]
    Always,
    /// Only add new members (`NX`).
    IfNotExists,
    /// Only update existing members (`XX`).
    IfAlreadyExists,
}

/// How scores of the same member from several sets are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            Aggregate::Sum => a + b,
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

/// A member with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }

    fn from_item(item: Item) -> Result<Self> {
        let score = item
            .score
            .ok_or_else(|| Error::Decode(format!("sorted set member {:?} has no score", item.key)))?;
        Ok(Self {
            member: item.key.sort,
            score,
        })
    }
}

fn scored(items: Vec<Item>) -> Result<Vec<ScoredMember>> {
    items.into_iter().map(ScoredMember::from_item).collect()
}

fn weight(weights: Option<&HashMap<String, f64>>, key: &str) -> f64 {
    weights.and_then(|w| w.get(key)).copied().unwrap_or(1.0)
}

/// Order by score, then member.
fn ordered(members: HashMap<String, f64>) -> Vec<ScoredMember> {
    let mut out: Vec<ScoredMember> = members
        .into_iter()
        .map(|(member, score)| ScoredMember { member, score })
        .collect();
    out.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.member.cmp(&b.member))
    });
    out
}

impl Client {
    /// Add or update members. Returns the members that did not exist before.
    ///
    /// Members rejected by `flags` are skipped silently.
    pub async fn zadd<I, M>(&self, key: &str, members: I, flags: Flags) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (M, f64)>,
        M: Into<String>,
    {
        validate_key(key)?;
        let mut added = Vec::new();

        for (member, score) in members {
            let member = member.into();
            validate_member(&member)?;

            let mut update = ExpressionBuilder::new().set(Attribute::Score, score);
            update = match flags {
                Flags::Always => update,
                Flags::IfNotExists => update.not_exists(Attribute::PartitionKey),
                Flags::IfAlreadyExists => update.exists(Attribute::PartitionKey),
            };

            match self
                .backend()
                .update_item(&Key::new(key, member.as_str()), &update, ReturnValues::AllOld)
                .await
            {
                Ok(None) => added.push(member),
                Ok(Some(_)) => {}
                Err(Error::ConditionFailed) => {
                    debug!(key = %key, member = %member, ?flags, "ZADD precondition not met");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Number of members.
    pub async fn zcard(&self, key: &str) -> Result<usize> {
        validate_key(key)?;
        self.scan(key).matches(self.backend()).await
    }

    /// Number of members with `min <= score <= max`.
    pub async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        validate_key(key)?;
        let (lower, upper) = (RangeCap::score(min), RangeCap::score(max));
        if range::is_empty(&lower, &upper) {
            return Ok(0);
        }
        self.scan(key)
            .by_score()
            .range(&lower, &upper)
            .matches(self.backend())
            .await
    }

    /// Number of members with `min <= member <= max`.
    pub async fn zlexcount(&self, key: &str, min: RangeCap, max: RangeCap) -> Result<usize> {
        validate_key(key)?;
        if range::is_empty(&min, &max) {
            return Ok(0);
        }
        self.scan(key)
            .range(&min, &max)
            .matches(self.backend())
            .await
    }

    /// Atomically add `delta` to a member's score (absent members start at
    /// 0). Returns the new score.
    pub async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64> {
        validate_key(key)?;
        validate_member(member)?;
        let update = ExpressionBuilder::new().add(Attribute::Score, delta);
        let item = self
            .backend()
            .update_item(&Key::new(key, member), &update, ReturnValues::AllNew)
            .await?;
        item.and_then(|i| i.score)
            .ok_or_else(|| Error::Decode(format!("ZINCRBY on {key}/{member} returned no score")))
    }

    pub async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        validate_key(key)?;
        validate_member(member)?;
        Ok(self.get(key, member).await?.and_then(|i| i.score))
    }

    /// Remove members. Returns those that existed.
    pub async fn zrem<I, M>(&self, key: &str, members: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        validate_key(key)?;
        let mut removed = Vec::new();
        for member in members {
            let member = member.into();
            validate_member(&member)?;
            let old = self
                .backend()
                .delete_item(
                    &Key::new(key, member.as_str()),
                    &ExpressionBuilder::new(),
                    ReturnValues::AllOld,
                )
                .await?;
            if old.is_some() {
                removed.push(member);
            }
        }
        Ok(removed)
    }

    /// Members ranked `start..=stop` by ascending score.
    pub async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<ScoredMember>> {
        self.zrange_by_rank(key, start, stop, true).await
    }

    /// Members ranked `start..=stop` by descending score.
    pub async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<ScoredMember>> {
        self.zrange_by_rank(key, start, stop, false).await
    }

    async fn zrange_by_rank(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        forward: bool,
    ) -> Result<Vec<ScoredMember>> {
        validate_key(key)?;
        let len = self.zcard(key).await?;
        let Some((start, stop)) = normalize_range(len, start, stop) else {
            return Ok(Vec::new());
        };
        let items = self
            .scan(key)
            .by_score()
            .keys_only()
            .forward(forward)
            .offset(start)
            .count(stop - start + 1)
            .collect(self.backend())
            .await?;
        scored(items)
    }

    /// Members with `min <= score <= max`, ascending, windowed by
    /// `offset`/`count` (0 for all).
    pub async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ScoredMember>> {
        let scan = self.scan(key).by_score();
        self.zrange_by_caps(key, scan, RangeCap::score(min), RangeCap::score(max), offset, count)
            .await
    }

    /// Members with `min <= score <= max`, descending.
    pub async fn zrevrangebyscore(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ScoredMember>> {
        let scan = self.scan(key).by_score().reverse();
        self.zrange_by_caps(key, scan, RangeCap::score(min), RangeCap::score(max), offset, count)
            .await
    }

    /// Members with `min <= member <= max`, in member order.
    pub async fn zrangebylex(
        &self,
        key: &str,
        min: RangeCap,
        max: RangeCap,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ScoredMember>> {
        let scan = self.scan(key);
        self.zrange_by_caps(key, scan, min, max, offset, count).await
    }

    /// Members with `min <= member <= max`, in reverse member order.
    pub async fn zrevrangebylex(
        &self,
        key: &str,
        max: RangeCap,
        min: RangeCap,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ScoredMember>> {
        let scan = self.scan(key).reverse();
        self.zrange_by_caps(key, scan, min, max, offset, count).await
    }

    async fn zrange_by_caps(
        &self,
        key: &str,
        scan: Scan,
        lower: RangeCap,
        upper: RangeCap,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ScoredMember>> {
        validate_key(key)?;
        if range::is_empty(&lower, &upper) {
            return Ok(Vec::new());
        }
        let items = scan
            .range(&lower, &upper)
            .keys_only()
            .offset(offset)
            .count(count)
            .collect(self.backend())
            .await?;
        scored(items)
    }

    /// Rank of `member` by ascending score, or `None` if absent.
    pub async fn zrank(&self, key: &str, member: &str) -> Result<Option<usize>> {
        self.rank(key, member, true).await
    }

    /// Rank of `member` by descending score, or `None` if absent.
    pub async fn zrevrank(&self, key: &str, member: &str) -> Result<Option<usize>> {
        self.rank(key, member, false).await
    }

    /// Rank = members strictly ahead on score plus members tied on score
    /// but ahead by name.
    async fn rank(&self, key: &str, member: &str, forward: bool) -> Result<Option<usize>> {
        let Some(score) = self.zscore(key, member).await? else {
            return Ok(None);
        };

        let ahead = if forward {
            SortCondition::LessThan(Value::Float(score))
        } else {
            SortCondition::GreaterThan(Value::Float(score))
        };
        let strictly_ahead = self
            .scan(key)
            .by_score()
            .condition(ahead)
            .matches(self.backend())
            .await?;

        let tied = self
            .scan(key)
            .by_score()
            .keys_only()
            .condition(SortCondition::Equals(Value::Float(score)))
            .collect(self.backend())
            .await?;
        let tied_ahead = tied
            .iter()
            .filter(|item| {
                if forward {
                    item.sort_key() < member
                } else {
                    item.sort_key() > member
                }
            })
            .count();

        Ok(Some(strictly_ahead + tied_ahead))
    }

    /// Remove and return up to `count` members with the lowest scores.
    pub async fn zpopmin(&self, key: &str, count: usize) -> Result<Vec<ScoredMember>> {
        self.zpop(key, count, true).await
    }

    /// Remove and return up to `count` members with the highest scores.
    pub async fn zpopmax(&self, key: &str, count: usize) -> Result<Vec<ScoredMember>> {
        self.zpop(key, count, false).await
    }

    async fn zpop(&self, key: &str, count: usize, forward: bool) -> Result<Vec<ScoredMember>> {
        validate_key(key)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let candidates = self
            .scan(key)
            .by_score()
            .keys_only()
            .forward(forward)
            .count(count)
            .collect(self.backend())
            .await?;

        let exists = ExpressionBuilder::new().exists(Attribute::PartitionKey);
        let mut popped = Vec::with_capacity(candidates.len());
        for item in candidates {
            match self
                .backend()
                .delete_item(&item.key, &exists, ReturnValues::None)
                .await
            {
                Ok(_) => popped.push(ScoredMember::from_item(item)?),
                Err(Error::ConditionFailed) => {}
                Err(e) => return Err(e.after(popped.len())),
            }
        }
        Ok(popped)
    }

    /// Remove members ranked `start..=stop`. Returns the removed members.
    pub async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let doomed = self.zrange(key, start, stop).await?;
        self.zremove_all(key, doomed).await
    }

    /// Remove members with `min <= score <= max`.
    pub async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let doomed = self.zrangebyscore(key, min, max, 0, 0).await?;
        self.zremove_all(key, doomed).await
    }

    /// Remove members with `min <= member <= max`.
    pub async fn zremrangebylex(&self, key: &str, min: RangeCap, max: RangeCap) -> Result<Vec<String>> {
        let doomed = self.zrangebylex(key, min, max, 0, 0).await?;
        self.zremove_all(key, doomed).await
    }

    async fn zremove_all(&self, key: &str, doomed: Vec<ScoredMember>) -> Result<Vec<String>> {
        let mut removed = Vec::with_capacity(doomed.len());
        for ScoredMember { member, .. } in doomed {
            let old = self
                .backend()
                .delete_item(
                    &Key::new(key, member.as_str()),
                    &ExpressionBuilder::new(),
                    ReturnValues::AllOld,
                )
                .await
                .map_err(|e| e.after(removed.len()))?;
            if old.is_some() {
                removed.push(member);
            }
        }
        Ok(removed)
    }

    /// Every member of `key` with its score.
    async fn zmembers(&self, key: &str) -> Result<Vec<ScoredMember>> {
        validate_key(key)?;
        let items = self
            .scan(key)
            .by_score()
            .keys_only()
            .collect(self.backend())
            .await?;
        scored(items)
    }

    /// Union of the sets, scores multiplied by each source's weight
    /// (default 1) and combined with `aggregate`.
    pub async fn zunion(
        &self,
        keys: &[&str],
        aggregate: Aggregate,
        weights: Option<&HashMap<String, f64>>,
    ) -> Result<Vec<ScoredMember>> {
        self.zunion_with(keys, weights, |a, b| aggregate.combine(a, b))
            .await
    }

    /// [`zunion`](Self::zunion) with an arbitrary combining function.
    pub async fn zunion_with<F>(
        &self,
        keys: &[&str],
        weights: Option<&HashMap<String, f64>>,
        combine: F,
    ) -> Result<Vec<ScoredMember>>
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut acc: HashMap<String, f64> = HashMap::new();
        for key in keys {
            let w = weight(weights, key);
            for ScoredMember { member, score } in self.zmembers(key).await? {
                let score = score * w;
                acc.entry(member)
                    .and_modify(|existing| *existing = combine(*existing, score))
                    .or_insert(score);
            }
        }
        Ok(ordered(acc))
    }

    /// Intersection of the sets, scores weighted and combined as for
    /// [`zunion`](Self::zunion).
    pub async fn zinter(
        &self,
        keys: &[&str],
        aggregate: Aggregate,
        weights: Option<&HashMap<String, f64>>,
    ) -> Result<Vec<ScoredMember>> {
        self.zinter_with(keys, weights, |a, b| aggregate.combine(a, b))
            .await
    }

    /// [`zinter`](Self::zinter) with an arbitrary combining function.
    pub async fn zinter_with<F>(
        &self,
        keys: &[&str],
        weights: Option<&HashMap<String, f64>>,
        combine: F,
    ) -> Result<Vec<ScoredMember>>
    where
        F: Fn(f64, f64) -> f64,
    {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };

        let w = weight(weights, first);
        let mut acc: HashMap<String, f64> = self
            .zmembers(first)
            .await?
            .into_iter()
            .map(|m| (m.member, m.score * w))
            .collect();

        for key in rest {
            if acc.is_empty() {
                break;
            }
            let w = weight(weights, key);
            let current: HashMap<String, f64> = self
                .zmembers(key)
                .await?
                .into_iter()
                .map(|m| (m.member, m.score))
                .collect();
            acc.retain(|member, existing| match current.get(member) {
                Some(score) => {
                    *existing = combine(*existing, score * w);
                    true
                }
                None => false,
            });
        }
        Ok(ordered(acc))
    }

    /// `ZUNION` written into `destination` through `ZADD`. Returns the
    /// stored members.
    ///
    /// Not atomic: members are added one at a time.
    pub async fn zunionstore(
        &self,
        destination: &str,
        keys: &[&str],
        aggregate: Aggregate,
        weights: Option<&HashMap<String, f64>>,
    ) -> Result<Vec<ScoredMember>> {
        validate_key(destination)?;
        let result = self.zunion(keys, aggregate, weights).await?;
        self.zstore(destination, result).await
    }

    /// `ZINTER` written into `destination` through `ZADD`.
    ///
    /// Not atomic: members are added one at a time.
    pub async fn zinterstore(
        &self,
        destination: &str,
        keys: &[&str],
        aggregate: Aggregate,
        weights: Option<&HashMap<String, f64>>,
    ) -> Result<Vec<ScoredMember>> {
        validate_key(destination)?;
        let result = self.zinter(keys, aggregate, weights).await?;
        self.zstore(destination, result).await
    }

    async fn zstore(&self, destination: &str, members: Vec<ScoredMember>) -> Result<Vec<ScoredMember>> {
        for (written, m) in members.iter().enumerate() {
            self.zadd(destination, [(m.member.as_str(), m.score)], Flags::Always)
                .await
                .map_err(|e| e.after(written))?;
        }
        Ok(members)
    }
}
