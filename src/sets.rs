//! Unordered sets.
//!
//! One item per member with the member as sort key. Each member also gets a
//! random score when added; the score carries no meaning except as a pivot
//! for picking random members off the score axis.

use std::collections::BTreeSet;

use rand::Rng;
use tracing::debug;

use crate::backend::{ReturnValues, WriteOp};
use crate::client::{validate_key, validate_member, Client};
use crate::error::{Error, Result};
use crate::expression::{ExpressionBuilder, SortCondition};
use crate::item::{Attribute, Item, Key};
use crate::value::Value;

/// Scores are drawn from `[0, 2^53)`, the range of exactly representable
/// integers in an `f64`.
const SCORE_SPAN: u64 = 1 << 53;

fn random_score() -> f64 {
    rand::rng().random_range(0..SCORE_SPAN) as f64
}

fn member_item(key: &str, member: &str) -> Item {
    Item::new(Key::new(key, member)).with_score(random_score())
}

impl Client {
    /// Add members. Returns the members that were not already present.
    pub async fn sadd<I, M>(&self, key: &str, members: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        validate_key(key)?;
        let mut added = Vec::new();
        for member in members {
            let member = member.into();
            validate_member(&member)?;
            let old = self
                .backend()
                .put_item(
                    member_item(key, &member),
                    &ExpressionBuilder::new(),
                    ReturnValues::AllOld,
                )
                .await?;
            if old.is_none() && !added.contains(&member) {
                added.push(member);
            }
        }
        Ok(added)
    }

    /// Remove members. Returns those that were present.
    pub async fn srem<I, M>(&self, key: &str, members: I) -> Result<Vec<String>>
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

    /// Every member, in member order.
    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        validate_key(key)?;
        Ok(self
            .scan(key)
            .keys_only()
            .collect(self.backend())
            .await?
            .into_iter()
            .map(|item| item.key.sort)
            .collect())
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        validate_key(key)?;
        validate_member(member)?;
        Ok(self.get(key, member).await?.is_some())
    }

    /// Number of members.
    pub async fn scard(&self, key: &str) -> Result<usize> {
        validate_key(key)?;
        self.scan(key).matches(self.backend()).await
    }

    /// Atomically move `member` from `source` to `destination`. Returns
    /// `false` if it was not in `source`.
    pub async fn smove(&self, source: &str, destination: &str, member: &str) -> Result<bool> {
        validate_key(source)?;
        validate_key(destination)?;
        validate_member(member)?;
        if source == destination {
            return self.sismember(source, member).await;
        }

        let ops = vec![
            WriteOp::Delete {
                key: Key::new(source, member),
                expression: ExpressionBuilder::new().exists(Attribute::PartitionKey),
            },
            WriteOp::Put {
                item: member_item(destination, member),
                expression: ExpressionBuilder::new(),
            },
        ];
        match self.backend().transact_write(ops).await {
            Ok(()) => Ok(true),
            Err(Error::ConditionFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Up to `count` distinct random members.
    ///
    /// Scans the score axis upward from a random pivot, wrapping around to
    /// the start once if the top is reached first.
    pub async fn srandmember(&self, key: &str, count: usize) -> Result<Vec<String>> {
        validate_key(key)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let pivot = Value::Float(random_score());

        let mut picked: Vec<String> = self
            .scan(key)
            .by_score()
            .keys_only()
            .condition(SortCondition::AtLeast(pivot.clone()))
            .count(count)
            .collect(self.backend())
            .await?
            .into_iter()
            .map(|item| item.key.sort)
            .collect();

        if picked.len() < count {
            let wrapped = self
                .scan(key)
                .by_score()
                .keys_only()
                .condition(SortCondition::LessThan(pivot))
                .count(count - picked.len())
                .collect(self.backend())
                .await?;
            picked.extend(wrapped.into_iter().map(|item| item.key.sort));
        }
        Ok(picked)
    }

    /// Remove and return up to `count` random members.
    pub async fn spop(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let picked = self.srandmember(key, count).await?;
        let popped = self.srem(key, picked).await?;
        debug!(key = %key, popped = popped.len(), "Popped set members");
        Ok(popped)
    }

    async fn member_set(&self, key: &str) -> Result<BTreeSet<String>> {
        Ok(self.smembers(key).await?.into_iter().collect())
    }

    /// Members present in any of `keys`.
    pub async fn sunion(&self, keys: &[&str]) -> Result<Vec<String>> {
        let mut union = BTreeSet::new();
        for key in keys {
            union.extend(self.member_set(key).await?);
        }
        Ok(union.into_iter().collect())
    }

    /// Members present in every one of `keys`.
    pub async fn sinter(&self, keys: &[&str]) -> Result<Vec<String>> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut inter = self.member_set(first).await?;
        for key in rest {
            if inter.is_empty() {
                break;
            }
            let other = self.member_set(key).await?;
            inter.retain(|m| other.contains(m));
        }
        Ok(inter.into_iter().collect())
    }

    /// Members of `key` absent from every one of `subtract`.
    pub async fn sdiff(&self, key: &str, subtract: &[&str]) -> Result<Vec<String>> {
        let mut diff = self.member_set(key).await?;
        for other in subtract {
            if diff.is_empty() {
                break;
            }
            let other = self.member_set(other).await?;
            diff.retain(|m| !other.contains(m));
        }
        Ok(diff.into_iter().collect())
    }

    /// `SUNION` written into `destination`. Returns the result size.
    ///
    /// Not atomic: members are added one at a time.
    pub async fn sunionstore(&self, destination: &str, keys: &[&str]) -> Result<usize> {
        validate_key(destination)?;
        let members = self.sunion(keys).await?;
        self.sstore(destination, members).await
    }

    /// `SINTER` written into `destination`. Returns the result size.
    pub async fn sinterstore(&self, destination: &str, keys: &[&str]) -> Result<usize> {
        validate_key(destination)?;
        let members = self.sinter(keys).await?;
        self.sstore(destination, members).await
    }

    /// `SDIFF` written into `destination`. Returns the result size.
    pub async fn sdiffstore(&self, destination: &str, key: &str, subtract: &[&str]) -> Result<usize> {
        validate_key(destination)?;
        let members = self.sdiff(key, subtract).await?;
        self.sstore(destination, members).await
    }

    async fn sstore(&self, destination: &str, members: Vec<String>) -> Result<usize> {
        let total = members.len();
        for (written, member) in members.into_iter().enumerate() {
            self.sadd(destination, [member])
                .await
                .map_err(|e| e.after(written))?;
        }
        Ok(total)
    }
}
