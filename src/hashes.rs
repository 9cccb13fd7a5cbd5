//! Hashes.
//!
//! One item per field: the sort key is the field name and the payload its
//! value. Hash fields carry no score.

use std::collections::BTreeMap;

use crate::backend::{ReturnValues, WriteOp, MAX_TRANSACTION_ITEMS};
use crate::client::{validate_key, validate_member, Client};
use crate::error::{Error, Result};
use crate::expression::ExpressionBuilder;
use crate::item::{Attribute, Item, Key};
use crate::value::Value;

fn field_value(item: Item) -> Result<(String, Value)> {
    match item.value {
        Some(value) => Ok((item.key.sort, value)),
        None => Err(Error::Decode(format!("hash field {:?} has no value", item.key))),
    }
}

fn check_transaction(fields: usize) -> Result<()> {
    if fields > MAX_TRANSACTION_ITEMS {
        return Err(Error::InvalidArgument(format!(
            "{fields} fields exceed the limit of {MAX_TRANSACTION_ITEMS} per call"
        )));
    }
    Ok(())
}

impl Client {
    /// Set fields one at a time. Returns the fields that did not exist before.
    pub async fn hset<I, F, V>(&self, key: &str, fields: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<Value>,
    {
        validate_key(key)?;
        let mut created = Vec::new();
        for (field, value) in fields {
            let field = field.into();
            validate_member(&field)?;
            let item = Item::new(Key::new(key, field.as_str())).with_value(value.into());
            let old = self
                .backend()
                .put_item(item, &ExpressionBuilder::new(), ReturnValues::AllOld)
                .await?;
            if old.is_none() && !created.contains(&field) {
                created.push(field);
            }
        }
        Ok(created)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        validate_member(field)?;
        Ok(self.get(key, field).await?.and_then(|item| item.value))
    }

    /// Set all fields in a single transaction. At most 100 distinct fields;
    /// when a field repeats, the last value wins.
    pub async fn hmset<I, F, V>(&self, key: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<Value>,
    {
        validate_key(key)?;
        let fields: BTreeMap<String, Value> = fields
            .into_iter()
            .map(|(f, v)| (f.into(), v.into()))
            .collect();
        check_transaction(fields.len())?;
        if fields.is_empty() {
            return Ok(());
        }

        let ops = fields
            .into_iter()
            .map(|(field, value)| {
                validate_member(&field)?;
                Ok(WriteOp::Put {
                    item: Item::new(Key::new(key, field)).with_value(value),
                    expression: ExpressionBuilder::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.backend().transact_write(ops).await
    }

    /// Read fields as one consistent snapshot, in request order.
    pub async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<Value>>> {
        validate_key(key)?;
        let mut distinct: Vec<&str> = Vec::new();
        for field in fields {
            validate_member(field)?;
            if !distinct.contains(field) {
                distinct.push(*field);
            }
        }
        check_transaction(distinct.len())?;
        if distinct.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<Key> = distinct.iter().map(|f| Key::new(key, *f)).collect();
        let found: BTreeMap<&str, Option<Value>> = distinct
            .iter()
            .copied()
            .zip(
                self.backend()
                    .transact_get(&keys)
                    .await?
                    .into_iter()
                    .map(|item| item.and_then(|i| i.value)),
            )
            .collect();

        Ok(fields
            .iter()
            .map(|f| found.get(f).cloned().flatten())
            .collect())
    }

    /// Delete fields. Returns those that existed.
    pub async fn hdel<I, F>(&self, key: &str, fields: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        validate_key(key)?;
        let mut deleted = Vec::new();
        for field in fields {
            let field = field.into();
            validate_member(&field)?;
            let old = self
                .backend()
                .delete_item(
                    &Key::new(key, field.as_str()),
                    &ExpressionBuilder::new(),
                    ReturnValues::AllOld,
                )
                .await?;
            if old.is_some() {
                deleted.push(field);
            }
        }
        Ok(deleted)
    }

    pub async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        validate_key(key)?;
        validate_member(field)?;
        Ok(self.get(key, field).await?.is_some())
    }

    /// Every field and value.
    pub async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, Value>> {
        validate_key(key)?;
        self.scan(key)
            .collect(self.backend())
            .await?
            .into_iter()
            .map(field_value)
            .collect()
    }

    /// Every field name.
    pub async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
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

    /// Every value, in field order.
    pub async fn hvals(&self, key: &str) -> Result<Vec<Value>> {
        Ok(self.hgetall(key).await?.into_values().collect())
    }

    /// Number of fields.
    pub async fn hlen(&self, key: &str) -> Result<usize> {
        validate_key(key)?;
        self.scan(key).matches(self.backend()).await
    }

    /// Atomically add an integer to a field (absent fields start at 0).
    pub async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        match self.hincr(key, field, Value::Integer(delta)).await? {
            Value::Integer(after) => Ok(after),
            other => Err(Error::InvalidArgument(format!(
                "hash field {field} holds {other}, not an integer"
            ))),
        }
    }

    /// Atomically add a float to a field (absent fields start at 0).
    pub async fn hincrbyfloat(&self, key: &str, field: &str, delta: f64) -> Result<f64> {
        let after = self.hincr(key, field, Value::Float(delta)).await?;
        after.as_f64().ok_or_else(|| {
            Error::InvalidArgument(format!("hash field {field} holds {after}, not a number"))
        })
    }

    async fn hincr(&self, key: &str, field: &str, delta: Value) -> Result<Value> {
        validate_key(key)?;
        validate_member(field)?;
        let update = ExpressionBuilder::new().add(Attribute::Value, delta);
        self.backend()
            .update_item(&Key::new(key, field), &update, ReturnValues::AllNew)
            .await?
            .and_then(|item| item.value)
            .ok_or_else(|| Error::Decode(format!("increment of {key}/{field} returned no value")))
    }

    /// Set a field only if it does not exist. Returns whether it was set.
    pub async fn hsetnx(&self, key: &str, field: &str, value: impl Into<Value>) -> Result<bool> {
        validate_key(key)?;
        validate_member(field)?;
        let item = Item::new(Key::new(key, field)).with_value(value.into());
        let not_exists = ExpressionBuilder::new().not_exists(Attribute::PartitionKey);
        match self
            .backend()
            .put_item(item, &not_exists, ReturnValues::None)
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::ConditionFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
