//! Item and key model.
//!
//! Every collection member is one item `{partition, sort, score, value}`.
//! The partition is the user-visible collection key, the sort key names the
//! member inside it, and the optional score feeds the per-partition secondary
//! ordering used by lists, sorted sets, sets and geo indexes. Hash fields
//! carry no score and so never appear in that ordering.

pub mod keyspace;
pub mod list_key;

use serde::Deserialize;

use crate::value::Value;

/// Primary key of an item. Unique across the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub partition: String,
    pub sort: String,
}

impl Key {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

/// A stored item.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: Key,
    /// Secondary ordering score, if the item participates in it.
    pub score: Option<f64>,
    /// Payload. Absent for members whose identity is the sort key alone.
    pub value: Option<Value>,
}

impl Item {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            score: None,
            value: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn sort_key(&self) -> &str {
        &self.key.sort
    }

    /// Read an attribute in its [`Value`] form.
    pub fn attribute(&self, attribute: Attribute) -> Option<Value> {
        match attribute {
            Attribute::PartitionKey => Some(Value::String(self.key.partition.clone())),
            Attribute::SortKey => Some(Value::String(self.key.sort.clone())),
            Attribute::Score => self.score.map(Value::Float),
            Attribute::Value => self.value.clone(),
        }
    }
}

/// The fixed attribute set of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    PartitionKey,
    SortKey,
    Score,
    Value,
}

/// Physical attribute names used by a table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    /// Partition key attribute (string).
    pub partition_key: String,
    /// Sort key attribute (string).
    pub sort_key: String,
    /// Secondary score attribute (number), the range key of the index.
    pub score: String,
    /// Payload attribute.
    pub value: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            partition_key: "pk".to_string(),
            sort_key: "sk".to_string(),
            score: "skN".to_string(),
            value: "val".to_string(),
        }
    }
}

impl AttributeNames {
    pub fn name(&self, attribute: Attribute) -> &str {
        match attribute {
            Attribute::PartitionKey => &self.partition_key,
            Attribute::SortKey => &self.sort_key,
            Attribute::Score => &self.score,
            Attribute::Value => &self.value,
        }
    }
}
