//! Condition and update expressions.
//!
//! Commands describe what a write should do as a small AST: a conjunction of
//! [`Condition`]s that must hold on the current item and a list of
//! [`UpdateAction`]s. The in-memory backend evaluates the AST directly; the
//! DynamoDB backend renders it to expression text with `#name` and `:value`
//! placeholders via [`ExpressionBuilder::render`].

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::item::{Attribute, AttributeNames, Item};
use crate::value::Value;

/// A predicate over the current version of an item.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    AttributeExists(Attribute),
    AttributeNotExists(Attribute),
    Equals(Attribute, Value),
}

impl Condition {
    /// Evaluate against the current item (`None` when absent).
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        match self {
            Condition::AttributeExists(attr) => {
                item.and_then(|i| i.attribute(*attr)).is_some()
            }
            Condition::AttributeNotExists(attr) => {
                item.and_then(|i| i.attribute(*attr)).is_none()
            }
            Condition::Equals(attr, expected) => item
                .and_then(|i| i.attribute(*attr))
                .is_some_and(|actual| compare(&actual, expected) == Some(Ordering::Equal)),
        }
    }
}

/// A predicate over the range axis of a query (sort key or score).
#[derive(Debug, Clone, PartialEq)]
pub enum SortCondition {
    Equals(Value),
    /// Inclusive on both ends.
    Between(Value, Value),
    AtLeast(Value),
    AtMost(Value),
    LessThan(Value),
    GreaterThan(Value),
    BeginsWith(String),
}

impl SortCondition {
    pub fn matches(&self, candidate: &Value) -> bool {
        let cmp = |bound: &Value| compare(candidate, bound);
        match self {
            SortCondition::Equals(v) => cmp(v) == Some(Ordering::Equal),
            SortCondition::Between(lo, hi) => {
                matches!(cmp(lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(cmp(hi), Some(Ordering::Less | Ordering::Equal))
            }
            SortCondition::AtLeast(v) => {
                matches!(cmp(v), Some(Ordering::Greater | Ordering::Equal))
            }
            SortCondition::AtMost(v) => matches!(cmp(v), Some(Ordering::Less | Ordering::Equal)),
            SortCondition::LessThan(v) => cmp(v) == Some(Ordering::Less),
            SortCondition::GreaterThan(v) => cmp(v) == Some(Ordering::Greater),
            SortCondition::BeginsWith(prefix) => candidate
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
        }
    }
}

/// One mutation applied by an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Overwrite an attribute.
    Set(Attribute, Value),
    /// Atomically add a number, treating an absent attribute as zero.
    Add(Attribute, Value),
}

impl UpdateAction {
    /// Apply to an item in place.
    pub fn apply(&self, item: &mut Item) -> Result<()> {
        match self {
            UpdateAction::Set(Attribute::Score, value) => {
                item.score = Some(score_of(value)?);
            }
            UpdateAction::Set(Attribute::Value, value) => {
                item.value = Some(value.clone());
            }
            UpdateAction::Add(Attribute::Score, delta) => {
                item.score = Some(item.score.unwrap_or(0.0) + score_of(delta)?);
            }
            UpdateAction::Add(Attribute::Value, delta) => {
                if !delta.is_numeric() {
                    return Err(Error::InvalidArgument(format!(
                        "cannot add {}",
                        delta.type_name()
                    )));
                }
                let current = item.value.take().unwrap_or(Value::Integer(0));
                match current.checked_add(delta) {
                    Ok(sum) => item.value = Some(sum),
                    Err(e) => {
                        item.value = Some(current);
                        return Err(e);
                    }
                }
            }
            UpdateAction::Set(key, _) | UpdateAction::Add(key, _) => {
                return Err(Error::InvalidArgument(format!(
                    "key attribute {key:?} cannot be updated"
                )));
            }
        }
        Ok(())
    }
}

fn score_of(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| Error::UnsupportedValue(format!("score must be a finite number, got {value}")))
}

/// Order two values of the same family. Mixed families are incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// Accumulates conditions and update actions for one write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionBuilder {
    conditions: Vec<Condition>,
    updates: Vec<UpdateAction>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn exists(self, attribute: Attribute) -> Self {
        self.condition(Condition::AttributeExists(attribute))
    }

    pub fn not_exists(self, attribute: Attribute) -> Self {
        self.condition(Condition::AttributeNotExists(attribute))
    }

    pub fn equals(self, attribute: Attribute, value: impl Into<Value>) -> Self {
        self.condition(Condition::Equals(attribute, value.into()))
    }

    pub fn set(mut self, attribute: Attribute, value: impl Into<Value>) -> Self {
        self.updates.push(UpdateAction::Set(attribute, value.into()));
        self
    }

    pub fn add(mut self, attribute: Attribute, delta: impl Into<Value>) -> Self {
        self.updates.push(UpdateAction::Add(attribute, delta.into()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn updates(&self) -> &[UpdateAction] {
        &self.updates
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// True when every condition holds for `item`.
    pub fn check(&self, item: Option<&Item>) -> bool {
        self.conditions.iter().all(|c| c.evaluate(item))
    }

    /// Render to expression text.
    pub fn render(&self, names: &AttributeNames) -> Result<RenderedExpression> {
        let mut placeholders = Placeholders::default();

        let condition = if self.conditions.is_empty() {
            None
        } else {
            let parts = self
                .conditions
                .iter()
                .map(|c| placeholders.condition(c, names))
                .collect::<Result<Vec<_>>>()?;
            Some(parts.join(" AND "))
        };

        let mut sets = Vec::new();
        let mut adds = Vec::new();
        for update in &self.updates {
            match update {
                UpdateAction::Set(attr, value) => {
                    let n = placeholders.name(*attr, names);
                    let v = placeholders.value(value)?;
                    sets.push(format!("{n} = {v}"));
                }
                UpdateAction::Add(attr, value) => {
                    let n = placeholders.name(*attr, names);
                    let v = placeholders.value(value)?;
                    adds.push(format!("{n} {v}"));
                }
            }
        }
        let mut clauses = Vec::new();
        if !sets.is_empty() {
            clauses.push(format!("SET {}", sets.join(", ")));
        }
        if !adds.is_empty() {
            clauses.push(format!("ADD {}", adds.join(", ")));
        }
        let update = (!clauses.is_empty()).then(|| clauses.join(" "));

        Ok(RenderedExpression {
            condition,
            update,
            names: placeholders.names,
            values: placeholders.values,
        })
    }
}

/// Expression text plus its placeholder bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedExpression {
    pub condition: Option<String>,
    pub update: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, Value>,
}

/// Placeholder allocation shared by every clause of one request.
#[derive(Debug, Default)]
pub struct Placeholders {
    pub names: HashMap<String, String>,
    pub values: HashMap<String, Value>,
}

impl Placeholders {
    pub fn name(&mut self, attribute: Attribute, names: &AttributeNames) -> String {
        let placeholder = match attribute {
            Attribute::PartitionKey => "#pk",
            Attribute::SortKey => "#sk",
            Attribute::Score => "#score",
            Attribute::Value => "#val",
        };
        self.names
            .insert(placeholder.to_string(), names.name(attribute).to_string());
        placeholder.to_string()
    }

    pub fn value(&mut self, value: &Value) -> Result<String> {
        if let Value::Float(f) = value {
            if !f.is_finite() {
                return Err(Error::UnsupportedValue(format!("non-finite number {f}")));
            }
        }
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value.clone());
        Ok(placeholder)
    }

    pub fn condition(&mut self, condition: &Condition, names: &AttributeNames) -> Result<String> {
        Ok(match condition {
            Condition::AttributeExists(attr) => {
                format!("attribute_exists({})", self.name(*attr, names))
            }
            Condition::AttributeNotExists(attr) => {
                format!("attribute_not_exists({})", self.name(*attr, names))
            }
            Condition::Equals(attr, value) => {
                let n = self.name(*attr, names);
                format!("{n} = {}", self.value(value)?)
            }
        })
    }

    /// Render a key condition: partition equality plus an optional range
    /// predicate on `axis`.
    pub fn key_condition(
        &mut self,
        partition: &str,
        axis: Attribute,
        range: Option<&SortCondition>,
        names: &AttributeNames,
    ) -> Result<String> {
        let pk = self.name(Attribute::PartitionKey, names);
        let pv = self.value(&Value::from(partition))?;
        let mut text = format!("{pk} = {pv}");

        if let Some(range) = range {
            let n = self.name(axis, names);
            let clause = match range {
                SortCondition::Equals(v) => format!("{n} = {}", self.value(v)?),
                SortCondition::Between(lo, hi) => {
                    let lo = self.value(lo)?;
                    let hi = self.value(hi)?;
                    format!("{n} BETWEEN {lo} AND {hi}")
                }
                SortCondition::AtLeast(v) => format!("{n} >= {}", self.value(v)?),
                SortCondition::AtMost(v) => format!("{n} <= {}", self.value(v)?),
                SortCondition::LessThan(v) => format!("{n} < {}", self.value(v)?),
                SortCondition::GreaterThan(v) => format!("{n} > {}", self.value(v)?),
                SortCondition::BeginsWith(prefix) => {
                    format!("begins_with({n}, {})", self.value(&Value::from(prefix.as_str()))?)
                }
            };
            text.push_str(" AND ");
            text.push_str(&clause);
        }
        Ok(text)
    }
}
