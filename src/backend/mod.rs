//! Backing-store seam.
//!
//! Every command is built from the primitives of [`Backend`]: point reads
//! and conditional writes, atomic updates, ordered range queries over one
//! partition, and small transactions. Requests carry structured expressions;
//! each implementation interprets them its own way.

use async_trait::async_trait;

use crate::error::Result;
use crate::expression::{ExpressionBuilder, SortCondition};
use crate::item::{Item, Key};

pub mod memory;

#[cfg(feature = "dynamo")]
pub mod dynamo;

pub use memory::MemoryBackend;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoBackend;

/// Largest number of items a single transaction may touch.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// Which version of an item a write returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    AllNew,
}

/// Ordering axis of a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    /// Primary sort key, lexicographic.
    #[default]
    SortKey,
    /// Secondary score, numeric. Items without a score are not visible.
    Score,
}

/// What a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Select {
    /// Full items.
    #[default]
    Items,
    /// Key attributes and score only.
    Keys,
    /// Only the number of matches.
    Count,
}

/// Opaque continuation point of a paginated query.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub(crate) key: Key,
    pub(crate) score: Option<f64>,
}

/// A single page request over one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub partition: String,
    pub axis: Axis,
    pub condition: Option<SortCondition>,
    pub forward: bool,
    /// Upper bound on matches evaluated for this page.
    pub limit: Option<usize>,
    pub cursor: Option<Cursor>,
    pub select: Select,
    pub consistent: bool,
}

impl Query {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            axis: Axis::SortKey,
            condition: None,
            forward: true,
            limit: None,
            cursor: None,
            select: Select::Items,
            consistent: true,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Matches, empty for [`Select::Count`].
    pub items: Vec<Item>,
    /// Number of matches in this page.
    pub count: usize,
    /// Present when the store may hold further matches.
    pub cursor: Option<Cursor>,
}

/// One write inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        item: Item,
        expression: ExpressionBuilder,
    },
    Update {
        key: Key,
        expression: ExpressionBuilder,
    },
    Delete {
        key: Key,
        expression: ExpressionBuilder,
    },
    ConditionCheck {
        key: Key,
        expression: ExpressionBuilder,
    },
}

impl WriteOp {
    pub fn key(&self) -> &Key {
        match self {
            WriteOp::Put { item, .. } => &item.key,
            WriteOp::Update { key, .. }
            | WriteOp::Delete { key, .. }
            | WriteOp::ConditionCheck { key, .. } => key,
        }
    }
}

/// Interface to the partitioned key-value store.
///
/// Conditional writes whose conditions do not hold fail with
/// [`Error::ConditionFailed`](crate::Error::ConditionFailed) and leave the
/// store unchanged. Transactions are all-or-nothing.
///
/// # Implementations
///
/// - `MemoryBackend`: In-process store for tests and local development
/// - `DynamoBackend`: Amazon DynamoDB (feature `dynamo`)
#[async_trait]
pub trait Backend: Send + Sync {
    /// Point read.
    async fn get_item(&self, key: &Key, consistent: bool) -> Result<Option<Item>>;

    /// Replace an item, subject to the conditions of `expression`.
    async fn put_item(
        &self,
        item: Item,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>>;

    /// Apply the update actions of `expression`, creating the item if absent.
    async fn update_item(
        &self,
        key: &Key,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>>;

    /// Delete an item. Deleting an absent item succeeds unless a condition
    /// requires it to exist.
    async fn delete_item(
        &self,
        key: &Key,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>>;

    /// Fetch one page of a range query.
    async fn query(&self, query: &Query) -> Result<QueryPage>;

    /// Apply up to [`MAX_TRANSACTION_ITEMS`] writes atomically. Each item may
    /// appear at most once.
    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Read up to [`MAX_TRANSACTION_ITEMS`] items as one consistent snapshot.
    async fn transact_get(&self, keys: &[Key]) -> Result<Vec<Option<Item>>>;
}
