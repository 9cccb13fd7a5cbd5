//! Monotonic list index allocation.
//!
//! Each list owns two counters in the reserved namespace. Allocating on the
//! left atomically decrements the left counter, allocating on the right
//! increments the right one, each in a single atomic-add round trip. The
//! first right allocation returns 0 and the first left allocation -1, so left
//! indices are always negative, right ones never are, and every index handed
//! out is unique for the lifetime of the list.

use tracing::debug;

use crate::backend::{Backend, ReturnValues};
use crate::error::{Error, Result};
use crate::expression::ExpressionBuilder;
use crate::item::{keyspace, Attribute, Key};
use crate::value::Value;

/// End of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn counter(self) -> &'static str {
        match self {
            Side::Left => keyspace::LIST_INDEX_LEFT,
            Side::Right => keyspace::LIST_INDEX_RIGHT,
        }
    }
}

pub struct IndexAllocator<'a> {
    backend: &'a dyn Backend,
}

impl<'a> IndexAllocator<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Next index on the left end of `key`. Strictly decreasing across calls.
    pub async fn allocate_left(&self, key: &str) -> Result<i64> {
        self.allocate(key, Side::Left).await
    }

    /// Next index on the right end of `key`. Strictly increasing across calls.
    pub async fn allocate_right(&self, key: &str) -> Result<i64> {
        self.allocate(key, Side::Right).await
    }

    pub async fn allocate(&self, key: &str, side: Side) -> Result<i64> {
        let counter = Key::new(keyspace::list_counters(key), side.counter());
        let delta = match side {
            Side::Left => -1,
            Side::Right => 1,
        };
        let update = ExpressionBuilder::new().add(Attribute::Value, Value::Integer(delta));

        let item = self
            .backend
            .update_item(&counter, &update, ReturnValues::AllNew)
            .await?
            .ok_or_else(|| Error::Decode(format!("counter {counter:?} returned no item")))?;
        let value = item
            .value
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Decode(format!("counter {counter:?} is not an integer")))?;

        // Counters hold the last index issued on the left and one past the
        // last issued on the right.
        let index = match side {
            Side::Left => value,
            Side::Right => value - 1,
        };
        debug!(key = %key, ?side, index, "Allocated list index");
        Ok(index)
    }
}
