//! Reserved keyspace.
//!
//! Bookkeeping items (list index counters) live in partitions under
//! [`RESERVED_PREFIX`]. User keys may not start with it, so those partitions
//! can never collide with a collection.

use crate::error::{Error, Result};

pub const RESERVED_PREFIX: &str = "_dynaredis/";

/// Counter item holding the next free index on the left end of a list.
pub const LIST_INDEX_LEFT: &str = "index_left";
/// Counter item holding the next free index on the right end of a list.
pub const LIST_INDEX_RIGHT: &str = "index_right";

/// Reject keys inside the reserved namespace, and empty keys.
pub fn validate(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".into()));
    }
    if key.starts_with(RESERVED_PREFIX) {
        return Err(Error::ReservedKey(key.to_string()));
    }
    Ok(())
}

/// Partition holding the index counters of the list at `key`.
pub fn list_counters(key: &str) -> String {
    format!("{RESERVED_PREFIX}{key}")
}
