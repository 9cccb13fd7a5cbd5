//! Command entry point.
//!
//! [`Client`] carries the backend and the read-consistency level. The
//! collection commands live in their own modules as further `impl Client`
//! blocks.

use std::sync::Arc;

use tracing::warn;

use crate::allocator::IndexAllocator;
use crate::backend::{Backend, ReturnValues};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::expression::ExpressionBuilder;
use crate::item::{keyspace, Item, Key};
use crate::scan::Scan;

/// Redis-style command client over a [`Backend`].
///
/// Cloning is cheap; clones share the backend.
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
    consistent_reads: bool,
}

impl Client {
    /// Client with strongly consistent reads.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            consistent_reads: true,
        }
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            consistent_reads: config.consistent_reads,
        }
    }

    /// A clone whose reads are strongly consistent.
    pub fn strongly_consistent(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            consistent_reads: true,
        }
    }

    /// A clone whose reads are eventually consistent.
    pub fn eventually_consistent(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            consistent_reads: false,
        }
    }

    pub fn consistent_reads(&self) -> bool {
        self.consistent_reads
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub(crate) fn allocator(&self) -> IndexAllocator<'_> {
        IndexAllocator::new(self.backend())
    }

    /// Scan over a user key, at this client's consistency level.
    pub(crate) fn scan(&self, key: &str) -> Scan {
        Scan::new(key).consistent(self.consistent_reads)
    }

    pub(crate) async fn get(&self, key: &str, member: &str) -> Result<Option<Item>> {
        self.backend
            .get_item(&Key::new(key, member), self.consistent_reads)
            .await
    }

    /// Delete every member of every key. Returns the number of keys that
    /// existed.
    ///
    /// List index counters are left in place so indices keep growing
    /// monotonically if the list is recreated.
    pub async fn del(&self, keys: &[&str]) -> Result<usize> {
        for key in keys {
            keyspace::validate(key)?;
        }

        let mut removed_keys = 0;
        let mut removed_items = 0;
        for key in keys {
            let members = self
                .scan(key)
                .keys_only()
                .collect(self.backend())
                .await
                .map_err(|e| e.after(removed_items))?;
            if members.is_empty() {
                continue;
            }
            for member in members {
                self.backend
                    .delete_item(&member.key, &ExpressionBuilder::new(), ReturnValues::None)
                    .await
                    .map_err(|e| {
                        warn!(key = %key, deleted = removed_items, error = %e, "DEL stopped part way");
                        e.after(removed_items)
                    })?;
                removed_items += 1;
            }
            removed_keys += 1;
        }
        Ok(removed_keys)
    }

    /// Number of the given keys holding at least one member.
    pub async fn exists(&self, keys: &[&str]) -> Result<usize> {
        let mut found = 0;
        for key in keys {
            keyspace::validate(key)?;
            if self.key_exists(key).await? {
                found += 1;
            }
        }
        Ok(found)
    }

    pub(crate) async fn key_exists(&self, key: &str) -> Result<bool> {
        let first = self
            .scan(key)
            .keys_only()
            .count(1)
            .run(self.backend())
            .next()
            .await?;
        Ok(first.is_some())
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    keyspace::validate(key)
}

pub(crate) fn validate_member(member: &str) -> Result<()> {
    if member.is_empty() {
        return Err(Error::InvalidArgument("member must not be empty".into()));
    }
    Ok(())
}
