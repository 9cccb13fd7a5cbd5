//! dynaredis - Redis data structures on a partitioned key-value store
//!
//! Lists, sorted sets, sets, hashes and geo indexes mapped onto a store
//! that offers point reads, conditional writes, atomic counters, small
//! transactions and ordered range queries within one partition (DynamoDB,
//! or the in-process [`MemoryBackend`]).
//!
//! ```no_run
//! # async fn demo() -> dynaredis::Result<()> {
//! use std::sync::Arc;
//! use dynaredis::{Client, MemoryBackend, Value};
//!
//! let client = Client::new(Arc::new(MemoryBackend::new()));
//! client.rpush("queue", ["a", "b"]).await?;
//! assert_eq!(client.lpop("queue").await?, Some(Value::from("a")));
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod backend;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod expression;
pub mod geo;
pub mod hashes;
pub mod item;
pub mod lists;
pub mod range;
pub mod scan;
pub mod sets;
pub mod sorted_sets;
pub mod value;

pub use backend::{Backend, MemoryBackend};
pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};
pub use geo::{GeoMember, Location, Unit};
pub use range::RangeCap;
pub use scan::{RangeScan, Scan};
pub use sorted_sets::{Aggregate, Flags, ScoredMember};
pub use value::Value;

#[cfg(feature = "dynamo")]
pub use backend::DynamoBackend;
