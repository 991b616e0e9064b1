//! Write/read hot-path coordination layer for a sharded URL shortener
//! (spec.md §1).
//!
//! This crate is the core: the sharded id generator, the in-memory write
//! batcher, the sharded view counter with asynchronous flush, the front
//! cache with single-flight deduplication, and the lifecycle coordinator
//! that ties their shutdown behavior together. The durable relational
//! store, the distributed KV cache, the job queue, and the message bus are
//! consumed only through the traits in [`collaborators`] — `shortener-api`
//! supplies the concrete adapters and the HTTP surface.

pub mod batcher;
pub mod cache;
pub mod codec;
pub mod collaborators;
pub mod counter;
pub mod engine;
pub mod error;
pub mod fraud;
pub mod idgen;
pub mod lifecycle;
pub mod model;

pub use engine::Engine;
pub use error::{CoreError, CoreResult};
