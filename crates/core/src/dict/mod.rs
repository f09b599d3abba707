//! Keyspace dictionaries: the sharded concurrent map used by every database,
//! and a single-lock sibling with the same surface for structures that are
//! serialized by their owner.

mod concurrent;
mod simple;

pub use concurrent::ConcurrentDict;
pub use simple::SimpleDict;
