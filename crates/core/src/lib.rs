//! Core building blocks for the gedis server: the sharded keyspace
//! dictionary, the ordered multi-key lock table, the expiration time wheel
//! and the RESP wire protocol.

pub mod dict;
pub mod hash;
pub mod lock;
pub mod pattern;
pub mod resp;
pub mod set;
pub mod sync;
pub mod timewheel;
