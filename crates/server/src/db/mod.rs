//! The database engine.
//!
//! A [`Database`] owns one keyspace: the data dictionary, the TTL index, the
//! per-key version counters used by WATCH, a swap-on-flush key lock table and
//! the stop-the-world gate raised during FLUSHDB. Commands reach it through
//! [`Database::exec`], which intercepts the transaction control commands and
//! dispatches everything else through the registry under ordered key locks.

pub mod multi;
pub mod registry;
pub mod transaction;

pub use multi::MultiDb;
pub use registry::{arg_to_string, cmd_name, validate_arity, CmdLine, CommandTable};

use crate::client::ClientState;
use bytes::Bytes;
use gedis_core::dict::ConcurrentDict;
use gedis_core::lock::KeyLocks;
use gedis_core::resp::Reply;
use gedis_core::set::Set;
use gedis_core::sync::PauseGate;
use gedis_core::timewheel::TimeWheel;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use tracing::debug;

const DATA_DICT_SHARDS: usize = 1 << 12;
const TTL_DICT_SHARDS: usize = 1 << 7;
const LOCKER_SIZE: usize = 1024;

/// A stored value. The engine never looks inside; leaf commands narrow the
/// variant they expect.
#[derive(Debug, Clone)]
pub enum DataEntity {
    Bytes(Bytes),
    List(VecDeque<Bytes>),
    Set(Set),
}

impl DataEntity {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataEntity::Bytes(_) => "string",
            DataEntity::List(_) => "list",
            DataEntity::Set(_) => "set",
        }
    }
}

pub struct Database {
    index: usize,
    data: ConcurrentDict<DataEntity>,
    ttl_map: ConcurrentDict<SystemTime>,
    version_map: ConcurrentDict<u32>,
    /// Swapped wholesale on flush; guards already out keep the old table
    /// alive until they drop.
    locker: RwLock<Arc<KeyLocks>>,
    pause: PauseGate,
    wheel: Arc<TimeWheel>,
    table: Arc<CommandTable>,
    me: Weak<Database>,
}

impl Database {
    pub fn new(index: usize, wheel: Arc<TimeWheel>, table: Arc<CommandTable>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            index,
            data: ConcurrentDict::new(DATA_DICT_SHARDS),
            ttl_map: ConcurrentDict::new(TTL_DICT_SHARDS),
            version_map: ConcurrentDict::new(DATA_DICT_SHARDS),
            locker: RwLock::new(Arc::new(KeyLocks::new(LOCKER_SIZE))),
            pause: PauseGate::new(),
            wheel,
            table,
            me: me.clone(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn table(&self) -> &CommandTable {
        &self.table
    }

    pub(crate) fn locker(&self) -> Arc<KeyLocks> {
        self.locker.read().clone()
    }

    // ---- command dispatch ----------------------------------------------

    /// Entry point for one request line on this database. Transaction
    /// control commands are handled here; while the connection is in MULTI,
    /// everything else is queued instead of executed.
    pub fn exec(&self, client: &mut ClientState, cmdline: &[Bytes]) -> Reply {
        let name = cmd_name(cmdline);
        match name.as_str() {
            "multi" => {
                if cmdline.len() != 1 {
                    return Reply::arg_num_err(&name);
                }
                transaction::start_multi(client)
            }
            "discard" => {
                if cmdline.len() != 1 {
                    return Reply::arg_num_err(&name);
                }
                transaction::discard_multi(client)
            }
            "exec" => {
                if cmdline.len() != 1 {
                    return Reply::arg_num_err(&name);
                }
                transaction::exec_multi(self, client)
            }
            "watch" => {
                if !validate_arity(-2, cmdline) {
                    return Reply::arg_num_err(&name);
                }
                transaction::watch(self, client, &cmdline[1..])
            }
            "flushdb" => {
                if !validate_arity(1, cmdline) {
                    return Reply::arg_num_err(&name);
                }
                if client.in_multi_state() {
                    return Reply::err("ERR command 'flushdb' cannot be used in MULTI");
                }
                self.flush();
                Reply::ok()
            }
            _ if client.in_multi_state() => transaction::enqueue_cmd(self, client, cmdline),
            _ => self.exec_normal(cmdline),
        }
    }

    /// Dispatch outside any transaction: validate, bump the write-set
    /// versions, then run the executor under ordered key locks. The version
    /// bump happens before the locks; WATCH validation reads versions inside
    /// the EXEC lock region, so it observes the bump only once the write
    /// commits.
    pub(crate) fn exec_normal(&self, cmdline: &[Bytes]) -> Reply {
        let name = cmd_name(cmdline);
        let Some(cmd) = self.table.get(&name) else {
            return Reply::unknown_command_err(&name);
        };
        if !validate_arity(cmd.arity, cmdline) {
            return Reply::arg_num_err(&name);
        }
        let args = &cmdline[1..];
        match cmd.prepare {
            Some(prepare) => {
                let (write_keys, read_keys) = prepare(args);
                self.add_version(write_keys.iter().map(String::as_str));
                let locker = self.locker();
                let _guard = locker.rw_locks(&write_keys, &read_keys);
                (cmd.exec)(self, args)
            }
            None => (cmd.exec)(self, args),
        }
    }

    /// Dispatch without taking locks, for callers that already hold the
    /// batch's lock region (EXEC and undo replay).
    pub(crate) fn exec_with_lock(&self, cmdline: &[Bytes]) -> Reply {
        let name = cmd_name(cmdline);
        let Some(cmd) = self.table.get(&name) else {
            return Reply::unknown_command_err(&name);
        };
        if !validate_arity(cmd.arity, cmdline) {
            return Reply::arg_num_err(&name);
        }
        (cmd.exec)(self, &cmdline[1..])
    }

    /// Compensating command lines for one request line, from the command's
    /// undo generator. Empty when the command has none.
    pub(crate) fn undo_logs(&self, cmdline: &[Bytes]) -> Vec<CmdLine> {
        let name = cmd_name(cmdline);
        self.table
            .get(&name)
            .and_then(|cmd| cmd.undo)
            .map(|undo| undo(self, &cmdline[1..]))
            .unwrap_or_default()
    }

    // ---- keyspace -------------------------------------------------------

    /// Fetch a live entity. Expired keys read as absent and are removed from
    /// both the data and TTL maps on the way out.
    pub fn get_entity(&self, key: &str) -> Option<DataEntity> {
        self.pause.wait();
        let entity = self.data.get(key)?;
        if self.is_expired(key) {
            return None;
        }
        Some(entity)
    }

    pub fn put_entity(&self, key: &str, entity: DataEntity) -> i32 {
        self.pause.wait();
        self.data.put(key, entity)
    }

    pub fn put_if_exists(&self, key: &str, entity: DataEntity) -> i32 {
        self.pause.wait();
        self.data.put_if_exists(key, entity)
    }

    pub fn put_if_absent(&self, key: &str, entity: DataEntity) -> i32 {
        self.pause.wait();
        self.data.put_if_absent(key, entity)
    }

    /// Delete a key, its TTL and any pending expiration task.
    pub fn remove(&self, key: &str) {
        self.pause.wait();
        self.data.remove(key);
        self.ttl_map.remove(key);
        self.wheel.cancel(&self.expire_task_key(key));
    }

    /// Delete the present keys among `keys`; returns how many existed.
    pub fn removes<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> i64 {
        self.pause.wait();
        let mut deleted = 0;
        for key in keys {
            if self.data.contains_key(key) {
                self.remove(key);
                deleted += 1;
            }
        }
        deleted
    }

    /// Drop everything. Raises the stop-the-world gate for the duration and
    /// reinitializes the lock table. Version counters survive so WATCH stays
    /// monotone across a flush.
    pub fn flush(&self) {
        let _world = self.pause.pause();
        self.data.clear();
        self.ttl_map.clear();
        *self.locker.write() = Arc::new(KeyLocks::new(LOCKER_SIZE));
    }

    // ---- expiration -----------------------------------------------------

    fn expire_task_key(&self, key: &str) -> String {
        format!("expire:{}:{}", self.index, key)
    }

    /// Set the key's absolute expiration and register the wheel callback.
    /// The callback re-reads the TTL under the key's write lock before
    /// removing anything: the registration may have been replaced or cleared
    /// while it waited.
    pub fn expire(&self, key: &str, at: SystemTime) {
        self.pause.wait();
        self.ttl_map.put(key, at);
        let me = self.me.clone();
        let key = key.to_string();
        let task_key = self.expire_task_key(&key);
        self.wheel.at(
            at,
            task_key,
            Box::new(move || {
                let Some(db) = me.upgrade() else {
                    return;
                };
                let locker = db.locker();
                let _guard = locker.lock(&key);
                let Some(at) = db.ttl_map.get(&key) else {
                    return;
                };
                if SystemTime::now() >= at {
                    debug!(key = %key, db = db.index, "expired");
                    db.remove(&key);
                }
            }),
        );
    }

    /// Clear the key's TTL and cancel its pending expiration task.
    pub fn persist(&self, key: &str) {
        self.pause.wait();
        self.ttl_map.remove(key);
        self.wheel.cancel(&self.expire_task_key(key));
    }

    /// True when the key has a TTL in the past; removes the key as a side
    /// effect.
    pub fn is_expired(&self, key: &str) -> bool {
        let Some(at) = self.ttl_map.get(key) else {
            return false;
        };
        let expired = SystemTime::now() >= at;
        if expired {
            self.remove(key);
        }
        expired
    }

    pub fn expire_time(&self, key: &str) -> Option<SystemTime> {
        self.ttl_map.get(key)
    }

    // ---- versions -------------------------------------------------------

    /// Bump each key's version counter; missing entries count as version 0.
    pub fn add_version<'k>(&self, keys: impl IntoIterator<Item = &'k str>) {
        for key in keys {
            let version = self.get_version(key);
            self.version_map.put(key, version.wrapping_add(1));
        }
    }

    pub fn get_version(&self, key: &str) -> u32 {
        self.version_map.get(key).unwrap_or(0)
    }

    // ---- iteration ------------------------------------------------------

    /// Visit live entries with their optional expiration. Consistency is per
    /// shard of the underlying dictionary, not global.
    pub fn for_each(&self, mut f: impl FnMut(&str, &DataEntity, Option<SystemTime>) -> bool) {
        self.data.for_each(|key, entity| {
            let expiration = self.ttl_map.get(key);
            f(key, entity, expiration)
        });
    }

    pub fn key_count(&self) -> usize {
        self.data.len()
    }

    /// Sample up to `n` keys, with replacement, from the data dictionary.
    pub fn random_keys(&self, n: usize) -> Vec<String> {
        self.data.random_keys(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_db() -> Arc<Database> {
        Database::new(
            0,
            TimeWheel::spawn_default(),
            Arc::new(CommandTable::standard()),
        )
    }

    fn line(words: &[&str]) -> CmdLine {
        words
            .iter()
            .map(|w| Bytes::copy_from_slice(w.as_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn entity_round_trip() {
        let db = test_db();
        assert_eq!(db.put_entity("a", DataEntity::Bytes(Bytes::from("1"))), 1);
        assert_eq!(db.put_entity("a", DataEntity::Bytes(Bytes::from("2"))), 0);
        match db.get_entity("a") {
            Some(DataEntity::Bytes(b)) => assert_eq!(&b[..], b"2"),
            other => panic!("unexpected entity {other:?}"),
        }
        assert_eq!(db.key_count(), 1);
    }

    #[tokio::test]
    async fn expired_key_reads_absent_and_is_removed() {
        let db = test_db();
        db.put_entity("a", DataEntity::Bytes(Bytes::from("v")));
        db.expire("a", SystemTime::now() - Duration::from_secs(1));
        assert!(db.get_entity("a").is_none());
        assert!(db.expire_time("a").is_none());
        assert_eq!(db.key_count(), 0);
    }

    #[tokio::test]
    async fn persist_clears_the_ttl() {
        let db = test_db();
        db.put_entity("a", DataEntity::Bytes(Bytes::from("v")));
        db.expire("a", SystemTime::now() + Duration::from_secs(60));
        assert!(db.expire_time("a").is_some());
        db.persist("a");
        assert!(db.expire_time("a").is_none());
        assert!(db.get_entity("a").is_some());
    }

    #[tokio::test]
    async fn versions_are_monotone() {
        let db = test_db();
        assert_eq!(db.get_version("a"), 0);
        db.add_version(["a"]);
        db.add_version(["a", "b"]);
        assert_eq!(db.get_version("a"), 2);
        assert_eq!(db.get_version("b"), 1);
    }

    #[tokio::test]
    async fn removes_counts_only_present_keys() {
        let db = test_db();
        db.put_entity("a", DataEntity::Bytes(Bytes::from("1")));
        db.put_entity("b", DataEntity::Bytes(Bytes::from("2")));
        assert_eq!(db.removes(["a", "b", "missing"]), 2);
        assert_eq!(db.key_count(), 0);
    }

    #[tokio::test]
    async fn flush_keeps_versions() {
        let db = test_db();
        db.put_entity("a", DataEntity::Bytes(Bytes::from("1")));
        db.expire("a", SystemTime::now() + Duration::from_secs(60));
        db.add_version(["a"]);
        db.flush();
        assert_eq!(db.key_count(), 0);
        assert!(db.expire_time("a").is_none());
        assert_eq!(db.get_version("a"), 1);
    }

    #[tokio::test]
    async fn dispatcher_runs_registered_commands() {
        let db = test_db();
        let mut client = ClientState::new();
        assert_eq!(
            db.exec(&mut client, &line(&["SET", "a", "1"])),
            Reply::ok()
        );
        assert_eq!(
            db.exec(&mut client, &line(&["GET", "a"])),
            Reply::Bulk(Bytes::from("1"))
        );
        assert_eq!(db.get_version("a"), 1);
    }

    #[tokio::test]
    async fn dispatcher_rejects_unknown_and_wrong_arity() {
        let db = test_db();
        let mut client = ClientState::new();
        assert_eq!(
            db.exec(&mut client, &line(&["NOPE", "a"])),
            Reply::err("ERR unknown command 'nope'")
        );
        assert_eq!(
            db.exec(&mut client, &line(&["GET"])),
            Reply::err("ERR wrong number of arguments for 'get' command")
        );
    }
}
