//! Leaf command implementations, plus the `prepare` builders and the
//! snapshot undo generator they share.
//!
//! Each submodule registers its commands into the [`CommandTable`]; the
//! executors run with the dispatcher already holding the key locks that the
//! command's `prepare` declared.

pub mod connection;
pub mod keys;
pub mod list;
pub mod set;
pub mod string;

use crate::db::{arg_to_string, CmdLine, Database, DataEntity};
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

// ---- prepare builders ---------------------------------------------------

pub(crate) fn no_prepare(_args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    (Vec::new(), Vec::new())
}

pub(crate) fn write_first_key(args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    (vec![arg_to_string(&args[0])], Vec::new())
}

pub(crate) fn read_first_key(args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    (Vec::new(), vec![arg_to_string(&args[0])])
}

pub(crate) fn write_all_keys(args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    (args.iter().map(arg_to_string).collect(), Vec::new())
}

pub(crate) fn read_all_keys(args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    (Vec::new(), args.iter().map(arg_to_string).collect())
}

// ---- undo generators ----------------------------------------------------

pub(crate) fn rollback_first_key(db: &Database, args: &[Bytes]) -> Vec<CmdLine> {
    rollback_given_keys(db, &[arg_to_string(&args[0])])
}

pub(crate) fn rollback_all_keys(db: &Database, args: &[Bytes]) -> Vec<CmdLine> {
    let keys: Vec<String> = args.iter().map(arg_to_string).collect();
    rollback_given_keys(db, &keys)
}

/// Snapshot undo: for each key, a DEL followed (when the key exists) by the
/// command line that re-creates its current entity and the line that restores
/// its current TTL state.
pub(crate) fn rollback_given_keys(db: &Database, keys: &[String]) -> Vec<CmdLine> {
    let mut undo = Vec::with_capacity(keys.len());
    for key in keys {
        match db.get_entity(key) {
            None => undo.push(del_cmd(key)),
            Some(entity) => {
                undo.push(del_cmd(key));
                undo.push(entity_to_cmd(key, &entity));
                undo.push(ttl_restore_cmd(db, key));
            }
        }
    }
    undo
}

fn del_cmd(key: &str) -> CmdLine {
    vec![Bytes::from_static(b"DEL"), Bytes::from(key.to_string())]
}

/// The command line that would re-create `entity` under `key`.
fn entity_to_cmd(key: &str, entity: &DataEntity) -> CmdLine {
    match entity {
        DataEntity::Bytes(value) => vec![
            Bytes::from_static(b"SET"),
            Bytes::from(key.to_string()),
            value.clone(),
        ],
        DataEntity::List(items) => {
            let mut line = Vec::with_capacity(items.len() + 2);
            line.push(Bytes::from_static(b"RPUSH"));
            line.push(Bytes::from(key.to_string()));
            line.extend(items.iter().cloned());
            line
        }
        DataEntity::Set(members) => {
            let mut line = Vec::with_capacity(members.len() + 2);
            line.push(Bytes::from_static(b"SADD"));
            line.push(Bytes::from(key.to_string()));
            line.extend(members.members().into_iter().map(Bytes::from));
            line
        }
    }
}

/// PEXPIREAT for keys that currently carry a TTL, PERSIST otherwise.
pub(crate) fn ttl_restore_cmd(db: &Database, key: &str) -> CmdLine {
    match db.expire_time(key) {
        Some(at) => vec![
            Bytes::from_static(b"PEXPIREAT"),
            Bytes::from(key.to_string()),
            Bytes::from(unix_millis(at).to_string()),
        ],
        None => vec![Bytes::from_static(b"PERSIST"), Bytes::from(key.to_string())],
    }
}

pub(crate) fn unix_millis(at: SystemTime) -> u128 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ---- argument parsing ---------------------------------------------------

pub(crate) fn parse_i64(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}
