//! List commands. Lists are stored as a `VecDeque`; executors clone the
//! deque out, mutate it, and write it back while the dispatcher holds the
//! key's write lock.

use super::{parse_i64, read_first_key, rollback_first_key, write_first_key};
use crate::db::{arg_to_string, CommandTable, Database, DataEntity};
use bytes::Bytes;
use gedis_core::resp::Reply;
use std::collections::VecDeque;

fn list_value(db: &Database, key: &str) -> Result<Option<VecDeque<Bytes>>, Reply> {
    match db.get_entity(key) {
        None => Ok(None),
        Some(DataEntity::List(items)) => Ok(Some(items)),
        Some(_) => Err(Reply::wrong_type_err()),
    }
}

fn exec_lpush(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let mut items = match list_value(db, &key) {
        Err(reply) => return reply,
        Ok(items) => items.unwrap_or_default(),
    };
    for value in &args[1..] {
        items.push_front(value.clone());
    }
    let len = items.len();
    db.put_entity(&key, DataEntity::List(items));
    Reply::Integer(len as i64)
}

fn exec_rpush(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let mut items = match list_value(db, &key) {
        Err(reply) => return reply,
        Ok(items) => items.unwrap_or_default(),
    };
    for value in &args[1..] {
        items.push_back(value.clone());
    }
    let len = items.len();
    db.put_entity(&key, DataEntity::List(items));
    Reply::Integer(len as i64)
}

fn pop(db: &Database, args: &[Bytes], front: bool) -> Reply {
    let key = arg_to_string(&args[0]);
    let mut items = match list_value(db, &key) {
        Err(reply) => return reply,
        Ok(None) => return Reply::NullBulk,
        Ok(Some(items)) => items,
    };
    let Some(value) = (if front {
        items.pop_front()
    } else {
        items.pop_back()
    }) else {
        return Reply::NullBulk;
    };
    if items.is_empty() {
        db.remove(&key);
    } else {
        db.put_entity(&key, DataEntity::List(items));
    }
    Reply::Bulk(value)
}

fn exec_lpop(db: &Database, args: &[Bytes]) -> Reply {
    pop(db, args, true)
}

fn exec_rpop(db: &Database, args: &[Bytes]) -> Reply {
    pop(db, args, false)
}

fn exec_llen(db: &Database, args: &[Bytes]) -> Reply {
    match list_value(db, &arg_to_string(&args[0])) {
        Err(reply) => reply,
        Ok(None) => Reply::Integer(0),
        Ok(Some(items)) => Reply::Integer(items.len() as i64),
    }
}

fn exec_lrange(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let (Some(start), Some(stop)) = (parse_i64(&args[1]), parse_i64(&args[2])) else {
        return Reply::not_integer_err();
    };
    let items = match list_value(db, &key) {
        Err(reply) => return reply,
        Ok(None) => return Reply::EmptyMultiBulk,
        Ok(Some(items)) => items,
    };

    let len = items.len() as i64;
    let resolve = |index: i64| -> i64 {
        if index < 0 {
            (len + index).max(0)
        } else {
            index
        }
    };
    let start = resolve(start);
    let stop = resolve(stop).min(len - 1);
    if start > stop || start >= len {
        return Reply::EmptyMultiBulk;
    }

    let slice: Vec<Bytes> = items
        .iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
        .cloned()
        .collect();
    Reply::MultiBulk(slice)
}

pub(crate) fn register(table: &mut CommandTable) {
    table.register("lpush", exec_lpush, Some(write_first_key), Some(rollback_first_key), -3);
    table.register("rpush", exec_rpush, Some(write_first_key), Some(rollback_first_key), -3);
    table.register("lpop", exec_lpop, Some(write_first_key), Some(rollback_first_key), 2);
    table.register("rpop", exec_rpop, Some(write_first_key), Some(rollback_first_key), 2);
    table.register("llen", exec_llen, Some(read_first_key), None, 2);
    table.register("lrange", exec_lrange, Some(read_first_key), None, 4);
}
