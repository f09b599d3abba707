//! String commands.

use super::{
    parse_i64, read_all_keys, read_first_key, rollback_first_key, rollback_given_keys,
    write_first_key,
};
use crate::db::{arg_to_string, CmdLine, CommandTable, Database, DataEntity};
use bytes::Bytes;
use gedis_core::resp::Reply;
use std::time::{Duration, SystemTime};

/// Narrow a stored entity to a string value.
fn string_value(db: &Database, key: &str) -> Result<Option<Bytes>, Reply> {
    match db.get_entity(key) {
        None => Ok(None),
        Some(DataEntity::Bytes(value)) => Ok(Some(value)),
        Some(_) => Err(Reply::wrong_type_err()),
    }
}

fn exec_get(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    match string_value(db, &key) {
        Err(reply) => reply,
        Ok(None) => Reply::NullBulk,
        Ok(Some(value)) => Reply::Bulk(value),
    }
}

#[derive(PartialEq)]
enum SetPolicy {
    Upsert,
    InsertOnly,
    UpdateOnly,
}

fn exec_set(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let value = args[1].clone();

    let mut policy = SetPolicy::Upsert;
    let mut ttl: Option<Duration> = None;
    let mut i = 2;
    while i < args.len() {
        let option = arg_to_string(&args[i]).to_uppercase();
        match option.as_str() {
            "NX" | "XX" => {
                if policy != SetPolicy::Upsert {
                    return Reply::syntax_err();
                }
                policy = if option == "NX" {
                    SetPolicy::InsertOnly
                } else {
                    SetPolicy::UpdateOnly
                };
                i += 1;
            }
            "EX" | "PX" => {
                if ttl.is_some() || i + 1 >= args.len() {
                    return Reply::syntax_err();
                }
                let Some(amount) = parse_i64(&args[i + 1]).filter(|n| *n > 0) else {
                    return Reply::err("ERR invalid expire time in 'set' command");
                };
                ttl = Some(if option == "EX" {
                    Duration::from_secs(amount as u64)
                } else {
                    Duration::from_millis(amount as u64)
                });
                i += 2;
            }
            _ => return Reply::syntax_err(),
        }
    }

    let entity = DataEntity::Bytes(value);
    let written = match policy {
        SetPolicy::Upsert => {
            db.put_entity(&key, entity);
            1
        }
        SetPolicy::InsertOnly => db.put_if_absent(&key, entity),
        SetPolicy::UpdateOnly => db.put_if_exists(&key, entity),
    };
    if written == 0 {
        return Reply::NullBulk;
    }
    // a plain SET discards any previous TTL
    match ttl {
        Some(ttl) => db.expire(&key, SystemTime::now() + ttl),
        None => db.persist(&key),
    }
    Reply::ok()
}

fn exec_setnx(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let written = db.put_if_absent(&key, DataEntity::Bytes(args[1].clone()));
    Reply::Integer(i64::from(written))
}

fn exec_getset(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let old = match string_value(db, &key) {
        Err(reply) => return reply,
        Ok(old) => old,
    };
    db.put_entity(&key, DataEntity::Bytes(args[1].clone()));
    match old {
        Some(value) => Reply::Bulk(value),
        None => Reply::NullBulk,
    }
}

fn exec_mget(db: &Database, args: &[Bytes]) -> Reply {
    let values = args
        .iter()
        .map(|arg| {
            let key = arg_to_string(arg);
            match string_value(db, &key) {
                Ok(Some(value)) => Reply::Bulk(value),
                // absent and wrong-typed keys both read as nil
                _ => Reply::NullBulk,
            }
        })
        .collect();
    Reply::MultiRaw(values)
}

fn exec_mset(db: &Database, args: &[Bytes]) -> Reply {
    if args.len() % 2 != 0 {
        return Reply::syntax_err();
    }
    for pair in args.chunks_exact(2) {
        db.put_entity(&arg_to_string(&pair[0]), DataEntity::Bytes(pair[1].clone()));
    }
    Reply::ok()
}

fn exec_msetnx(db: &Database, args: &[Bytes]) -> Reply {
    if args.len() % 2 != 0 {
        return Reply::syntax_err();
    }
    // all-or-nothing: the dispatcher holds write locks over every key, so
    // the existence check and the inserts are one atomic step
    let keys: Vec<String> = args.chunks_exact(2).map(|p| arg_to_string(&p[0])).collect();
    if keys.iter().any(|key| db.get_entity(key).is_some()) {
        return Reply::Integer(0);
    }
    for (pair, key) in args.chunks_exact(2).zip(&keys) {
        db.put_entity(key, DataEntity::Bytes(pair[1].clone()));
    }
    Reply::Integer(1)
}

fn incr_by(db: &Database, key: &str, delta: i64) -> Reply {
    let current = match string_value(db, key) {
        Err(reply) => return reply,
        Ok(None) => 0,
        Ok(Some(value)) => match parse_i64(&value) {
            Some(n) => n,
            None => return Reply::not_integer_err(),
        },
    };
    let Some(next) = current.checked_add(delta) else {
        return Reply::err("ERR increment or decrement would overflow");
    };
    db.put_entity(key, DataEntity::Bytes(Bytes::from(next.to_string())));
    Reply::Integer(next)
}

fn exec_incr(db: &Database, args: &[Bytes]) -> Reply {
    incr_by(db, &arg_to_string(&args[0]), 1)
}

fn exec_decr(db: &Database, args: &[Bytes]) -> Reply {
    incr_by(db, &arg_to_string(&args[0]), -1)
}

fn exec_incrby(db: &Database, args: &[Bytes]) -> Reply {
    match parse_i64(&args[1]) {
        Some(delta) => incr_by(db, &arg_to_string(&args[0]), delta),
        None => Reply::not_integer_err(),
    }
}

fn exec_decrby(db: &Database, args: &[Bytes]) -> Reply {
    match parse_i64(&args[1]) {
        Some(delta) if delta != i64::MIN => incr_by(db, &arg_to_string(&args[0]), -delta),
        _ => Reply::not_integer_err(),
    }
}

fn exec_append(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let old = match string_value(db, &key) {
        Err(reply) => return reply,
        Ok(old) => old.unwrap_or_default(),
    };
    let mut combined = Vec::with_capacity(old.len() + args[1].len());
    combined.extend_from_slice(&old);
    combined.extend_from_slice(&args[1]);
    let len = combined.len();
    db.put_entity(&key, DataEntity::Bytes(Bytes::from(combined)));
    Reply::Integer(len as i64)
}

fn exec_strlen(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    match string_value(db, &key) {
        Err(reply) => reply,
        Ok(None) => Reply::Integer(0),
        Ok(Some(value)) => Reply::Integer(value.len() as i64),
    }
}

/// MSET-style argument lists: keys sit at the even positions.
fn prepare_even_keys(args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    let keys = args.iter().step_by(2).map(arg_to_string).collect();
    (keys, Vec::new())
}

fn undo_even_keys(db: &Database, args: &[Bytes]) -> Vec<CmdLine> {
    let keys: Vec<String> = args.iter().step_by(2).map(arg_to_string).collect();
    rollback_given_keys(db, &keys)
}

pub(crate) fn register(table: &mut CommandTable) {
    table.register("get", exec_get, Some(read_first_key), None, 2);
    table.register("set", exec_set, Some(write_first_key), Some(rollback_first_key), -3);
    table.register("setnx", exec_setnx, Some(write_first_key), Some(rollback_first_key), 3);
    table.register("getset", exec_getset, Some(write_first_key), Some(rollback_first_key), 3);
    table.register("mget", exec_mget, Some(read_all_keys), None, -2);
    table.register("mset", exec_mset, Some(prepare_even_keys), Some(undo_even_keys), -3);
    table.register("msetnx", exec_msetnx, Some(prepare_even_keys), Some(undo_even_keys), -3);
    table.register("incr", exec_incr, Some(write_first_key), Some(rollback_first_key), 2);
    table.register("decr", exec_decr, Some(write_first_key), Some(rollback_first_key), 2);
    table.register("incrby", exec_incrby, Some(write_first_key), Some(rollback_first_key), 3);
    table.register("decrby", exec_decrby, Some(write_first_key), Some(rollback_first_key), 3);
    table.register("append", exec_append, Some(write_first_key), Some(rollback_first_key), 3);
    table.register("strlen", exec_strlen, Some(read_first_key), None, 2);
}
