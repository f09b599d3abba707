//! Key management commands: existence, renames, scans and the TTL family.

use super::{
    no_prepare, parse_i64, read_all_keys, read_first_key, rollback_all_keys, ttl_restore_cmd,
    write_all_keys, write_first_key,
};
use crate::db::{arg_to_string, CmdLine, CommandTable, Database};
use bytes::Bytes;
use gedis_core::pattern;
use gedis_core::resp::Reply;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn exec_del(db: &Database, args: &[Bytes]) -> Reply {
    let keys: Vec<String> = args.iter().map(arg_to_string).collect();
    Reply::Integer(db.removes(keys.iter().map(String::as_str)))
}

fn exec_exists(db: &Database, args: &[Bytes]) -> Reply {
    let present = args
        .iter()
        .filter(|arg| db.get_entity(&arg_to_string(arg)).is_some())
        .count();
    Reply::Integer(present as i64)
}

fn exec_type(db: &Database, args: &[Bytes]) -> Reply {
    match db.get_entity(&arg_to_string(&args[0])) {
        Some(entity) => Reply::Status(entity.type_name().to_string()),
        None => Reply::Status("none".to_string()),
    }
}

fn rename_entity(db: &Database, src: &str, dst: &str) -> Option<()> {
    let entity = db.get_entity(src)?;
    let ttl = db.expire_time(src);
    db.remove(src);
    db.put_entity(dst, entity);
    match ttl {
        Some(at) => db.expire(dst, at),
        None => db.persist(dst),
    }
    Some(())
}

fn exec_rename(db: &Database, args: &[Bytes]) -> Reply {
    let (src, dst) = (arg_to_string(&args[0]), arg_to_string(&args[1]));
    match rename_entity(db, &src, &dst) {
        Some(()) => Reply::ok(),
        None => Reply::err("ERR no such key"),
    }
}

fn exec_renamenx(db: &Database, args: &[Bytes]) -> Reply {
    let (src, dst) = (arg_to_string(&args[0]), arg_to_string(&args[1]));
    if db.get_entity(&src).is_none() {
        return Reply::err("ERR no such key");
    }
    if db.get_entity(&dst).is_some() {
        return Reply::Integer(0);
    }
    rename_entity(db, &src, &dst);
    Reply::Integer(1)
}

fn exec_keys(db: &Database, args: &[Bytes]) -> Reply {
    let glob = &args[0];
    let mut matched = Vec::new();
    db.for_each(|key, _, _| {
        if pattern::matches(glob, key.as_bytes()) {
            matched.push(Bytes::from(key.to_string()));
        }
        true
    });
    Reply::MultiBulk(matched)
}

fn exec_randomkey(db: &Database, _args: &[Bytes]) -> Reply {
    // sampled from the live dictionary; an expired-but-unswept key is
    // possible and reads as absent like any other expired key
    match db.random_keys(1).into_iter().next() {
        Some(key) => Reply::Bulk(Bytes::from(key)),
        None => Reply::NullBulk,
    }
}

// ---- TTL family ---------------------------------------------------------

fn expire_at(db: &Database, args: &[Bytes], at: Option<SystemTime>) -> Reply {
    let key = arg_to_string(&args[0]);
    let Some(at) = at else {
        return Reply::not_integer_err();
    };
    if db.get_entity(&key).is_none() {
        return Reply::Integer(0);
    }
    db.expire(&key, at);
    Reply::Integer(1)
}

fn exec_expire(db: &Database, args: &[Bytes]) -> Reply {
    let at = parse_i64(&args[1]).map(|secs| offset_from_now(Duration::from_secs(secs.unsigned_abs()), secs));
    expire_at(db, args, at)
}

fn exec_pexpire(db: &Database, args: &[Bytes]) -> Reply {
    let at = parse_i64(&args[1]).map(|ms| offset_from_now(Duration::from_millis(ms.unsigned_abs()), ms));
    expire_at(db, args, at)
}

/// Absolute deadline for a relative offset; negative offsets land in the
/// past, which the expiration machinery treats as due immediately.
fn offset_from_now(magnitude: Duration, sign: i64) -> SystemTime {
    if sign >= 0 {
        SystemTime::now() + magnitude
    } else {
        SystemTime::now() - magnitude
    }
}

fn exec_expireat(db: &Database, args: &[Bytes]) -> Reply {
    let at = parse_i64(&args[1])
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64));
    expire_at(db, args, at)
}

fn exec_pexpireat(db: &Database, args: &[Bytes]) -> Reply {
    let at = parse_i64(&args[1]).map(|ms| UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64));
    expire_at(db, args, at)
}

fn remaining_ttl(db: &Database, key: &str) -> Option<Option<Duration>> {
    db.get_entity(key)?;
    match db.expire_time(key) {
        Some(at) => Some(Some(
            at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO),
        )),
        None => Some(None),
    }
}

fn exec_ttl(db: &Database, args: &[Bytes]) -> Reply {
    match remaining_ttl(db, &arg_to_string(&args[0])) {
        None => Reply::Integer(-2),
        Some(None) => Reply::Integer(-1),
        Some(Some(left)) => Reply::Integer(left.as_millis().div_ceil(1000) as i64),
    }
}

fn exec_pttl(db: &Database, args: &[Bytes]) -> Reply {
    match remaining_ttl(db, &arg_to_string(&args[0])) {
        None => Reply::Integer(-2),
        Some(None) => Reply::Integer(-1),
        Some(Some(left)) => Reply::Integer(left.as_millis() as i64),
    }
}

fn exec_persist(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    if db.get_entity(&key).is_none() || db.expire_time(&key).is_none() {
        return Reply::Integer(0);
    }
    db.persist(&key);
    Reply::Integer(1)
}

/// Undo for the TTL family only touches the TTL state, not the value.
fn undo_ttl_change(db: &Database, args: &[Bytes]) -> Vec<CmdLine> {
    vec![ttl_restore_cmd(db, &arg_to_string(&args[0]))]
}

pub(crate) fn register(table: &mut CommandTable) {
    table.register("del", exec_del, Some(write_all_keys), Some(rollback_all_keys), -2);
    table.register("exists", exec_exists, Some(read_all_keys), None, -2);
    table.register("type", exec_type, Some(read_first_key), None, 2);
    table.register("rename", exec_rename, Some(write_all_keys), Some(rollback_all_keys), 3);
    table.register("renamenx", exec_renamenx, Some(write_all_keys), Some(rollback_all_keys), 3);
    table.register("keys", exec_keys, Some(no_prepare), None, 2);
    table.register("randomkey", exec_randomkey, Some(no_prepare), None, 1);
    table.register("expire", exec_expire, Some(write_first_key), Some(undo_ttl_change), 3);
    table.register("pexpire", exec_pexpire, Some(write_first_key), Some(undo_ttl_change), 3);
    table.register("expireat", exec_expireat, Some(write_first_key), Some(undo_ttl_change), 3);
    table.register("pexpireat", exec_pexpireat, Some(write_first_key), Some(undo_ttl_change), 3);
    table.register("ttl", exec_ttl, Some(read_first_key), None, 2);
    table.register("pttl", exec_pttl, Some(read_first_key), None, 2);
    table.register("persist", exec_persist, Some(write_first_key), Some(undo_ttl_change), 2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use gedis_core::timewheel::TimeWheel;
    use std::sync::Arc;

    fn test_db() -> Arc<Database> {
        Database::new(
            0,
            TimeWheel::spawn_default(),
            Arc::new(CommandTable::standard()),
        )
    }

    fn run(db: &Database, words: &[&str]) -> Reply {
        let line: Vec<Bytes> = words
            .iter()
            .map(|w| Bytes::copy_from_slice(w.as_bytes()))
            .collect();
        db.exec_normal(&line)
    }

    #[tokio::test]
    async fn del_and_exists() {
        let db = test_db();
        run(&db, &["SET", "a", "1"]);
        run(&db, &["SET", "b", "2"]);
        assert_eq!(run(&db, &["EXISTS", "a", "b", "c"]), Reply::Integer(2));
        assert_eq!(run(&db, &["DEL", "a", "c"]), Reply::Integer(1));
        assert_eq!(run(&db, &["EXISTS", "a"]), Reply::Integer(0));
    }

    #[tokio::test]
    async fn type_reports_the_variant() {
        let db = test_db();
        run(&db, &["SET", "s", "x"]);
        run(&db, &["LPUSH", "l", "x"]);
        run(&db, &["SADD", "st", "x"]);
        assert_eq!(run(&db, &["TYPE", "s"]), Reply::Status("string".into()));
        assert_eq!(run(&db, &["TYPE", "l"]), Reply::Status("list".into()));
        assert_eq!(run(&db, &["TYPE", "st"]), Reply::Status("set".into()));
        assert_eq!(run(&db, &["TYPE", "none"]), Reply::Status("none".into()));
    }

    #[tokio::test]
    async fn rename_moves_value_and_ttl() {
        let db = test_db();
        run(&db, &["SET", "a", "1"]);
        run(&db, &["EXPIRE", "a", "60"]);
        assert_eq!(run(&db, &["RENAME", "a", "b"]), Reply::ok());
        assert_eq!(run(&db, &["GET", "a"]), Reply::NullBulk);
        assert_eq!(run(&db, &["GET", "b"]), Reply::Bulk(Bytes::from("1")));
        assert!(db.expire_time("b").is_some());
        assert_eq!(
            run(&db, &["RENAME", "ghost", "x"]),
            Reply::err("ERR no such key")
        );
    }

    #[tokio::test]
    async fn renamenx_requires_a_free_target() {
        let db = test_db();
        run(&db, &["SET", "a", "1"]);
        run(&db, &["SET", "b", "2"]);
        assert_eq!(run(&db, &["RENAMENX", "a", "b"]), Reply::Integer(0));
        assert_eq!(run(&db, &["RENAMENX", "a", "c"]), Reply::Integer(1));
        assert_eq!(run(&db, &["GET", "c"]), Reply::Bulk(Bytes::from("1")));
    }

    #[tokio::test]
    async fn keys_filters_by_pattern() {
        let db = test_db();
        run(&db, &["MSET", "user:1", "a", "user:2", "b", "other", "c"]);
        let reply = run(&db, &["KEYS", "user:*"]);
        match reply {
            Reply::MultiBulk(mut keys) => {
                keys.sort();
                assert_eq!(keys, vec![Bytes::from("user:1"), Bytes::from("user:2")]);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn randomkey_comes_from_the_keyspace() {
        let db = test_db();
        assert_eq!(run(&db, &["RANDOMKEY"]), Reply::NullBulk);
        run(&db, &["SET", "only", "1"]);
        assert_eq!(run(&db, &["RANDOMKEY"]), Reply::Bulk(Bytes::from("only")));
    }

    #[tokio::test]
    async fn ttl_pttl_persist() {
        let db = test_db();
        assert_eq!(run(&db, &["TTL", "a"]), Reply::Integer(-2));
        run(&db, &["SET", "a", "1"]);
        assert_eq!(run(&db, &["TTL", "a"]), Reply::Integer(-1));
        assert_eq!(run(&db, &["EXPIRE", "a", "100"]), Reply::Integer(1));
        match run(&db, &["TTL", "a"]) {
            Reply::Integer(left) => assert!((1..=100).contains(&left)),
            other => panic!("unexpected reply {other:?}"),
        }
        match run(&db, &["PTTL", "a"]) {
            Reply::Integer(left) => assert!(left > 90_000 && left <= 100_000),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(run(&db, &["PERSIST", "a"]), Reply::Integer(1));
        assert_eq!(run(&db, &["PERSIST", "a"]), Reply::Integer(0));
        assert_eq!(run(&db, &["TTL", "a"]), Reply::Integer(-1));
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_zero() {
        let db = test_db();
        assert_eq!(run(&db, &["EXPIRE", "ghost", "10"]), Reply::Integer(0));
    }

    #[tokio::test]
    async fn pexpireat_in_the_past_expires_immediately() {
        let db = test_db();
        run(&db, &["SET", "a", "1"]);
        assert_eq!(run(&db, &["PEXPIREAT", "a", "1"]), Reply::Integer(1));
        assert_eq!(run(&db, &["GET", "a"]), Reply::NullBulk);
        assert_eq!(run(&db, &["TTL", "a"]), Reply::Integer(-2));
    }
}
