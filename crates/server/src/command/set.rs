//! Set commands, backed by the core [`Set`] datastruct.

use super::{read_first_key, rollback_first_key, write_first_key};
use crate::db::{arg_to_string, CommandTable, Database, DataEntity};
use bytes::Bytes;
use gedis_core::resp::Reply;
use gedis_core::set::Set;

fn set_value(db: &Database, key: &str) -> Result<Option<Set>, Reply> {
    match db.get_entity(key) {
        None => Ok(None),
        Some(DataEntity::Set(members)) => Ok(Some(members)),
        Some(_) => Err(Reply::wrong_type_err()),
    }
}

fn exec_sadd(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let members = match set_value(db, &key) {
        Err(reply) => return reply,
        Ok(members) => members.unwrap_or_default(),
    };
    let mut added = 0;
    for member in &args[1..] {
        added += i64::from(members.add(&arg_to_string(member)));
    }
    db.put_entity(&key, DataEntity::Set(members));
    Reply::Integer(added)
}

fn exec_srem(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    let members = match set_value(db, &key) {
        Err(reply) => return reply,
        Ok(None) => return Reply::Integer(0),
        Ok(Some(members)) => members,
    };
    let mut removed = 0;
    for member in &args[1..] {
        removed += i64::from(members.remove(&arg_to_string(member)));
    }
    if members.is_empty() {
        db.remove(&key);
    } else {
        db.put_entity(&key, DataEntity::Set(members));
    }
    Reply::Integer(removed)
}

fn exec_smembers(db: &Database, args: &[Bytes]) -> Reply {
    match set_value(db, &arg_to_string(&args[0])) {
        Err(reply) => reply,
        Ok(None) => Reply::EmptyMultiBulk,
        Ok(Some(members)) => {
            Reply::MultiBulk(members.members().into_iter().map(Bytes::from).collect())
        }
    }
}

fn exec_sismember(db: &Database, args: &[Bytes]) -> Reply {
    match set_value(db, &arg_to_string(&args[0])) {
        Err(reply) => reply,
        Ok(None) => Reply::Integer(0),
        Ok(Some(members)) => {
            Reply::Integer(i64::from(members.contains(&arg_to_string(&args[1]))))
        }
    }
}

fn exec_scard(db: &Database, args: &[Bytes]) -> Reply {
    match set_value(db, &arg_to_string(&args[0])) {
        Err(reply) => reply,
        Ok(None) => Reply::Integer(0),
        Ok(Some(members)) => Reply::Integer(members.len() as i64),
    }
}

pub(crate) fn register(table: &mut CommandTable) {
    table.register("sadd", exec_sadd, Some(write_first_key), Some(rollback_first_key), -3);
    table.register("srem", exec_srem, Some(write_first_key), Some(rollback_first_key), -3);
    table.register("smembers", exec_smembers, Some(read_first_key), None, 2);
    table.register("sismember", exec_sismember, Some(read_first_key), None, 3);
    table.register("scard", exec_scard, Some(read_first_key), None, 2);
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
    async fn add_members_and_cardinality() {
        let db = test_db();
        assert_eq!(run(&db, &["SADD", "s", "a", "b", "a"]), Reply::Integer(2));
        assert_eq!(run(&db, &["SADD", "s", "b", "c"]), Reply::Integer(1));
        assert_eq!(run(&db, &["SCARD", "s"]), Reply::Integer(3));
        assert_eq!(run(&db, &["SISMEMBER", "s", "a"]), Reply::Integer(1));
        assert_eq!(run(&db, &["SISMEMBER", "s", "zz"]), Reply::Integer(0));
        match run(&db, &["SMEMBERS", "s"]) {
            Reply::MultiBulk(mut members) => {
                members.sort();
                assert_eq!(
                    members,
                    vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]
                );
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn srem_deletes_the_emptied_key() {
        let db = test_db();
        run(&db, &["SADD", "s", "a", "b"]);
        assert_eq!(run(&db, &["SREM", "s", "a", "zz"]), Reply::Integer(1));
        assert_eq!(run(&db, &["SREM", "s", "b"]), Reply::Integer(1));
        assert_eq!(run(&db, &["EXISTS", "s"]), Reply::Integer(0));
        assert_eq!(run(&db, &["SREM", "s", "x"]), Reply::Integer(0));
    }

    #[tokio::test]
    async fn wrong_type_is_rejected() {
        let db = test_db();
        run(&db, &["SET", "k", "v"]);
        assert_eq!(run(&db, &["SADD", "k", "a"]), Reply::wrong_type_err());
        assert_eq!(run(&db, &["SMEMBERS", "k"]), Reply::wrong_type_err());
    }
}
