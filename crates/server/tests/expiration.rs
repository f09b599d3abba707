//! Expiration behavior: lazy removal on read, wheel-driven removal, and the
//! races PERSIST and re-EXPIRE create with an already-scheduled callback.

use bytes::Bytes;
use gedis_core::resp::Reply;
use gedis_server::client::ClientState;
use gedis_server::config::ServerProperties;
use gedis_server::db::MultiDb;
use std::time::Duration;

fn line(words: &[&str]) -> Vec<Bytes> {
    words
        .iter()
        .map(|w| Bytes::copy_from_slice(w.as_bytes()))
        .collect()
}

fn server() -> MultiDb {
    MultiDb::new(&ServerProperties::default())
}

fn run(mdb: &MultiDb, client: &mut ClientState, words: &[&str]) -> Reply {
    mdb.exec(client, &line(words))
}

#[tokio::test]
async fn expired_key_reads_as_absent() {
    let mdb = server();
    let mut client = ClientState::new();

    run(&mdb, &mut client, &["SET", "a", "v"]);
    assert_eq!(run(&mdb, &mut client, &["PEXPIRE", "a", "50"]), Reply::Integer(1));

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(run(&mdb, &mut client, &["GET", "a"]), Reply::NullBulk);
    assert_eq!(
        &run(&mdb, &mut client, &["GET", "a"]).to_bytes()[..],
        b"$-1\r\n"
    );
    // lazy removal cleared the TTL index too
    assert_eq!(run(&mdb, &mut client, &["TTL", "a"]), Reply::Integer(-2));
}

#[tokio::test]
async fn wheel_removes_without_a_read() {
    let mdb = server();
    let mut client = ClientState::new();

    run(&mdb, &mut client, &["SET", "a", "v"]);
    run(&mdb, &mut client, &["PEXPIRE", "a", "50"]);

    // wait past the wheel's tick interval without touching the key
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(run(&mdb, &mut client, &["KEYS", "*"]), Reply::MultiBulk(vec![]));
}

#[tokio::test]
async fn persist_wins_the_race_with_the_callback() {
    let mdb = server();
    let mut client = ClientState::new();

    run(&mdb, &mut client, &["SET", "a", "v"]);
    run(&mdb, &mut client, &["PEXPIRE", "a", "100"]);
    assert_eq!(run(&mdb, &mut client, &["PERSIST", "a"]), Reply::Integer(1));

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(
        run(&mdb, &mut client, &["GET", "a"]),
        Reply::Bulk(Bytes::from("v"))
    );
    assert_eq!(run(&mdb, &mut client, &["TTL", "a"]), Reply::Integer(-1));
}

#[tokio::test]
async fn extending_the_ttl_replaces_the_deadline() {
    let mdb = server();
    let mut client = ClientState::new();

    run(&mdb, &mut client, &["SET", "a", "v"]);
    run(&mdb, &mut client, &["PEXPIRE", "a", "100"]);
    run(&mdb, &mut client, &["PEXPIRE", "a", "60000"]);

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(
        run(&mdb, &mut client, &["GET", "a"]),
        Reply::Bulk(Bytes::from("v"))
    );
    match run(&mdb, &mut client, &["TTL", "a"]) {
        Reply::Integer(left) => assert!(left > 0 && left <= 60),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn overwriting_clears_the_ttl() {
    let mdb = server();
    let mut client = ClientState::new();

    run(&mdb, &mut client, &["SET", "a", "v", "PX", "100"]);
    run(&mdb, &mut client, &["SET", "a", "w"]);

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(
        run(&mdb, &mut client, &["GET", "a"]),
        Reply::Bulk(Bytes::from("w"))
    );
}

#[tokio::test]
async fn flushdb_drops_pending_expirations_with_the_data() {
    let mdb = server();
    let mut client = ClientState::new();

    run(&mdb, &mut client, &["SET", "a", "v"]);
    run(&mdb, &mut client, &["PEXPIRE", "a", "60000"]);
    assert_eq!(run(&mdb, &mut client, &["FLUSHDB"]), Reply::ok());

    assert_eq!(run(&mdb, &mut client, &["GET", "a"]), Reply::NullBulk);
    assert_eq!(run(&mdb, &mut client, &["TTL", "a"]), Reply::Integer(-2));

    // a fresh key under the same name starts clean
    run(&mdb, &mut client, &["SET", "a", "w"]);
    assert_eq!(run(&mdb, &mut client, &["TTL", "a"]), Reply::Integer(-1));
}
