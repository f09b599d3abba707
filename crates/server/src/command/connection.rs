//! Connection-level commands.

use super::no_prepare;
use crate::db::{CommandTable, Database};
use bytes::Bytes;
use gedis_core::resp::Reply;

fn exec_ping(_db: &Database, args: &[Bytes]) -> Reply {
    match args {
        [] => Reply::pong(),
        [message] => Reply::Bulk(message.clone()),
        _ => Reply::arg_num_err("ping"),
    }
}

fn exec_echo(_db: &Database, args: &[Bytes]) -> Reply {
    Reply::Bulk(args[0].clone())
}

pub(crate) fn register(table: &mut CommandTable) {
    table.register("ping", exec_ping, Some(no_prepare), None, -1);
    table.register("echo", exec_echo, Some(no_prepare), None, 2);
}
