//! Optimistic transactions: WATCH / MULTI / EXEC / DISCARD.
//!
//! WATCH records the version of each named key. MULTI switches the
//! connection to queueing mode. EXEC unions the key sets of every queued
//! command, takes one globally ordered lock region over the whole batch,
//! validates the watched versions inside it, and only then executes. A
//! queued command that fails triggers reverse replay of the undo logs
//! captured before each command ran.

use super::{arg_to_string, cmd_name, validate_arity, CmdLine, CommandTable, Database};
use crate::client::ClientState;
use crate::command::read_all_keys;
use bytes::Bytes;
use gedis_core::resp::Reply;
use std::collections::HashMap;

const FORBIDDEN_IN_MULTI: &[&str] = &["flushdb", "flushall"];

pub fn watch(db: &Database, client: &mut ClientState, keys: &[Bytes]) -> Reply {
    for key in keys {
        let key = arg_to_string(key);
        let version = db.get_version(&key);
        client.watching_mut().insert(key, version);
    }
    Reply::ok()
}

fn is_watching_changed(db: &Database, watching: &HashMap<String, u32>) -> bool {
    watching
        .iter()
        .any(|(key, version)| db.get_version(key) != *version)
}

pub fn start_multi(client: &mut ClientState) -> Reply {
    if client.in_multi_state() {
        return Reply::err("ERR MULTI calls can not be nested");
    }
    client.set_multi_state(true);
    Reply::ok()
}

pub fn discard_multi(client: &mut ClientState) -> Reply {
    if !client.in_multi_state() {
        return Reply::err("ERR DISCARD without MULTI");
    }
    client.set_multi_state(false);
    Reply::ok()
}

/// Queue one command line. Unknown commands, commands forbidden in MULTI,
/// commands without a `prepare`, and wrong arities are refused here rather
/// than at EXEC.
pub fn enqueue_cmd(db: &Database, client: &mut ClientState, cmdline: &[Bytes]) -> Reply {
    let name = cmd_name(cmdline);
    let Some(cmd) = db.table().get(&name) else {
        return Reply::unknown_command_err(&name);
    };
    if FORBIDDEN_IN_MULTI.contains(&name.as_str()) || cmd.prepare.is_none() {
        return Reply::err(format!("ERR command '{name}' cannot be used in MULTI"));
    }
    if !validate_arity(cmd.arity, cmdline) {
        return Reply::arg_num_err(&name);
    }
    client.enqueue_cmd(cmdline.to_vec());
    Reply::queued()
}

pub fn exec_multi(db: &Database, client: &mut ClientState) -> Reply {
    if !client.in_multi_state() {
        return Reply::err("ERR EXEC without MULTI");
    }
    let watching = client.watching().clone();
    let cmd_lines = client.queued_cmd_lines().to_vec();
    let reply = db.exec_batch(&watching, &cmd_lines);
    client.set_multi_state(false);
    reply
}

impl Database {
    /// Run a validated batch atomically.
    ///
    /// 1. Union write and read key sets across the batch via each command's
    ///    `prepare`; watched keys join the read set so validation happens
    ///    under the locks.
    /// 2. Acquire the whole region in one ordered pass. No per-command
    ///    locking happens inside.
    /// 3. A changed watched version aborts with the empty multi-bulk.
    /// 4. Otherwise execute in order, capturing each command's undo logs
    ///    before it runs. The first error reply stops the batch and replays
    ///    the undo queue in reverse.
    pub fn exec_batch(&self, watching: &HashMap<String, u32>, cmd_lines: &[CmdLine]) -> Reply {
        let mut write_keys = Vec::new();
        let mut read_keys = Vec::new();
        for line in cmd_lines {
            let name = cmd_name(line);
            if let Some(prepare) = self.table().get(&name).and_then(|cmd| cmd.prepare) {
                let (write, read) = prepare(&line[1..]);
                write_keys.extend(write);
                read_keys.extend(read);
            }
        }
        read_keys.extend(watching.keys().cloned());

        let locker = self.locker();
        let _guard = locker.rw_locks(&write_keys, &read_keys);

        if is_watching_changed(self, watching) {
            return Reply::EmptyMultiBulk;
        }

        let mut results = Vec::with_capacity(cmd_lines.len());
        let mut undo_queue: Vec<Vec<CmdLine>> = Vec::with_capacity(cmd_lines.len());
        let mut aborted = false;
        for line in cmd_lines {
            // capture before executing: replayed in reverse, these restore
            // the state each command saw
            undo_queue.push(self.undo_logs(line));
            let result = self.exec_with_lock(line);
            if result.is_error() {
                aborted = true;
                break;
            }
            results.push(result);
        }

        if !aborted {
            self.add_version(write_keys.iter().map(String::as_str));
            return Reply::MultiRaw(results);
        }

        for undo_logs in undo_queue.iter().rev() {
            for line in undo_logs {
                self.exec_with_lock(line);
            }
        }
        Reply::err("EXECABORT Transaction discarded because of previous errors.")
    }
}

fn exec_get_version(db: &Database, args: &[Bytes]) -> Reply {
    let key = arg_to_string(&args[0]);
    Reply::Integer(i64::from(db.get_version(&key)))
}

pub(crate) fn register(table: &mut CommandTable) {
    table.register("getver", exec_get_version, Some(read_all_keys), None, 2);
}
