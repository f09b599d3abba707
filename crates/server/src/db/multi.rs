//! The multi-database façade: routing, authentication, SELECT/FLUSHALL and
//! the panic boundary that keeps one misbehaving command from taking the
//! server down.

use super::{arg_to_string, cmd_name, CommandTable, Database};
use crate::client::ClientState;
use crate::config::ServerProperties;
use bytes::Bytes;
use gedis_core::resp::Reply;
use gedis_core::timewheel::TimeWheel;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

pub struct MultiDb {
    dbs: Vec<Arc<Database>>,
    require_pass: String,
    /// Shared by every database; kept here so the worker outlives them all.
    #[allow(dead_code)]
    wheel: Arc<TimeWheel>,
}

impl MultiDb {
    pub fn new(props: &ServerProperties) -> Self {
        Self::with_table(props, CommandTable::standard())
    }

    pub(crate) fn with_table(props: &ServerProperties, table: CommandTable) -> Self {
        let table = Arc::new(table);
        let wheel = TimeWheel::spawn_default();
        let databases = if props.databases == 0 {
            16
        } else {
            props.databases
        };
        let dbs = (0..databases)
            .map(|index| Database::new(index, wheel.clone(), table.clone()))
            .collect();
        Self {
            dbs,
            require_pass: props.requirepass.clone(),
            wheel,
        }
    }

    pub fn database_count(&self) -> usize {
        self.dbs.len()
    }

    /// Execute one request line for a connection. Panics anywhere below are
    /// contained here and surface as the generic unknown-error reply; the
    /// databases stay usable.
    pub fn exec(&self, client: &mut ClientState, cmdline: &[Bytes]) -> Reply {
        match catch_unwind(AssertUnwindSafe(|| self.exec_inner(client, cmdline))) {
            Ok(reply) => reply,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "command execution panicked");
                Reply::unknown_err()
            }
        }
    }

    fn exec_inner(&self, client: &mut ClientState, cmdline: &[Bytes]) -> Reply {
        if cmdline.is_empty() {
            return Reply::err("ERR empty command");
        }
        let name = cmd_name(cmdline);

        if name == "auth" {
            return self.auth(client, cmdline);
        }
        // client handshake stub
        if name == "command" {
            return Reply::ok();
        }
        if !self.is_authenticated(client) {
            return Reply::err("NOAUTH Authentication required");
        }

        match name.as_str() {
            "flushall" => {
                if client.in_multi_state() {
                    return Reply::err("ERR command 'flushall' cannot be used in MULTI");
                }
                self.flush_all()
            }
            "select" => self.exec_select(client, cmdline),
            _ => match self.dbs.get(client.db_index()) {
                Some(db) => db.exec(client, cmdline),
                None => Reply::err("ERR DB index is out of range"),
            },
        }
    }

    fn is_authenticated(&self, client: &ClientState) -> bool {
        self.require_pass.is_empty() || client.password() == self.require_pass
    }

    fn auth(&self, client: &mut ClientState, cmdline: &[Bytes]) -> Reply {
        if cmdline.len() != 2 {
            return Reply::arg_num_err("auth");
        }
        if self.require_pass.is_empty() {
            return Reply::err("ERR Client sent AUTH, but no password is set");
        }
        let given = arg_to_string(&cmdline[1]);
        if given != self.require_pass {
            return Reply::err("ERR invalid password");
        }
        client.set_password(given);
        Reply::ok()
    }

    fn flush_all(&self) -> Reply {
        for db in &self.dbs {
            db.flush();
        }
        Reply::ok()
    }

    fn exec_select(&self, client: &mut ClientState, cmdline: &[Bytes]) -> Reply {
        if client.in_multi_state() {
            return Reply::err("cannot select database within multi");
        }
        if cmdline.len() != 2 {
            return Reply::arg_num_err("select");
        }
        let Ok(index) = arg_to_string(&cmdline[1]).parse::<usize>() else {
            return Reply::err("ERR invalid DB index");
        };
        if index >= self.dbs.len() {
            return Reply::err("ERR DB index is out of range");
        }
        client.select_db(index);
        Reply::ok()
    }
}
