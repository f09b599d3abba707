//! Command registry: name → descriptor.
//!
//! Every command carries its executor, an optional `prepare` that derives the
//! (write, read) key sets from the argument list, an optional `undo` that
//! produces compensating command lines, and an arity. The table is built once
//! at startup and shared read-only by every database.

use crate::db::Database;
use bytes::Bytes;
use gedis_core::resp::Reply;
use std::collections::HashMap;

/// A request line: command name followed by its arguments, as raw bytes.
pub type CmdLine = Vec<Bytes>;

pub type ExecFn = fn(&Database, &[Bytes]) -> Reply;
/// Returns the (write keys, read keys) a command line will touch.
pub type PrepareFn = fn(&[Bytes]) -> (Vec<String>, Vec<String>);
/// Returns command lines that, replayed in order, restore the affected keys.
pub type UndoFn = fn(&Database, &[Bytes]) -> Vec<CmdLine>;

pub struct CommandSpec {
    pub exec: ExecFn,
    pub prepare: Option<PrepareFn>,
    pub undo: Option<UndoFn>,
    /// `arity >= 0` requires exactly that many words including the command
    /// name; negative requires at least `-arity`.
    pub arity: i32,
}

#[derive(Default)]
pub struct CommandTable {
    table: HashMap<String, CommandSpec>,
}

impl CommandTable {
    /// The full table every database dispatches against.
    pub fn standard() -> Self {
        let mut table = CommandTable::default();
        crate::command::connection::register(&mut table);
        crate::command::string::register(&mut table);
        crate::command::keys::register(&mut table);
        crate::command::list::register(&mut table);
        crate::command::set::register(&mut table);
        crate::db::transaction::register(&mut table);
        table
    }

    pub fn register(
        &mut self,
        name: &str,
        exec: ExecFn,
        prepare: Option<PrepareFn>,
        undo: Option<UndoFn>,
        arity: i32,
    ) {
        self.table.insert(
            name.to_lowercase(),
            CommandSpec {
                exec,
                prepare,
                undo,
                arity,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.table.get(name)
    }
}

pub fn validate_arity(arity: i32, cmdline: &[Bytes]) -> bool {
    let words = cmdline.len() as i32;
    if arity >= 0 {
        words == arity
    } else {
        words >= -arity
    }
}

/// Lowercased command name of a request line.
pub fn cmd_name(cmdline: &[Bytes]) -> String {
    String::from_utf8_lossy(&cmdline[0]).to_lowercase()
}

/// Arguments arrive as raw bytes; keys are treated as UTF-8 strings.
pub fn arg_to_string(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(words: &[&str]) -> CmdLine {
        words.iter().map(|w| Bytes::copy_from_slice(w.as_bytes())).collect()
    }

    #[test]
    fn arity_exact_and_at_least() {
        assert!(validate_arity(2, &line(&["get", "k"])));
        assert!(!validate_arity(2, &line(&["get"])));
        assert!(!validate_arity(2, &line(&["get", "k", "extra"])));
        assert!(validate_arity(-3, &line(&["set", "k", "v"])));
        assert!(validate_arity(-3, &line(&["set", "k", "v", "NX"])));
        assert!(!validate_arity(-3, &line(&["set", "k"])));
    }

    #[test]
    fn names_are_lowercased() {
        assert_eq!(cmd_name(&line(&["GeT", "k"])), "get");
    }

    #[test]
    fn standard_table_knows_the_core_surface() {
        let table = CommandTable::standard();
        for name in ["get", "set", "del", "expire", "lpush", "sadd", "ping", "getver"] {
            assert!(table.get(name).is_some(), "missing command {name}");
        }
        assert!(table.get("subscribe").is_none());
    }
}
