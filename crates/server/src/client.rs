//! Per-connection protocol state, owned by the connection's task. The engine
//! mutates it only when invoked from that task, so no locking is involved.

use crate::db::CmdLine;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ClientState {
    password: String,
    selected_db: usize,
    multi_state: bool,
    queue: Vec<CmdLine>,
    watching: HashMap<String, u32>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_password(&mut self, password: String) {
        self.password = password;
    }

    pub fn db_index(&self) -> usize {
        self.selected_db
    }

    pub fn select_db(&mut self, index: usize) {
        self.selected_db = index;
    }

    pub fn in_multi_state(&self) -> bool {
        self.multi_state
    }

    /// Leaving multi state drops the queue and the watch set.
    pub fn set_multi_state(&mut self, state: bool) {
        if !state {
            self.queue.clear();
            self.watching.clear();
        }
        self.multi_state = state;
    }

    pub fn enqueue_cmd(&mut self, line: CmdLine) {
        self.queue.push(line);
    }

    pub fn queued_cmd_lines(&self) -> &[CmdLine] {
        &self.queue
    }

    pub fn watching(&self) -> &HashMap<String, u32> {
        &self.watching
    }

    pub fn watching_mut(&mut self) -> &mut HashMap<String, u32> {
        &mut self.watching
    }
}
