//! Stop-the-world gate.
//!
//! Bulk operations (FLUSHDB) raise the gate; keyspace readers and writers
//! call [`PauseGate::wait`] at entry and block only while the gate is raised.
//! The gate does not exclude operations already past the entry check; it is a
//! barrier, not a lock.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct PauseGate {
    raised: Mutex<usize>,
    cond: Condvar,
}

/// Lowers the gate when dropped.
pub struct PauseGuard<'a> {
    gate: &'a PauseGate,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block while the gate is raised; return immediately otherwise.
    pub fn wait(&self) {
        let mut raised = self.raised.lock();
        while *raised > 0 {
            self.cond.wait(&mut raised);
        }
    }

    /// Raise the gate. Nested raises stack; the gate lowers when the last
    /// guard drops.
    pub fn pause(&self) -> PauseGuard<'_> {
        *self.raised.lock() += 1;
        PauseGuard { gate: self }
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        let mut raised = self.gate.raised.lock();
        *raised -= 1;
        if *raised == 0 {
            self.gate.cond.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_passes_when_lowered() {
        let gate = PauseGate::new();
        gate.wait();
        let guard = gate.pause();
        drop(guard);
        gate.wait();
    }

    #[test]
    fn wait_blocks_while_raised() {
        let gate = Arc::new(PauseGate::new());
        let passed = Arc::new(AtomicBool::new(false));

        let guard = gate.pause();
        let waiter = {
            let gate = gate.clone();
            let passed = passed.clone();
            thread::spawn(move || {
                gate.wait();
                passed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!passed.load(Ordering::SeqCst));

        drop(guard);
        waiter.join().unwrap();
        assert!(passed.load(Ordering::SeqCst));
    }

    #[test]
    fn nested_raises_stack() {
        let gate = Arc::new(PauseGate::new());
        let g1 = gate.pause();
        let g2 = gate.pause();
        drop(g1);

        let gate2 = gate.clone();
        let t = thread::spawn(move || gate2.wait());
        thread::sleep(Duration::from_millis(20));
        assert!(!t.is_finished());

        drop(g2);
        t.join().unwrap();
    }
}
