//! The run-scoped shared result store.
//!
//! `signals` is write-once per task id and `log` is append-only. Every
//! mutation and every read goes through one mutex, so a snapshot is always
//! a consistent copy and never observes a write in progress.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;

use nodes::{LogEntry, RunContext, Snapshot};

use crate::StateError;

#[derive(Debug, Default)]
struct StateInner {
    signals: BTreeMap<String, Value>,
    log: Vec<LogEntry>,
}

impl StateInner {
    fn push_log(&mut self, task_id: &str, record: Value) {
        let seq = self.log.len() as u64;
        self.log.push(LogEntry {
            seq,
            task_id: task_id.to_owned(),
            record,
            recorded_at: Utc::now(),
        });
    }
}

#[derive(Debug)]
pub struct SharedState {
    context: Arc<RunContext>,
    inner: Mutex<StateInner>,
}

impl SharedState {
    /// Create an empty store around the run's immutable context.
    pub fn new(context: RunContext) -> Self {
        Self {
            context: Arc::new(context),
            inner: Mutex::new(StateInner::default()),
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    /// Store `record` as the signal for `task_id` and log it.
    ///
    /// # Errors
    /// [`StateError::DuplicateKey`] if `task_id` already has a signal; the
    /// existing record is left untouched.
    pub fn write(&self, task_id: &str, record: Value) -> Result<(), StateError> {
        let mut inner = self.lock();

        if inner.signals.contains_key(task_id) {
            return Err(StateError::DuplicateKey(task_id.to_owned()));
        }

        inner.signals.insert(task_id.to_owned(), record.clone());
        inner.push_log(task_id, record);
        Ok(())
    }

    /// Add an audit entry without touching `signals`.
    pub fn append(&self, task_id: &str, record: Value) {
        self.lock().push_log(task_id, record);
    }

    /// Consistent copy of every signal and log entry.
    pub fn read_all(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            signals: inner.signals.clone(),
            log: inner.log.clone(),
        }
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().signals.contains_key(task_id)
    }

    /// Every mutation is a single insert or push, so a poisoned lock still
    /// guards consistent data.
    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> SharedState {
        SharedState::new(RunContext::new(json!({ "location": "here" })))
    }

    #[test]
    fn write_is_once_per_key() {
        let state = state();
        state.write("wind", json!({ "knots": 10 })).unwrap();

        let err = state.write("wind", json!({ "knots": 30 })).unwrap_err();
        assert_eq!(err, StateError::DuplicateKey("wind".into()));

        let snapshot = state.read_all();
        assert_eq!(snapshot.signals["wind"], json!({ "knots": 10 }));
        assert_eq!(snapshot.log.len(), 1);
    }

    #[test]
    fn append_logs_without_creating_a_signal() {
        let state = state();
        state.append("weather", json!({ "note": "retrying" }));
        state.write("weather", json!({ "rain": "none" })).unwrap();

        let snapshot = state.read_all();
        assert_eq!(snapshot.signals.len(), 1);
        let seqs: Vec<_> = snapshot.log.iter().map(|e| (e.seq, e.task_id.as_str())).collect();
        assert_eq!(seqs, vec![(0, "weather"), (1, "weather")]);
    }

    #[test]
    fn snapshots_are_detached_copies() {
        let state = state();
        let before = state.read_all();
        state.write("a", json!(1)).unwrap();

        assert!(before.is_empty());
        assert!(state.contains("a"));
        assert_eq!(state.context().input["location"], "here");
    }

    #[test]
    fn concurrent_writers_to_one_key_yield_exactly_one_winner() {
        let state = Arc::new(state());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.write("current", json!(i)).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(state.read_all().log.len(), 1);
    }
}
