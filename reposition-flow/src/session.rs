use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use crate::engine::WorkflowState;
use crate::error::{FlowError, Result};
use crate::model::AnalysisResult;

/// Completed results kept for the history view before old entries are
/// dropped.
const DEFAULT_HISTORY_CAP: usize = 50;

pub type ObserverId = u64;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// One staged, ordered update describing how far a session has advanced.
///
/// Events are immutable once emitted and retained in the session log so
/// late subscribers can replay history. Percent is monotonically
/// non-decreasing within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: u8,
    pub percent: u8,
    pub message: String,
    pub state: WorkflowState,
}

impl ProgressEvent {
    pub fn new(stage: u8, percent: u8, message: impl Into<String>, state: WorkflowState) -> Self {
        Self {
            stage,
            percent,
            message: message.into(),
            state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Error kind and message recorded when a session fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: String,
    pub message: String,
}

/// Non-blocking answer to "where is this analysis now?".
#[derive(Debug, Clone)]
pub enum AnalysisStatus {
    Pending { state: WorkflowState },
    Completed(AnalysisResult),
    Failed(FailureDetail),
}

struct Observer {
    id: ObserverId,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

struct SessionInner {
    state: WorkflowState,
    events: Vec<ProgressEvent>,
    result: Option<AnalysisResult>,
    error: Option<FailureDetail>,
    observers: Vec<Observer>,
    next_observer_id: ObserverId,
}

/// One in-flight or completed analysis: lifecycle state, append-only event
/// log, optional terminal artifact and the set of subscribed observers.
///
/// The owning workflow task is the only writer; observers read through
/// their own delivery queues, so a plain mutex around the inner state is
/// enough.
pub struct Session {
    pub id: String,
    pub user_input: String,
    pub created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
    cancel_tx: watch::Sender<bool>,
}

impl Session {
    fn new(user_input: &str) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4().to_string(),
            user_input: user_input.to_string(),
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                state: WorkflowState::Init,
                events: Vec::new(),
                result: None,
                error: None,
                observers: Vec::new(),
                next_observer_id: 0,
            }),
            cancel_tx,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.lock().unwrap().state
    }

    /// Snapshot of the event log, in emission order.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub(crate) fn last_percent(&self) -> u8 {
        self.inner
            .lock()
            .unwrap()
            .events
            .last()
            .map(|e| e.percent)
            .unwrap_or(0)
    }

    pub(crate) fn current_stage(&self) -> u8 {
        self.inner
            .lock()
            .unwrap()
            .events
            .last()
            .map(|e| e.stage)
            .unwrap_or(1)
    }

    /// Append an event to the log and fan it out to every live observer.
    /// A terminal event also closes all delivery queues, ending each
    /// observer's stream once the queue is drained.
    pub(crate) fn emit(&self, event: ProgressEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = event.state;
        inner.events.push(event.clone());
        inner.observers.retain(|obs| obs.tx.send(event.clone()).is_ok());
        if event.is_terminal() {
            inner.observers.clear();
        }
    }

    pub(crate) fn set_result(&self, result: AnalysisResult) {
        self.inner.lock().unwrap().result = Some(result);
    }

    pub(crate) fn set_error(&self, detail: FailureDetail) {
        self.inner.lock().unwrap().error = Some(detail);
    }

    /// Register an observer. The full existing event log is replayed into
    /// the returned queue before any live event, so late subscribers see
    /// every event exactly once, in emission order. For sessions already in
    /// a terminal state the queue holds the replay and then ends.
    pub fn subscribe(&self) -> (ObserverId, ProgressReceiver) {
        let mut inner = self.inner.lock().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        for event in &inner.events {
            // Receiver is in hand, the channel cannot be closed yet.
            let _ = tx.send(event.clone());
        }

        let id = inner.next_observer_id;
        inner.next_observer_id += 1;
        if !inner.state.is_terminal() {
            inner.observers.push(Observer { id, tx });
        }
        (id, rx)
    }

    pub fn unsubscribe(&self, observer_id: ObserverId) {
        let mut inner = self.inner.lock().unwrap();
        inner.observers.retain(|obs| obs.id != observer_id);
    }

    pub fn status(&self) -> AnalysisStatus {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            WorkflowState::Completed => match &inner.result {
                Some(result) => AnalysisStatus::Completed(result.clone()),
                // Result is set before the terminal event is emitted; this
                // arm only guards against misuse.
                None => AnalysisStatus::Pending {
                    state: inner.state,
                },
            },
            WorkflowState::Failed => AnalysisStatus::Failed(
                inner
                    .error
                    .clone()
                    .unwrap_or_else(|| FailureDetail {
                        kind: "unknown".to_string(),
                        message: "session failed without detail".to_string(),
                    }),
            ),
            state => AnalysisStatus::Pending { state },
        }
    }

    /// Request cancellation. The workflow task observes the signal at its
    /// next suspension point and transitions the session to `Failed` with
    /// reason `cancelled`; an in-flight reasoning call may still complete
    /// and its result is discarded.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub(crate) fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

/// Creates, looks up and retires analysis sessions, and keeps the bounded
/// history of completed results.
///
/// Sessions are evicted only by explicit [`SessionRegistry::evict`] or
/// process shutdown; the completed-history ring is the only automatic
/// bound.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    completed: Mutex<VecDeque<AnalysisResult>>,
    history_cap: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_HISTORY_CAP)
    }

    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            completed: Mutex::new(VecDeque::new()),
            history_cap,
        }
    }

    pub fn create_session(&self, user_input: &str) -> Arc<Session> {
        let session = Arc::new(Session::new(user_input));
        debug!(session_id = %session.id, "session created");
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    pub fn subscribe(&self, session_id: &str) -> Result<(ObserverId, ProgressReceiver)> {
        Ok(self.get(session_id)?.subscribe())
    }

    pub fn unsubscribe(&self, session_id: &str, observer_id: ObserverId) -> Result<()> {
        self.get(session_id)?.unsubscribe(observer_id);
        Ok(())
    }

    pub fn get_result(&self, session_id: &str) -> Result<AnalysisStatus> {
        Ok(self.get(session_id)?.status())
    }

    pub fn cancel(&self, session_id: &str) -> Result<()> {
        self.get(session_id)?.cancel();
        Ok(())
    }

    /// Remove a session entirely. Operator action; running sessions should
    /// be cancelled first.
    pub fn evict(&self, session_id: &str) -> Result<()> {
        self.sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    /// Number of live (non-evicted) sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Record a completed result in the history ring.
    pub(crate) fn record_completed(&self, result: AnalysisResult) {
        let mut completed = self.completed.lock().unwrap();
        completed.push_back(result);
        while completed.len() > self.history_cap {
            completed.pop_front();
        }
    }

    /// Completed results, ordered by completion time (oldest first).
    pub fn list_completed(&self) -> Vec<AnalysisResult> {
        self.completed.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
