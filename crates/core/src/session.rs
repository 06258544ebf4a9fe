//! Debate Session Orchestration
//!
//! [`SessionRegistry`] drives a session's state machine from its persisted
//! position until it reaches the human suspend point or the judge's verdict,
//! relaying progress as a stream of [`DebateEvent`]s.
//!
//! Each `resume` runs on its own task and holds the session's lock for its
//! whole run, so turns of one session never overlap. Every turn is persisted
//! before its final message event is emitted. If the consumer drops the event
//! stream, the turn in flight still completes and is persisted; the run then
//! stops instead of starting another turn.

use crate::{
    agents::{DebateAgents, decode},
    error::{DebateError, Result},
    graph::{self, Node},
    partial_json::PartialJsonAccumulator,
    state::{DebateState, Side},
    store::SessionStore,
};
use futures::{Stream, StreamExt};
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex as StdMutex, PoisonError, Weak},
};
use tokio::{
    sync::{Mutex, OwnedMutexGuard, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

const EVENT_BUFFER: usize = 64;

/// Progress of a debate run, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum DebateEvent {
    /// A node started executing.
    NodeEntered(Node),
    /// The latest full value of the speaker's script. Previews arrive while
    /// the model is still answering (`is_final == false`); the final value is
    /// sent once the message has been persisted.
    Message {
        node: Node,
        content: String,
        is_final: bool,
    },
    /// The run stopped at the human node and waits for input.
    InputRequested,
    /// The judge has spoken; the debate is over.
    Concluded { winner: Option<Side> },
}

/// Events of one `resume` call. An `Err` item ends the run.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<DebateEvent>> + Send>>;

/// Owns every debate session of the process.
///
/// Constructed once at startup and shared by the request handlers.
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    agents: Arc<DebateAgents>,
    /// Turn locks of sessions in use. An entry dies with the last holder.
    locks: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
    runs: StdMutex<Vec<JoinHandle<()>>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, agents: DebateAgents) -> Self {
        Self {
            store,
            agents: Arc::new(agents),
            locks: StdMutex::new(HashMap::new()),
            runs: StdMutex::new(Vec::new()),
        }
    }

    /// Creates (or re-initializes) a session and returns its id.
    ///
    /// A fresh UUID is generated when `session_id` is absent or blank.
    pub async fn create(
        &self,
        topic: &str,
        user_side: Side,
        session_id: Option<String>,
    ) -> Result<String> {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let lock = self.lock_for(&session_id);
        let _guard = lock.lock().await;
        let state = DebateState::new(topic, user_side);
        self.store
            .save_state(&session_id, &state)
            .await
            .map_err(DebateError::Store)?;

        info!(%session_id, %user_side, topic, "Debate session created");
        Ok(session_id)
    }

    /// True iff state exists for `session_id` and carries a topic.
    pub async fn is_valid(&self, session_id: &str) -> Result<bool> {
        let state = self
            .store
            .load_state(session_id)
            .await
            .map_err(DebateError::Store)?;
        Ok(state.is_some_and(|s| s.has_topic()))
    }

    /// The persisted state of a valid session.
    pub async fn snapshot(&self, session_id: &str) -> Result<DebateState> {
        self.load_valid(session_id).await
    }

    /// Runs the debate from its persisted position.
    ///
    /// The returned stream ends after [`DebateEvent::InputRequested`],
    /// [`DebateEvent::Concluded`] or an error. Calling `resume` again on a
    /// suspended session re-enters the same suspend point. Fails with
    /// [`DebateError::SessionBusy`] while another run of the session is active.
    pub async fn resume(&self, session_id: &str) -> Result<EventStream> {
        let guard = self
            .lock_for(session_id)
            .try_lock_owned()
            .map_err(|_| DebateError::SessionBusy(session_id.to_string()))?;
        let state = self.load_valid(session_id).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let run = DebateRun {
            session_id: session_id.to_string(),
            store: self.store.clone(),
            agents: self.agents.clone(),
            accumulator: PartialJsonAccumulator::new(),
            tx,
            detached: false,
        };
        let span = tracing::info_span!("debate_run", %session_id);
        let handle = tokio::spawn(run.drive(state, guard).instrument(span));
        self.track(handle);

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Appends the human's turn and releases the suspend point.
    ///
    /// Waits for an active run of the session to finish first.
    pub async fn submit_human_input(&self, session_id: &str, text: &str) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut state = self.load_valid(session_id).await?;
        if graph::position(&state)? != Some(Node::Human) {
            return Err(DebateError::NotAwaitingInput(session_id.to_string()));
        }
        graph::apply_human(&mut state, text);
        self.store
            .save_state(session_id, &state)
            .await
            .map_err(DebateError::Store)?;

        info!(%session_id, "Human input recorded");
        Ok(())
    }

    /// Waits for every in-flight run so its current turn is persisted.
    pub async fn shutdown(&self) {
        let runs = std::mem::take(&mut *self.runs.lock().unwrap_or_else(PoisonError::into_inner));
        info!(in_flight = runs.len(), "Waiting for debate runs to finish");
        for run in runs {
            if let Err(e) = run.await {
                error!(error = ?e, "Debate run task failed");
            }
        }
    }

    async fn load_valid(&self, session_id: &str) -> Result<DebateState> {
        self.store
            .load_state(session_id)
            .await
            .map_err(DebateError::Store)?
            .filter(DebateState::has_topic)
            .ok_or_else(|| DebateError::InvalidSession(session_id.to_string()))
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(session_id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(session_id.to_string(), Arc::downgrade(&lock));
        lock
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.retain(|run| !run.is_finished());
        runs.push(handle);
    }
}

/// One `resume` in progress.
struct DebateRun {
    session_id: String,
    store: Arc<dyn SessionStore>,
    agents: Arc<DebateAgents>,
    accumulator: PartialJsonAccumulator,
    tx: mpsc::Sender<Result<DebateEvent>>,
    /// Set once the consumer has gone away.
    detached: bool,
}

impl DebateRun {
    async fn drive(mut self, mut state: DebateState, guard: OwnedMutexGuard<()>) {
        loop {
            let node = match graph::position(&state) {
                Ok(Some(node)) => node,
                Ok(None) => {
                    info!(winner = ?state.winner, "Debate concluded");
                    self.emit(Ok(DebateEvent::Concluded {
                        winner: state.winner,
                    }))
                    .await;
                    break;
                }
                Err(e) => {
                    self.emit(Err(e)).await;
                    break;
                }
            };

            self.emit(Ok(DebateEvent::NodeEntered(node))).await;
            if node == Node::Human {
                info!("Suspended awaiting human input");
                self.emit(Ok(DebateEvent::InputRequested)).await;
                break;
            }

            if let Err(e) = self.execute(node, &mut state).await {
                warn!(%node, error = %e, "Debate turn failed");
                self.emit(Err(e)).await;
                break;
            }

            if self.detached {
                info!("Event consumer disconnected; stopping after the persisted turn");
                break;
            }
        }
        // Release the session before the channel closes, so a consumer that
        // saw the stream end can resume immediately.
        drop(guard);
    }

    /// Runs one model-backed node: streams the answer, validates it, applies
    /// it to a copy of the state and persists that copy before announcing it.
    async fn execute(&mut self, node: Node, state: &mut DebateState) -> Result<()> {
        let step = state.messages.len() as u64;
        let mut deltas = self.agents.stream(node, state).await?;

        while let Some(delta) = deltas.next().await {
            let delta = delta.map_err(DebateError::Capability)?;
            let Some(fields) = self.accumulator.append(step, delta.fragment()) else {
                continue;
            };
            if let Some(script) = fields.script() {
                let preview = DebateEvent::Message {
                    node,
                    content: script.to_string(),
                    is_final: false,
                };
                self.emit(Ok(preview)).await;
            }
        }
        let raw = self.accumulator.finish(step);
        debug!(%node, step, bytes = raw.len(), "Model response complete");

        let mut next = state.clone();
        match node {
            Node::Moderator => {
                graph::apply_moderator(&mut next, decode(node, &raw)?)?;
            }
            Node::Debater => {
                graph::apply_debater(&mut next, decode(node, &raw)?);
            }
            Node::Judge => graph::apply_judge(&mut next, decode(node, &raw)?),
            Node::Human => {
                return Err(DebateError::ContractViolation(
                    "the human node is never executed by the model".to_string(),
                ));
            }
        }

        self.store
            .save_state(&self.session_id, &next)
            .await
            .map_err(DebateError::Store)?;
        *state = next;

        let content = state
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        info!(%node, next_speaker = ?state.next_speaker, "Turn persisted");
        self.emit(Ok(DebateEvent::Message {
            node,
            content,
            is_final: true,
        }))
        .await;
        Ok(())
    }

    async fn emit(&mut self, event: Result<DebateEvent>) {
        if self.detached {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
            self.detached = true;
        }
    }
}
