//! Bounds how many actors run at once.
//!
//! Actors wait in `queued` (FIFO) until a slot in `active` frees up. A session
//! spans from `start()` until every registered actor has completed or been
//! removed; `pre_session`/`post_session` bracket it.
//!
//! All state sits behind one mutex. Actor `start`/`close` and the session
//! hooks are always called after the lock is released, so an actor may
//! complete synchronously from inside its own `start`.

mod actor;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use actor::{Actor, Completion};

pub const DEFAULT_MAX_CONCURRENT: usize = 3;

pub type SessionHook = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("actor id already registered: {0}")]
    DuplicateId(String),
    #[error("unknown actor id: {0}")]
    UnknownId(String),
    #[error("actor is not active: {0}")]
    NotActive(String),
}

struct Entry {
    id: String,
    actor: Arc<dyn Actor>,
}

#[derive(Default)]
struct State {
    queued: VecDeque<Entry>,
    active: VecDeque<Entry>,
    session_running: bool,
}

impl State {
    fn contains(&self, id: &str) -> bool {
        self.queued.iter().chain(self.active.iter()).any(|e| e.id == id)
    }

    /// Ends the session if nothing is left. Returns true if it just ended.
    fn try_end_session(&mut self) -> bool {
        if self.session_running && self.queued.is_empty() && self.active.is_empty() {
            self.session_running = false;
            return true;
        }
        false
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    max_concurrent: usize,
    pre_session: Option<SessionHook>,
    post_session: Option<SessionHook>,
}

/// Handle to a coordinator. Clones share the same queue.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) shared: Arc<Shared>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Coordinator {
    pub fn new(max_concurrent: usize) -> Self {
        Self::builder().max_concurrent(max_concurrent).build()
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }

    /// Registers `actor` at the back of the queue.
    ///
    /// While a session is running the actor is admitted right away if a slot is free.
    pub fn add<A: Actor + 'static>(&self, id: impl Into<String>, actor: A) -> Result<(), CoordinatorError> {
        let id = id.into();
        {
            let mut st = self.state();
            if st.contains(&id) {
                tracing::warn!(id = %id, "actor id already registered; ignoring");
                return Err(CoordinatorError::DuplicateId(id));
            }
            st.queued.push_back(Entry {
                id,
                actor: Arc::new(actor),
            });
        }
        self.admit();
        Ok(())
    }

    /// Unregisters `id`, closing it first if it was running.
    pub fn remove(&self, id: &str) -> Result<(), CoordinatorError> {
        let closing = {
            let mut st = self.state();
            if let Some(pos) = st.active.iter().position(|e| e.id == id) {
                st.active.remove(pos)
            } else if let Some(pos) = st.queued.iter().position(|e| e.id == id) {
                st.queued.remove(pos);
                None
            } else {
                return Err(CoordinatorError::UnknownId(id.to_string()));
            }
        };
        if let Some(entry) = closing {
            entry.actor.close();
        }
        self.admit();
        self.end_session_if_drained();
        Ok(())
    }

    /// Begins a session (once) and fills every free slot from the queue.
    pub fn start(&self) {
        let begin = {
            let mut st = self.state();
            !std::mem::replace(&mut st.session_running, true)
        };
        if begin {
            tracing::debug!(max_concurrent = self.shared.max_concurrent, "session started");
            if let Some(hook) = &self.shared.pre_session {
                hook();
            }
        }
        self.admit();
        self.end_session_if_drained();
    }

    /// Marks `id` finished and admits the next queued actor.
    ///
    /// Actors normally report through their [`Completion`]; calling this for an
    /// id that is not active is a contract violation and is rejected.
    pub fn notify_complete(&self, id: &str) -> Result<(), CoordinatorError> {
        let res = self.complete(id);
        if let Err(e) = &res {
            tracing::warn!(id, error = %e, "notify_complete for an actor that is not active");
        }
        res
    }

    pub(crate) fn complete(&self, id: &str) -> Result<(), CoordinatorError> {
        {
            let mut st = self.state();
            let pos = st
                .active
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| CoordinatorError::NotActive(id.to_string()))?;
            st.active.remove(pos);
        }
        tracing::debug!(id, "actor completed");
        self.admit();
        self.end_session_if_drained();
        Ok(())
    }

    /// Closes every active actor and discards the queue. Idempotent.
    pub fn close(&self) {
        let (active, was_running) = {
            let mut st = self.state();
            st.queued.clear();
            let active: Vec<Entry> = st.active.drain(..).collect();
            (active, std::mem::replace(&mut st.session_running, false))
        };
        for entry in active {
            tracing::debug!(id = %entry.id, "closing active actor");
            entry.actor.close();
        }
        if was_running {
            self.run_post_session();
        }
    }

    pub fn has_active_queue(&self) -> bool {
        !self.state().queued.is_empty()
    }

    pub fn is_session_running(&self) -> bool {
        self.state().session_running
    }

    pub fn queued_ids(&self) -> Vec<String> {
        self.state().queued.iter().map(|e| e.id.clone()).collect()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.state().active.iter().map(|e| e.id.clone()).collect()
    }

    /// Greedy FIFO admission.
    fn admit(&self) {
        let admitted: Vec<(String, Arc<dyn Actor>)> = {
            let mut st = self.state();
            if !st.session_running {
                return;
            }
            let mut admitted = Vec::new();
            while st.active.len() < self.shared.max_concurrent {
                let Some(entry) = st.queued.pop_front() else {
                    break;
                };
                admitted.push((entry.id.clone(), entry.actor.clone()));
                st.active.push_back(entry);
            }
            admitted
        };

        for (id, actor) in admitted {
            tracing::debug!(id = %id, "admitting actor");
            let completion = Completion::new(id.clone(), Arc::downgrade(&self.shared));
            if let Err(e) = actor.start(completion) {
                tracing::warn!(id = %id, error = %e, "actor failed to start; releasing its slot");
                let _ = self.complete(&id);
            }
        }
    }

    fn end_session_if_drained(&self) {
        let ended = self.state().try_end_session();
        if ended {
            self.run_post_session();
        }
    }

    fn run_post_session(&self) {
        tracing::debug!("session finished");
        if let Some(hook) = &self.shared.post_session {
            hook();
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct CoordinatorBuilder {
    max_concurrent: usize,
    pre_session: Option<SessionHook>,
    post_session: Option<SessionHook>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            pre_session: None,
            post_session: None,
        }
    }
}

impl CoordinatorBuilder {
    /// Values below 1 are raised to 1.
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn pre_session(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.pre_session = Some(Box::new(f));
        self
    }

    pub fn post_session(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.post_session = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Coordinator {
        Coordinator {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                max_concurrent: self.max_concurrent,
                pre_session: self.pre_session,
                post_session: self.post_session,
            }),
        }
    }
}
