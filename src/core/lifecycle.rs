//! A small reusable start/stop controller.
//!
//! The machine holds a fixed transition table. Queries take a read lock and
//! may run from any thread; `transition` holds the write lock across the
//! table lookup and the state update, so two racing transitions can never
//! both succeed from the same state.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};
use crate::error::{MonitorError, Result};

type TransitionHook<S, E> = Arc<dyn Fn(S, E, S) + Send + Sync>;
type TerminalHook<S> = Arc<dyn Fn(S) + Send + Sync>;

pub struct StateMachine<S, E> {
    state: RwLock<S>,
    table: HashMap<(S, E), S>,
    terminal: HashSet<S>,
    on_transition: Mutex<Vec<TransitionHook<S, E>>>,
    on_terminal: Mutex<Vec<TerminalHook<S>>>,
}

impl<S, E> StateMachine<S, E>
where
    S: Copy + Eq + Hash + Debug,
    E: Copy + Eq + Hash + Debug,
{
    pub fn new<I>(initial: S, transitions: I) -> Self
    where
        I: IntoIterator<Item = (S, E, S)>,
    {
        Self {
            state: RwLock::new(initial),
            table: transitions
                .into_iter()
                .map(|(from, event, to)| ((from, event), to))
                .collect(),
            terminal: HashSet::new(),
            on_transition: Mutex::new(Vec::new()),
            on_terminal: Mutex::new(Vec::new()),
        }
    }

    /// Mark states whose arrival is reported to `on_terminal` subscribers.
    pub fn with_terminal_states<I>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        self.terminal.extend(states);
        self
    }

    pub fn state(&self) -> S {
        *self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is(&self, state: S) -> bool {
        self.state() == state
    }

    pub fn can_transition(&self, event: E) -> bool {
        self.table.contains_key(&(self.state(), event))
    }

    /// Apply `event`, returning the new state.
    pub fn transition(&self, event: E) -> Result<S> {
        let (from, to) = {
            let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            let from = *state;
            let to = *self.table.get(&(from, event)).ok_or_else(|| {
                MonitorError::IllegalState(format!("no transition for {:?} in state {:?}", event, from))
            })?;
            *state = to;
            (from, to)
        };

        tracing::debug!("Lifecycle {:?} -({:?})-> {:?}", from, event, to);
        self.notify(from, event, to);
        Ok(to)
    }

    /// Subscribe to every successful transition.
    pub fn on_transition<F>(&self, hook: F)
    where
        F: Fn(S, E, S) + Send + Sync + 'static,
    {
        lock(&self.on_transition).push(Arc::new(hook));
    }

    /// Subscribe to arrivals in a terminal state.
    pub fn on_terminal<F>(&self, hook: F)
    where
        F: Fn(S) + Send + Sync + 'static,
    {
        lock(&self.on_terminal).push(Arc::new(hook));
    }

    // Hooks run outside the state lock so they may query the machine.
    fn notify(&self, from: S, event: E, to: S) {
        let hooks: Vec<_> = lock(&self.on_transition).clone();
        for hook in hooks {
            hook(from, event, to);
        }

        if self.terminal.contains(&to) {
            let hooks: Vec<_> = lock(&self.on_terminal).clone();
            for hook in hooks {
                hook(to);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// States of a long-running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunEvent {
    Start,
    Stop,
}

pub type Lifecycle = StateMachine<RunState, RunEvent>;

impl Lifecycle {
    /// STOPPED -(Start)-> RUNNING -(Stop)-> STOPPED, starting stopped.
    pub fn start_stop() -> Self {
        StateMachine::new(
            RunState::Stopped,
            [
                (RunState::Stopped, RunEvent::Start, RunState::Running),
                (RunState::Running, RunEvent::Stop, RunState::Stopped),
            ],
        )
        .with_terminal_states([RunState::Stopped])
    }

    pub fn is_running(&self) -> bool {
        self.is(RunState::Running)
    }
}
