//! Background hit search for one agent.
//!
//! The game loop posts requests and polls for results; the search runs on a
//! dedicated thread so a frame never waits on it.
//!
//! Shared state is one mutex-guarded inbox:
//! - `pending`: latest command, a newer post replaces an unconsumed one
//! - `generation`: bumped on every post
//! - `result`: single slot, only written if the generation still matches
//! - `waiting`: agent of the latest unanswered search request

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::SearchError;
use crate::game::State;
use crate::search::{HitPlan, HitSearcher, SearchProblem, SnapshotKey};

/// A finished request.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub agent: usize,
    pub generation: u64,
    pub result: Result<HitPlan, SearchError>,
}

enum Command {
    Search {
        state: Box<State>,
        agent: usize,
        reset: bool,
    },
    Stop,
    Shutdown,
}

#[derive(Default)]
struct Inbox {
    pending: Option<Command>,
    generation: u64,
    result: Option<SearchOutcome>,
    waiting: Option<usize>,
}

#[derive(Default)]
struct Shared {
    inbox: Mutex<Inbox>,
    wake: Condvar,
}

impl Shared {
    // A panic while holding the lock cannot leave the inbox half-written
    fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, command: Command) -> u64 {
        let mut inbox = self.lock();
        inbox.waiting = match &command {
            Command::Search { agent, .. } => Some(*agent),
            Command::Stop | Command::Shutdown => None,
        };
        inbox.pending = Some(command);
        inbox.generation += 1;
        inbox.result = None;
        let generation = inbox.generation;
        drop(inbox);
        self.wake.notify_one();
        generation
    }

    fn current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }
}

/// Owns the search thread of one agent.
pub struct SearchWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl SearchWorker {
    /// Start the thread. `seed` makes its random restarts reproducible.
    pub fn spawn(name: &str, searcher: HitSearcher, seed: u64) -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let thread_shared = Arc::clone(&shared);
        let thread_name = format!("search-{}", name);

        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run(&thread_shared, &searcher, seed))?;

        tracing::info!(thread = %thread_name, "search worker started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Ask for a plan for `agent` from a snapshot of `state`.
    ///
    /// The hit window is resampled whenever the snapshot differs from the one
    /// the worker last prepared; `reset` forces it for an unchanged snapshot.
    /// Returns the request generation.
    pub fn start_searching(&self, state: &State, agent: usize, reset: bool) -> u64 {
        self.shared.post(Command::Search {
            state: Box::new(state.clone()),
            agent,
            reset,
        })
    }

    /// Abandon the current request; nothing from it will be published.
    pub fn stop_searching(&self) -> u64 {
        self.shared.post(Command::Stop)
    }

    /// Take the finished result, if any. Never blocks on the search.
    ///
    /// A pending request whose thread has died is answered with
    /// [`SearchError::WorkerStopped`].
    pub fn poll(&self) -> Option<SearchOutcome> {
        let mut inbox = self.shared.lock();
        if let Some(outcome) = inbox.result.take() {
            return Some(outcome);
        }
        let gone = self.handle.as_ref().map_or(true, |h| h.is_finished());
        if !gone {
            return None;
        }
        let agent = inbox.waiting.take()?;
        tracing::error!(agent, generation = inbox.generation, "search thread is gone");
        Some(SearchOutcome {
            agent,
            generation: inbox.generation,
            result: Err(SearchError::WorkerStopped),
        })
    }

    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        self.shared.post(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("search worker panicked");
            }
        }
    }
}

fn run(shared: &Shared, searcher: &HitSearcher, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut problem: Option<SearchProblem> = None;

    loop {
        let (command, generation) = {
            let mut inbox = shared.lock();
            while inbox.pending.is_none() {
                inbox = shared.wake.wait(inbox).unwrap_or_else(PoisonError::into_inner);
            }
            (inbox.pending.take(), inbox.generation)
        };

        let (state, agent, reset) = match command {
            Some(Command::Search { state, agent, reset }) => (state, agent, reset),
            Some(Command::Stop) => {
                tracing::debug!(generation, "search stopped");
                continue;
            }
            Some(Command::Shutdown) | None => break,
        };

        let key = SnapshotKey::of(&state, agent);
        let stale = problem.as_ref().map_or(true, |p| *p.key() != key);
        if reset || stale {
            problem = None;
            match searcher.prepare(&state, agent) {
                Ok(prepared) => problem = Some(prepared),
                Err(err) => {
                    tracing::debug!(agent, generation, error = %err, "search request rejected");
                    publish(shared, generation, agent, Err(err));
                    continue;
                }
            }
        }
        let Some(problem) = problem.as_mut() else {
            continue;
        };

        let mut result = Err(SearchError::Exhausted { iterations: 0 });
        for attempt in 0..searcher.settings().max_attempts {
            if !shared.current(generation) {
                tracing::debug!(agent, generation, attempt, "search superseded");
                break;
            }
            match searcher.search(problem, &mut rng) {
                Ok(plan) => {
                    tracing::info!(
                        agent,
                        generation,
                        attempt,
                        iterations = plan.iterations,
                        hit_time = plan.hit_time,
                        "hit plan found"
                    );
                    result = Ok(plan);
                    break;
                }
                Err(err) if err.is_soft() => {
                    tracing::debug!(agent, attempt, error = %err, "search attempt failed");
                    result = Err(err);
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        if let Err(err) = &result {
            tracing::warn!(agent, generation, error = %err, "no hit plan");
        }
        publish(shared, generation, agent, result);
    }

    tracing::info!("search worker stopped");
}

fn publish(shared: &Shared, generation: u64, agent: usize, result: Result<HitPlan, SearchError>) {
    let mut inbox = shared.lock();
    if inbox.generation == generation {
        inbox.waiting = None;
        inbox.result = Some(SearchOutcome {
            agent,
            generation,
            result,
        });
    }
}
