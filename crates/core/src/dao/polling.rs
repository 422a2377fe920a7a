//! Change detection for providers.
//!
//! ```text
//!   observe(pattern, listener) ──> ListenerRegistry (DashMap, one Registration per listener)
//!                                        │
//!   PollingScheduler (tokio interval) ───┴──> run_cycle(target)
//!        │  cancel token                        ├─ listener.polling(pattern, paths)  gate
//!        v                                      ├─ compare markers per path
//!   spawn_blocking per tick                     └─ listener.nut_polled(path, marker)
//! ```
//!
//! Each registration keeps its own last-seen markers, so a listener that was gated out of
//! a cycle still observes the change on its next admitted cycle.

use super::{NutDao, NutDaoListener};
use crate::error::{NutpipeError, Result};
use dashmap::DashMap;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a poll cycle needs from its provider.
pub trait PollTarget {
    fn poll_paths(&self, pattern: &str) -> Result<Vec<String>>;

    /// Current modification marker (version number) of a concrete path.
    fn poll_marker(&self, path: &str) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub listeners: usize,
    pub excluded: usize,
    pub notified: usize,
    pub errors: usize,
    /// Registrations dropped because their listener was no longer alive.
    pub removed: usize,
}

struct Registration {
    listener: Arc<dyn NutDaoListener>,
    /// pattern -> path -> last seen marker
    patterns: Mutex<IndexMap<String, HashMap<String, u64>>>,
}

#[derive(Default)]
pub struct ListenerRegistry {
    entries: DashMap<usize, Arc<Registration>>,
    cycle: Mutex<()>,
}

fn listener_key(listener: &Arc<dyn NutDaoListener>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `pattern` to the listener's registration. Known markers are never overwritten.
    pub fn register(
        &self,
        pattern: &str,
        listener: &Arc<dyn NutDaoListener>,
        baseline: HashMap<String, u64>,
    ) {
        let registration = self
            .entries
            .entry(listener_key(listener))
            .or_insert_with(|| {
                Arc::new(Registration {
                    listener: listener.clone(),
                    patterns: Mutex::new(IndexMap::new()),
                })
            })
            .clone();

        let mut patterns = registration
            .patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let known = patterns.entry(pattern.to_string()).or_default();
        for (path, marker) in baseline {
            known.entry(path).or_insert(marker);
        }
    }

    pub fn unregister(&self, listener: &Arc<dyn NutDaoListener>) -> bool {
        self.entries.remove(&listener_key(listener)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patterns registered for `listener`.
    pub fn patterns_of(&self, listener: &Arc<dyn NutDaoListener>) -> Vec<String> {
        self.entries
            .get(&listener_key(listener))
            .map(|r| {
                r.patterns
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .keys()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// One detection pass over every registration. Failures are logged and counted.
    pub fn run_cycle(&self, target: &dyn PollTarget) -> PollReport {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        let before = self.entries.len();
        self.entries.retain(|_, r| r.listener.is_alive());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Dropped {} dead listener(s)", removed);
        }
        let registrations: Vec<Arc<Registration>> =
            self.entries.iter().map(|e| e.value().clone()).collect();

        let mut report = PollReport {
            listeners: registrations.len(),
            removed,
            ..PollReport::default()
        };
        let mut listed: HashMap<String, Vec<String>> = HashMap::new();
        let mut markers: HashMap<String, u64> = HashMap::new();

        for registration in registrations {
            let snapshot = registration
                .patterns
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            let mut excluded = false;
            let mut changes: IndexMap<String, u64> = IndexMap::new();
            let mut updates: Vec<(String, String, u64)> = Vec::new();

            for (pattern, known) in &snapshot {
                let paths = match listed.get(pattern) {
                    Some(paths) => paths.clone(),
                    None => match target.poll_paths(pattern) {
                        Ok(paths) => {
                            listed.insert(pattern.clone(), paths.clone());
                            paths
                        }
                        Err(e) => {
                            warn!("Polling could not list '{}': {}", pattern, e);
                            report.errors += 1;
                            continue;
                        }
                    },
                };

                let observed: HashSet<String> = paths.iter().cloned().collect();
                if !registration.listener.polling(pattern, &observed) {
                    excluded = true;
                    break;
                }

                for path in paths {
                    let marker = match markers.get(&path) {
                        Some(marker) => *marker,
                        None => match target.poll_marker(&path) {
                            Ok(marker) => {
                                markers.insert(path.clone(), marker);
                                marker
                            }
                            Err(e) => {
                                warn!("Polling could not read '{}': {}", path, e);
                                report.errors += 1;
                                continue;
                            }
                        },
                    };

                    match known.get(&path) {
                        Some(previous) if *previous == marker => {}
                        Some(_) => {
                            changes.insert(path.clone(), marker);
                            updates.push((pattern.clone(), path, marker));
                        }
                        None => updates.push((pattern.clone(), path, marker)),
                    }
                }
            }

            if excluded {
                report.excluded += 1;
                continue;
            }

            {
                let mut patterns = registration
                    .patterns
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                for (pattern, path, marker) in updates {
                    if let Some(known) = patterns.get_mut(&pattern) {
                        known.insert(path, marker);
                    }
                }
            }

            for (path, marker) in changes {
                debug!("Change detected on '{}' (marker {})", path, marker);
                report.notified += 1;
                if !registration.listener.nut_polled(&path, marker) {
                    break;
                }
            }
        }

        report
    }
}

#[derive(Default)]
struct SchedulerState {
    seconds: i64,
    token: Option<CancellationToken>,
}

/// Owns the background poll task of one provider.
#[derive(Default)]
pub struct PollingScheduler {
    state: Mutex<SchedulerState>,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(&self) -> i64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seconds
    }

    /// Replaces the running task. A non-positive interval only stops it.
    pub fn set_interval(&self, seconds: i64, dao: Weak<dyn NutDao>, label: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.seconds = seconds;
        if seconds <= 0 {
            debug!("Polling disabled for {}", label);
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            NutpipeError::BadState(format!("polling {label} requires a tokio runtime"))
        })?;
        let token = CancellationToken::new();
        state.token = Some(token.clone());
        drop(state);

        let period = Duration::from_secs(seconds as u64);
        let label = label.to_string();
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            info!("Started polling {} every {}s", label, seconds);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(dao) = dao.upgrade() else { break };
                        if token.is_cancelled() {
                            break;
                        }
                        match tokio::task::spawn_blocking(move || dao.run_poll_cycle()).await {
                            Ok(report) => debug!("Poll cycle for {}: {:?}", label, report),
                            Err(e) => warn!("Poll cycle for {} aborted: {}", label, e),
                        }
                    }
                }
            }
            info!("Stopped polling {}", label);
        });
        Ok(())
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.seconds = 0;
        if let Some(token) = state.token.take() {
            token.cancel();
        }
    }
}
