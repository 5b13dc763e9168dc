//! Dispatcher - hands fired candidates to a sink, honouring busy policies.
//!
//! While the sink is busy, each candidate's [`BusyPolicy`] decides whether it
//! is refused, queued, dropped or interrupts the current delivery. Queued
//! firings are replayed by [`Dispatcher::process_end`] once the sink frees up;
//! those whose conditions lapsed in the meantime are handed back to their pool.

use flag_rules::{FlagBundle, FlagId, FlagRegistry};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::candidate::{BusyPolicy, Candidate};
use crate::pool::{FiringHook, PoolId};

/// Where candidates are finally delivered.
pub trait DeliverySink {
    fn send(&mut self, candidate: &Candidate);

    fn is_busy(&self) -> bool;

    /// Cut off whatever is being delivered.
    fn abrupt_end(&mut self);
}

/// A firing waiting in the backlog, with the context it was fired under.
#[derive(Debug, Clone)]
pub struct QueuedFiring {
    pub origin: PoolId,
    pub candidate: Arc<Candidate>,
    pub imported: Vec<FlagBundle>,
    pub all: Vec<FlagId>,
}

impl QueuedFiring {
    fn conditions_met(&self, registry: &FlagRegistry) -> bool {
        self.candidate
            .conditions_met(registry, &self.imported, &self.all)
    }
}

pub struct Dispatcher<S> {
    sink: S,
    backlog: VecDeque<QueuedFiring>,
    returned: Vec<(PoolId, Arc<Candidate>)>,
}

impl<S: DeliverySink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            backlog: VecDeque::new(),
            returned: Vec::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn backlog(&self) -> impl Iterator<Item = &QueuedFiring> {
        self.backlog.iter()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Deliver a candidate or apply its busy policy. Returns whether the
    /// firing was accepted.
    pub fn process(
        &mut self,
        origin: PoolId,
        candidate: &Arc<Candidate>,
        imported: &[FlagBundle],
        all: &[FlagId],
    ) -> bool {
        if !self.sink.is_busy() {
            self.sink.send(candidate);
            return true;
        }

        let queued = || QueuedFiring {
            origin,
            candidate: candidate.clone(),
            imported: imported.to_vec(),
            all: all.to_vec(),
        };

        log::debug!(
            "sink busy, applying {} to {}",
            candidate.busy_policy.as_str(),
            candidate.name
        );
        match candidate.busy_policy {
            BusyPolicy::Cancel => false,
            BusyPolicy::Queue => {
                self.backlog.push_back(queued());
                true
            }
            BusyPolicy::FrontOfQueue => {
                self.backlog.push_front(queued());
                true
            }
            BusyPolicy::Interrupt => {
                self.sink.abrupt_end();
                self.sink.send(candidate);
                true
            }
            BusyPolicy::InterruptClearQueue => {
                self.sink.abrupt_end();
                self.sink.send(candidate);
                self.returned.extend(
                    self.backlog
                        .drain(..)
                        .map(|firing| (firing.origin, firing.candidate)),
                );
                true
            }
            BusyPolicy::Delete => true,
        }
    }

    /// The sink finished a delivery: send the first backlog entry whose
    /// conditions still hold. Entries skipped on the way are returned to their
    /// pools. Returns whether anything was sent.
    pub fn process_end(&mut self, registry: &FlagRegistry) -> bool {
        while let Some(firing) = self.backlog.pop_front() {
            if firing.conditions_met(registry) {
                self.sink.send(&firing.candidate);
                return true;
            }
            log::debug!("{} lapsed while queued, returning it", firing.candidate.name);
            self.returned.push((firing.origin, firing.candidate));
        }
        false
    }

    /// Whether any backlog entry could be sent right now.
    pub fn has_sendable(&self, registry: &FlagRegistry) -> bool {
        self.backlog
            .iter()
            .any(|firing| firing.conditions_met(registry))
    }

    /// Candidates to hand back with `DeliveryPool::return_candidate`, tagged
    /// with their pool.
    pub fn take_returned(&mut self) -> Vec<(PoolId, Arc<Candidate>)> {
        std::mem::take(&mut self.returned)
    }
}

impl<S: DeliverySink> FiringHook for Dispatcher<S> {
    fn fire(
        &mut self,
        origin: PoolId,
        candidate: &Arc<Candidate>,
        imported: &[FlagBundle],
        all: &[FlagId],
    ) -> bool {
        self.process(origin, candidate, imported, all)
    }
}
