//! Capture source: one socket, its performers, and their presence state.
//!
//! A [`Source`] owns every [`Actor`] seen on one socket and tracks whether
//! each is currently delivering data. Presence is pure data staleness: an
//! actor is Active while frames keep arriving and Suspended once its last
//! frame is older than the no-data timeout. Actors are never forgotten —
//! a suspended performer resumes with its buffer intact when frames return.
//!
//! Sources are shared (`Arc<Source>`) between the registry, the transport
//! reader task, and the consumer; a single internal mutex guards the actor
//! partitions. Reference counting (`grab`/`release`) lets several parts of
//! a host program connect to the same capture server address while the
//! socket is opened only once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actor::Actor;
use crate::protocol::FrameHeader;
use crate::transport::SocketHandle;

/// Suspend an actor after this long without a frame.
pub const DEFAULT_NO_DATA_TIMEOUT: Duration = Duration::from_millis(5000);

/// Identity of a capture source.
///
/// Two TCP keys are equal iff address and port match; a UDP listener is
/// identified by its local port alone, so the key cannot express a
/// per-peer UDP identity by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKey {
    Tcp { address: String, port: u16 },
    Udp { port: u16 },
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKey::Tcp { address, port } => write!(f, "tcp://{address}:{port}"),
            SourceKey::Udp { port } => write!(f, "udp://0.0.0.0:{port}"),
        }
    }
}

/// Presence transition for one performer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorEvent {
    /// The actor stopped delivering data and was parked.
    Suspended { actor_index: u32 },
    /// The actor is delivering data again.
    Resumed { actor_index: u32 },
}

/// The two presence partitions. An index lives in exactly one at a time.
#[derive(Debug, Default)]
struct Partitions {
    active: HashMap<u32, Actor>,
    suspended: HashMap<u32, Actor>,
}

/// One connected capture stream and the performers on it.
#[derive(Debug)]
pub struct Source {
    key: SourceKey,
    handle: SocketHandle,
    references: AtomicUsize,
    partitions: Mutex<Partitions>,
}

impl Source {
    pub(crate) fn new(key: SourceKey, handle: SocketHandle) -> Self {
        Self {
            key,
            handle,
            references: AtomicUsize::new(0),
            partitions: Mutex::new(Partitions::default()),
        }
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    /// Current reference count.
    pub fn reference_count(&self) -> usize {
        self.references.load(Ordering::SeqCst)
    }

    /// Take a reference; returns the new count.
    pub(crate) fn grab(&self) -> usize {
        self.references.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Drop a reference; returns the new count.
    ///
    /// An unbalanced release clamps at zero so a host double-disconnect
    /// cannot wrap the counter and disarm teardown.
    pub(crate) fn release(&self) -> usize {
        let result = self
            .references
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1));
        match result {
            Ok(previous) => previous - 1,
            Err(_) => {
                warn!(source = %self.key, "release without a matching grab");
                0
            }
        }
    }

    /// Route a decoded frame to the actor its header names.
    pub fn dispatch_frame(&self, header: FrameHeader, values: &[f32]) {
        self.dispatch_frame_at(header, values, Instant::now());
    }

    /// [`dispatch_frame`](Self::dispatch_frame) with an explicit timestamp.
    ///
    /// A frame for an unknown index creates the actor in the suspended
    /// partition; the next evaluation promotes it and emits the resume
    /// event, so "appeared" and "resumed" reach the consumer the same way.
    pub fn dispatch_frame_at(&self, header: FrameHeader, values: &[f32], now: Instant) {
        let index = header.actor_index;
        let mut partitions = self.partitions.lock().expect("source partitions poisoned");
        if let Some(actor) = partitions.active.get_mut(&index) {
            actor.receive(header, values, now);
            return;
        }
        let actor = partitions
            .suspended
            .entry(index)
            .or_insert_with(|| {
                debug!(source = %self.key, actor_index = index, "new actor");
                Actor::new(index)
            });
        actor.receive(header, values, now);
    }

    /// Ensure an actor exists for an index, creating it suspended.
    ///
    /// Idempotent; lets hosts pre-register performers they expect before
    /// any data arrives.
    pub fn acquire(&self, actor_index: u32) {
        let mut partitions = self.partitions.lock().expect("source partitions poisoned");
        if partitions.active.contains_key(&actor_index) {
            return;
        }
        partitions
            .suspended
            .entry(actor_index)
            .or_insert_with(|| Actor::new(actor_index));
    }

    /// Snapshot of one actor's latest pose data.
    pub fn actor(&self, actor_index: u32) -> Option<Actor> {
        let partitions = self.partitions.lock().expect("source partitions poisoned");
        partitions
            .active
            .get(&actor_index)
            .or_else(|| partitions.suspended.get(&actor_index))
            .cloned()
    }

    /// Indices currently in the active partition, sorted.
    pub fn active_indices(&self) -> Vec<u32> {
        let partitions = self.partitions.lock().expect("source partitions poisoned");
        let mut indices: Vec<u32> = partitions.active.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Indices currently in the suspended partition, sorted.
    pub fn suspended_indices(&self) -> Vec<u32> {
        let partitions = self.partitions.lock().expect("source partitions poisoned");
        let mut indices: Vec<u32> = partitions.suspended.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Re-evaluate presence for every actor against the timeout.
    pub fn evaluate(&self, timeout: Duration) -> Vec<ActorEvent> {
        self.evaluate_at(Instant::now(), timeout)
    }

    /// [`evaluate`](Self::evaluate) with an explicit timestamp.
    ///
    /// Batch semantics: all suspend decisions are computed and applied
    /// before any resume decision, so an evaluation never sees its own
    /// output. Active goes stale strictly after `timeout`; suspended
    /// resumes strictly before it.
    pub fn evaluate_at(&self, now: Instant, timeout: Duration) -> Vec<ActorEvent> {
        let mut partitions = self.partitions.lock().expect("source partitions poisoned");
        let mut events = Vec::new();

        let stale: Vec<u32> = partitions
            .active
            .iter()
            .filter(|(_, actor)| match actor.last_update() {
                Some(last) => now.saturating_duration_since(last) > timeout,
                None => true,
            })
            .map(|(&index, _)| index)
            .collect();
        for index in stale {
            if let Some(actor) = partitions.active.remove(&index) {
                debug!(source = %self.key, actor_index = index, "actor suspended");
                partitions.suspended.insert(index, actor);
                events.push(ActorEvent::Suspended { actor_index: index });
            }
        }

        let fresh: Vec<u32> = partitions
            .suspended
            .iter()
            .filter(|(_, actor)| match actor.last_update() {
                Some(last) => now.saturating_duration_since(last) < timeout,
                None => false,
            })
            .map(|(&index, _)| index)
            .collect();
        for index in fresh {
            if let Some(actor) = partitions.suspended.remove(&index) {
                debug!(source = %self.key, actor_index = index, "actor resumed");
                partitions.active.insert(index, actor);
                events.push(ActorEvent::Resumed { actor_index: index });
            }
        }

        events
    }

    /// Park every active actor, emitting its suspend event.
    ///
    /// Used during disconnect so consumers observe the suspends before the
    /// socket goes away.
    pub fn suspend_all(&self) -> Vec<ActorEvent> {
        let mut partitions = self.partitions.lock().expect("source partitions poisoned");
        let mut indices: Vec<u32> = partitions.active.keys().copied().collect();
        indices.sort_unstable();
        let mut events = Vec::with_capacity(indices.len());
        for index in indices {
            if let Some(actor) = partitions.active.remove(&index) {
                partitions.suspended.insert(index, actor);
                events.push(ActorEvent::Suspended { actor_index: index });
            }
        }
        events
    }
}
