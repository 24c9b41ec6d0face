//! Connection registry: source identity, dedupe, routing, and ticking.
//!
//! A [`Registry`] is an explicitly constructed object the host owns and
//! injects wherever capture data is consumed; there is no process-wide
//! instance. It maps [`SourceKey`] identities and [`SocketHandle`]s to
//! shared [`Source`]s under one exclusive lock, dedupes connects by
//! reference counting, and drains the transport's frame queue on demand.
//!
//! The intended consumer loop is one [`tick`](Registry::tick) per render
//! or simulation step: drain the queue, re-evaluate presence, iterate the
//! returned events, then read actor poses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

use crate::protocol;
use crate::source::{ActorEvent, Source, SourceKey, DEFAULT_NO_DATA_TIMEOUT};
use crate::transport::{FrameReceiver, FrameSender, SocketHandle, Transport};
use crate::Result;

/// Registry tuning knobs, loadable from host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Suspend an actor after this long without a frame.
    pub no_data_timeout: Duration,
    /// Capacity of the bounded frame delivery queue.
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            no_data_timeout: DEFAULT_NO_DATA_TIMEOUT,
            queue_capacity: 256,
        }
    }
}

/// A presence transition tagged with the source it happened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub key: SourceKey,
    pub event: ActorEvent,
}

#[derive(Default)]
struct Maps {
    by_key: HashMap<SourceKey, Arc<Source>>,
    by_handle: HashMap<SocketHandle, Arc<Source>>,
}

/// Owns every connected capture source.
pub struct Registry {
    transport: Arc<dyn Transport>,
    config: RegistryConfig,
    maps: Mutex<Maps>,
    queue_tx: FrameSender,
    queue_rx: Mutex<FrameReceiver>,
}

impl Registry {
    pub fn new(transport: Arc<dyn Transport>, config: RegistryConfig) -> Self {
        let (queue_tx, queue_rx) = tokio::sync::mpsc::channel(config.queue_capacity.max(1));
        Self {
            transport,
            config,
            maps: Mutex::new(Maps::default()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Connect to a capture source, reusing an existing connection to the
    /// same identity.
    ///
    /// Each successful call takes one reference on the returned source;
    /// pair it with exactly one [`disconnect`](Registry::disconnect). A
    /// socket-open failure is reported to the caller and nothing is
    /// registered; retrying is the host's decision.
    pub async fn connect(&self, key: SourceKey) -> Result<Arc<Source>> {
        if let Some(existing) = self.grab_existing(&key) {
            return Ok(existing);
        }

        // Open the socket without holding the registry lock; it is the only
        // latency-bearing step.
        let handle = match &key {
            SourceKey::Tcp { address, port } => {
                self.transport.open_tcp(address, *port, self.queue_tx.clone()).await?
            }
            SourceKey::Udp { port } => {
                self.transport.listen_udp(*port, self.queue_tx.clone()).await?
            }
        };

        // Another caller may have registered the same key while the socket
        // opened; they win, and the redundant socket is closed.
        let (source, redundant) = {
            let mut maps = self.maps.lock().expect("registry maps poisoned");
            if let Some(existing) = maps.by_key.get(&key) {
                existing.grab();
                (existing.clone(), Some(handle))
            } else {
                let source = Arc::new(Source::new(key.clone(), handle));
                source.grab();
                maps.by_key.insert(key.clone(), source.clone());
                maps.by_handle.insert(handle, source.clone());
                (source, None)
            }
        };
        if let Some(handle) = redundant {
            self.transport.close(handle).await;
        } else {
            info!(source = %key, handle = %source.handle(), "capture source connected");
        }
        Ok(source)
    }

    fn grab_existing(&self, key: &SourceKey) -> Option<Arc<Source>> {
        let maps = self.maps.lock().expect("registry maps poisoned");
        maps.by_key.get(key).map(|source| {
            source.grab();
            source.clone()
        })
    }

    /// Release one reference on a source.
    ///
    /// When the last reference goes, the source is removed from the maps
    /// before its socket closes, so a late frame delivery resolves to
    /// nothing rather than a dead source. Returns the suspend events for
    /// every actor that was still active.
    pub async fn disconnect(&self, source: &Arc<Source>) -> Vec<ActorEvent> {
        if source.release() > 0 {
            return Vec::new();
        }
        {
            let mut maps = self.maps.lock().expect("registry maps poisoned");
            maps.by_key.remove(source.key());
            maps.by_handle.remove(&source.handle());
        }
        let events = source.suspend_all();
        self.transport.close(source.handle()).await;
        info!(source = %source.key(), "capture source disconnected");
        events
    }

    /// Source currently registered under an identity, if any.
    ///
    /// Does not take a reference; use [`connect`](Registry::connect) to
    /// hold one.
    pub fn source(&self, key: &SourceKey) -> Option<Arc<Source>> {
        let maps = self.maps.lock().expect("registry maps poisoned");
        maps.by_key.get(key).cloned()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.maps.lock().expect("registry maps poisoned").by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode raw bytes and route the frame to the socket's source.
    ///
    /// An unknown handle is a silent no-op: frames race source teardown
    /// and losing that race is expected. A codec failure drops the frame
    /// and keeps the actor's previous one.
    pub fn dispatch(&self, handle: SocketHandle, header_bytes: &[u8], payload_bytes: &[u8]) {
        match protocol::decode(header_bytes, payload_bytes) {
            Ok(frame) => self.route(handle, frame.header, &frame.values),
            Err(error) => warn!(%handle, %error, "dropping undecodable frame"),
        }
    }

    fn route(&self, handle: SocketHandle, header: protocol::FrameHeader, values: &[f32]) {
        let source = {
            let maps = self.maps.lock().expect("registry maps poisoned");
            maps.by_handle.get(&handle).cloned()
        };
        match source {
            Some(source) => source.dispatch_frame(header, values),
            None => trace!(%handle, "frame for unregistered socket"),
        }
    }

    /// Drain the transport's frame queue, routing every pending frame.
    /// Returns the number of frames routed.
    pub fn pump(&self) -> usize {
        let mut queue = self.queue_rx.lock().expect("registry queue poisoned");
        let mut routed = 0;
        while let Ok(raw) = queue.try_recv() {
            self.route(raw.handle, raw.frame.header, &raw.frame.values);
            routed += 1;
        }
        routed
    }

    /// One consumer step: pump the queue, then re-evaluate presence on
    /// every source. Events are ordered per source, suspends before
    /// resumes.
    pub fn tick(&self) -> Vec<SourceEvent> {
        self.pump();
        let sources: Vec<Arc<Source>> = {
            let maps = self.maps.lock().expect("registry maps poisoned");
            let mut sources: Vec<_> = maps.by_key.values().cloned().collect();
            sources.sort_by_key(|s| s.handle());
            sources
        };
        let mut events = Vec::new();
        for source in sources {
            for event in source.evaluate(self.config.no_data_timeout) {
                events.push(SourceEvent { key: source.key().clone(), event });
            }
        }
        events
    }
}
