//! # mocaplink
//!
//! Type-safe ingestion of live motion-capture streams and retargeting of
//! the decoded skeleton onto arbitrary rigs.
//!
//! The capture server streams BVH-style frames — a 64-byte packed header
//! plus a flat float payload — over TCP or UDP. This crate owns the
//! sockets, decodes and routes frames to per-performer [`Actor`] buffers,
//! tracks performer presence by data staleness, and maps the fixed
//! 59-bone capture skeleton onto whatever joint hierarchy the host uses.
//!
//! ## Architecture
//!
//! - [`protocol`] — wire header and float payload codec
//! - [`bones`] — the fixed 59-joint capture skeleton
//! - [`transport`] — tokio socket readers feeding a bounded frame queue
//! - [`registry`] / [`source`] / [`actor`] — connection identity,
//!   presence tracking, and latest-pose buffers
//! - [`rig`] / [`retarget`] — target skeletons and the bind/apply
//!   retargeting pipeline
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mocaplink::{Registry, RegistryConfig, Retargeter, RetargetMap, SourceKey, TokioTransport};
//! # use mocaplink::{Pose, Rig};
//!
//! # async fn run(rig: Rig) -> mocaplink::Result<()> {
//! let registry = Registry::new(Arc::new(TokioTransport::new()), RegistryConfig::default());
//! let source = registry
//!     .connect(SourceKey::Tcp { address: "192.168.1.80".into(), port: 7001 })
//!     .await?;
//!
//! let binding = Retargeter::new(RetargetMap::humanoid()).bind(&rig)?;
//! let mut pose = Pose::rest(&rig);
//!
//! // Once per render step:
//! for change in registry.tick() {
//!     tracing::info!(source = %change.key, event = ?change.event, "presence changed");
//! }
//! if let Some(actor) = source.actor(0) {
//!     binding.apply(&actor, &rig, &mut pose);
//! }
//!
//! registry.disconnect(&source).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Policy
//!
//! Nothing in this crate is fatal to the host. Malformed frames are
//! dropped and the previous pose survives; a silent performer is
//! suspended, not forgotten; a non-finite sensor sample skips one bone
//! for one frame. The only errors surfaced to callers are the ones they
//! can act on, and [`MocapError::is_retryable`] says which those are.

pub mod actor;
pub mod bones;
pub mod error;
pub mod math;
pub mod protocol;
pub mod registry;
pub mod retarget;
pub mod rig;
pub mod source;
pub mod transport;

pub use actor::Actor;
pub use bones::Bone;
pub use error::{MocapError, Result};
pub use protocol::{DataVersion, Frame, FrameHeader};
pub use registry::{Registry, RegistryConfig, SourceEvent};
pub use retarget::{Binding, RetargetEntry, RetargetMap, Retargeter, REFERENCE_HIP_HEIGHT};
pub use rig::{Joint, Pose, Rig};
pub use source::{ActorEvent, Source, SourceKey, DEFAULT_NO_DATA_TIMEOUT};
pub use transport::{RawFrame, SocketHandle, TokioTransport, Transport};
