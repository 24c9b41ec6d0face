//! Socket lifecycle and frame delivery.
//!
//! The [`Transport`] trait is the seam between the registry and the actual
//! network: production uses [`TokioTransport`], tests substitute their own
//! implementation and feed frames straight into the delivery queue.
//!
//! Each open socket gets one tokio reader task. TCP readers treat the
//! stream as a byte sequence and resynchronise on the frame start token,
//! so a connection joined mid-frame (or a sender hiccup) costs at most the
//! partial frame. UDP listeners expect one complete frame per datagram.
//!
//! Decoded frames are pushed into a bounded mpsc channel as [`RawFrame`]s.
//! When the queue is full the newest frame is dropped with a warning:
//! poses are latest-wins data and the consumer drains the whole queue each
//! tick, so sustained overflow only ever means a stalled consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::{self, Frame, FrameHeader, HEADER_SIZE, START_TOKEN};
use crate::{MocapError, Result};

/// Opaque identifier for one open socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketHandle(pub u64);

impl std::fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One decoded frame tagged with the socket it arrived on.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub handle: SocketHandle,
    pub frame: Frame,
}

/// Sender half of the frame delivery queue.
pub type FrameSender = mpsc::Sender<RawFrame>;

/// Receiver half of the frame delivery queue.
pub type FrameReceiver = mpsc::Receiver<RawFrame>;

/// Socket lifecycle operations the registry depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a capture server over TCP and start delivering its
    /// frames into `queue`.
    async fn open_tcp(&self, address: &str, port: u16, queue: FrameSender)
        -> Result<SocketHandle>;

    /// Bind a local UDP port and start delivering received frames into
    /// `queue`.
    async fn listen_udp(&self, port: u16, queue: FrameSender) -> Result<SocketHandle>;

    /// Stop the reader and release the socket. Closing an unknown handle
    /// is a no-op.
    async fn close(&self, handle: SocketHandle);
}

/// Production transport backed by tokio sockets.
#[derive(Debug, Default)]
pub struct TokioTransport {
    next_handle: AtomicU64,
    readers: Mutex<HashMap<SocketHandle, CancellationToken>>,
}

impl TokioTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self) -> (SocketHandle, CancellationToken) {
        let handle = SocketHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        let cancel = CancellationToken::new();
        self.readers
            .lock()
            .expect("transport reader map poisoned")
            .insert(handle, cancel.clone());
        (handle, cancel)
    }

    fn unregister(&self, handle: SocketHandle) -> Option<CancellationToken> {
        self.readers
            .lock()
            .expect("transport reader map poisoned")
            .remove(&handle)
    }
}

#[async_trait]
impl Transport for TokioTransport {
    async fn open_tcp(
        &self,
        address: &str,
        port: u16,
        queue: FrameSender,
    ) -> Result<SocketHandle> {
        let stream = TcpStream::connect((address, port)).await.map_err(|e| {
            MocapError::connection_failed_with_source(
                format!("tcp connect to {address}:{port}"),
                Box::new(e),
            )
        })?;
        let (handle, cancel) = self.register();
        debug!(%handle, address, port, "tcp capture stream connected");
        tokio::spawn(run_tcp_reader(stream, handle, queue, cancel));
        Ok(handle)
    }

    async fn listen_udp(&self, port: u16, queue: FrameSender) -> Result<SocketHandle> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await.map_err(|e| {
            MocapError::connection_failed_with_source(
                format!("udp bind on port {port}"),
                Box::new(e),
            )
        })?;
        let (handle, cancel) = self.register();
        debug!(%handle, port, "udp capture listener bound");
        tokio::spawn(run_udp_reader(socket, handle, queue, cancel));
        Ok(handle)
    }

    async fn close(&self, handle: SocketHandle) {
        if let Some(cancel) = self.unregister(handle) {
            debug!(%handle, "closing capture socket");
            cancel.cancel();
        }
    }
}

async fn run_tcp_reader(
    mut stream: TcpStream,
    handle: SocketHandle,
    queue: FrameSender,
    cancel: CancellationToken,
) {
    let mut pending: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 2048];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read(&mut chunk) => match read {
                Ok(0) => {
                    debug!(%handle, "tcp capture stream closed by peer");
                    break;
                }
                Ok(n) => {
                    pending.extend_from_slice(&chunk[..n]);
                    for frame in drain_frames(&mut pending) {
                        deliver(&queue, handle, frame);
                    }
                }
                Err(error) => {
                    warn!(%handle, %error, "tcp capture stream read failed");
                    break;
                }
            }
        }
    }
}

async fn run_udp_reader(
    socket: UdpSocket,
    handle: SocketHandle,
    queue: FrameSender,
    cancel: CancellationToken,
) {
    let mut datagram = [0u8; 2048];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut datagram) => match received {
                Ok((n, _)) if n >= HEADER_SIZE => {
                    match protocol::decode(&datagram[..HEADER_SIZE], &datagram[HEADER_SIZE..n]) {
                        Ok(frame) => deliver(&queue, handle, frame),
                        Err(error) => trace!(%handle, %error, "dropping undecodable datagram"),
                    }
                }
                Ok((n, _)) => trace!(%handle, bytes = n, "dropping undersized datagram"),
                Err(error) => {
                    warn!(%handle, %error, "udp receive failed");
                    break;
                }
            }
        }
    }
}

fn deliver(queue: &FrameSender, handle: SocketHandle, frame: Frame) {
    match queue.try_send(RawFrame { handle, frame }) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%handle, "frame queue full, dropping frame");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            trace!(%handle, "frame queue closed");
        }
    }
}

/// Extract every complete frame from the pending byte buffer, consuming
/// the bytes used and any garbage before a start token.
fn drain_frames(pending: &mut Vec<u8>) -> Vec<Frame> {
    let token = START_TOKEN.to_le_bytes();
    let mut frames = Vec::new();
    loop {
        // Resynchronise on the start token.
        match pending.windows(2).position(|w| w == token) {
            Some(0) => {}
            Some(skip) => {
                trace!(bytes = skip, "skipping bytes before start token");
                pending.drain(..skip);
            }
            None => {
                // Keep a possible first token byte at the tail.
                let keep = if pending.last() == Some(&token[0]) { 1 } else { 0 };
                pending.drain(..pending.len() - keep);
                return frames;
            }
        }
        if pending.len() < HEADER_SIZE {
            return frames;
        }
        let header = match FrameHeader::parse(&pending[..HEADER_SIZE]) {
            Ok(header) => header,
            Err(error) => {
                // A stray token inside payload data; step past it and rescan.
                trace!(%error, "start token without valid header");
                pending.drain(..2);
                continue;
            }
        };
        let total = HEADER_SIZE + header.value_count as usize * 4;
        if pending.len() < total {
            return frames;
        }
        let mut values = Vec::with_capacity(header.value_count as usize);
        for chunk in pending[HEADER_SIZE..total].chunks_exact(4) {
            values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        frames.push(Frame { header, values });
        pending.drain(..total);
    }
}
