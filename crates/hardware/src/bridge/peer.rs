//! Reference memory backend.
//!
//! `MemoryPeer` is the memory side of the bridge: it listens on a Unix socket,
//! answers the introduction exchange as [`Role::Memory`], and serves read and
//! write requests from a [`MemoryBackend`]. The CLI runs it with `farmem serve`;
//! tests use it as the echoing peer.

use std::fs;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::protocol::{Completion, MemRequest, RequestKind};
use super::transport::SyncMode;
use super::wire::{self, Intro, Role, msg};
use crate::common::constants::{DEFAULT_LINK_LATENCY, MAX_ACCESS_BYTES};
use crate::common::error::{ConnectError, FrameError, TransportError};

/// Storage behind a memory peer.
pub trait MemoryBackend {
    /// Fills `out` with the bytes at `address`.
    fn read(&mut self, address: u64, out: &mut [u8]);

    /// Stores `data` at `address`.
    fn write(&mut self, address: u64, data: &[u8]);
}

/// Flat byte array backend; bytes outside it read as zero and writes to them are dropped.
#[derive(Debug, Clone)]
pub struct VecBackend {
    data: Vec<u8>,
}

impl VecBackend {
    /// Creates a zeroed backend of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    /// Returns the backing bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, address: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(address).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }
}

impl MemoryBackend for VecBackend {
    fn read(&mut self, address: u64, out: &mut [u8]) {
        if let Some(range) = self.range(address, out.len()) {
            out.copy_from_slice(&self.data[range]);
        } else {
            warn!(address = format_args!("{address:#x}"), len = out.len(), "read outside backend");
            out.fill(0);
        }
    }

    fn write(&mut self, address: u64, data: &[u8]) {
        if let Some(range) = self.range(address, data.len()) {
            self.data[range].copy_from_slice(data);
        } else {
            warn!(address = format_args!("{address:#x}"), len = data.len(), "write outside backend dropped");
        }
    }
}

/// Counters for one served session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerStats {
    /// Read requests answered.
    pub reads: u64,
    /// Write requests answered.
    pub writes: u64,
    /// Sync frames received.
    pub syncs: u64,
}

/// Listening memory backend.
#[derive(Debug)]
pub struct MemoryPeer {
    listener: UnixListener,
    path: PathBuf,
    sync_mode: SyncMode,
    link_latency: u64,
}

impl MemoryPeer {
    /// Binds a listener at `path`.
    ///
    /// # Errors
    ///
    /// Any error from `bind` (for example, the path already exists).
    pub fn bind(path: impl AsRef<Path>, sync_mode: SyncMode, link_latency: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let listener = UnixListener::bind(&path)?;
        info!(socket = %path.display(), "memory peer listening");
        Ok(Self {
            listener,
            path,
            sync_mode,
            link_latency: if link_latency == 0 {
                DEFAULT_LINK_LATENCY
            } else {
                link_latency
            },
        })
    }

    /// Returns the socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts one host connection and completes the handshake.
    ///
    /// # Errors
    ///
    /// `Connect` if accept fails, `Handshake` if the exchange fails.
    pub fn accept(&self) -> Result<PeerSession, ConnectError> {
        let (mut stream, _) = self
            .listener
            .accept()
            .map_err(|source| ConnectError::Connect {
                path: self.path.clone(),
                source,
            })?;
        let local = Intro {
            role: Role::Memory,
            sync_required: self.sync_mode.is_required(),
            link_latency: self.link_latency,
        };
        let host = wire::exchange_intro(&mut stream, &local, Role::Host)?;
        debug!(?host, "host connected");
        Ok(PeerSession {
            stream,
            link_latency: self.link_latency,
            clock: 0,
            stats: PeerStats::default(),
        })
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// One established host connection.
#[derive(Debug)]
pub struct PeerSession {
    stream: UnixStream,
    link_latency: u64,
    clock: u64,
    stats: PeerStats,
}

impl PeerSession {
    /// Serves requests until the host terminates or disconnects.
    ///
    /// Completions are stamped with the later of the peer clock and the
    /// request's delivery time, plus the link latency.
    ///
    /// # Errors
    ///
    /// Socket failures other than an orderly disconnect, and malformed requests.
    pub fn serve(&mut self, backend: &mut dyn MemoryBackend) -> Result<PeerStats, TransportError> {
        loop {
            let frame = match wire::read_frame(&mut self.stream) {
                Ok(frame) => frame,
                Err(TransportError::Closed) => break,
                Err(err) => return Err(err),
            };
            self.clock = self.clock.max(frame.timestamp);

            match frame.msg_type {
                msg::TERMINATE => break,
                msg::SYNC => self.stats.syncs += 1,
                _ => match MemRequest::decode(&frame)? {
                    Some(request) => self.answer(backend, &request)?,
                    None => warn!(msg_type = frame.msg_type, "ignoring unknown message"),
                },
            }
        }
        info!(
            reads = self.stats.reads,
            writes = self.stats.writes,
            "host disconnected"
        );
        Ok(self.stats)
    }

    /// Returns the counters so far.
    pub const fn stats(&self) -> PeerStats {
        self.stats
    }

    fn answer(&mut self, backend: &mut dyn MemoryBackend, request: &MemRequest) -> Result<(), TransportError> {
        if request.length as usize > MAX_ACCESS_BYTES {
            return Err(FrameError::Oversized(request.length).into());
        }
        let completion = match request.kind {
            RequestKind::Read => {
                let mut data = vec![0u8; request.length as usize];
                backend.read(request.address, &mut data);
                self.stats.reads += 1;
                Completion::ReadComplete(data)
            }
            RequestKind::Write => {
                backend.write(request.address, &request.payload);
                self.stats.writes += 1;
                Completion::WriteComplete
            }
        };
        let (msg_type, body) = completion.encode(request.request_id);
        let timestamp = self.clock.saturating_add(self.link_latency);
        wire::write_frame(&mut self.stream, msg_type, timestamp, &body).map_err(wire::classify_io)
    }
}
