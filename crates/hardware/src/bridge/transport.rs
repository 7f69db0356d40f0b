//! Bridge transport: one Unix-socket connection to the memory backend.
//!
//! The transport owns the connection lifecycle:
//! 1. **Connect:** Claim the bridge slot, dial the socket, verify the peer, exchange introductions.
//! 2. **Send:** Stamp each outbound frame with the local logical time plus link latency.
//! 3. **Poll:** Block until the next data frame arrives, absorbing sync frames on the way.
//! 4. **Close:** Tell the peer we are done, shut the socket, release the slot.
//!
//! Waiting is unbounded unless the caller configured a poll timeout. A peer
//! that never answers parks the calling thread forever; in sync mode this is
//! what keeps the host from running ahead of an unacknowledged request.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, trace};

use super::wire::{self, Frame, Intro, Role, msg};
use crate::common::constants::DEFAULT_LINK_LATENCY;
use crate::common::error::{ConnectError, HandshakeError, TransportError};
use crate::common::slot::{Slot, SlotLease};

/// Whether the two sides coordinate logical time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Timestamps are carried but not enforced.
    #[default]
    Disabled,
    /// Completions may not be observed before their delivery time.
    Required,
}

impl SyncMode {
    /// Returns `true` for [`SyncMode::Required`].
    pub const fn is_required(self) -> bool {
        matches!(self, Self::Required)
    }
}

/// Parameters for [`BridgeTransport::connect`].
#[derive(Clone, Debug)]
pub struct BridgeParams {
    /// Socket the memory backend listens on.
    pub socket_path: PathBuf,
    /// Logical-time coordination.
    pub sync_mode: SyncMode,
    /// Latency added to each outbound frame; zero selects the default.
    pub link_latency: u64,
    /// Bound on the introduction exchange (`None` waits forever).
    pub handshake_timeout: Option<Duration>,
    /// Bound on each completion wait (`None` waits forever).
    pub poll_timeout: Option<Duration>,
}

impl BridgeParams {
    /// Parameters with sync disabled, default latency, and no timeouts.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            sync_mode: SyncMode::Disabled,
            link_latency: DEFAULT_LINK_LATENCY,
            handshake_timeout: None,
            poll_timeout: None,
        }
    }

    /// Sets the sync mode.
    #[must_use]
    pub const fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Sets the link latency.
    #[must_use]
    pub const fn with_link_latency(mut self, link_latency: u64) -> Self {
        self.link_latency = link_latency;
        self
    }

    /// Bounds the introduction exchange.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Bounds each completion wait.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    const fn effective_latency(&self) -> u64 {
        if self.link_latency == 0 {
            DEFAULT_LINK_LATENCY
        } else {
            self.link_latency
        }
    }
}

/// Outbound/inbound message channel used by the request protocol.
///
/// Implemented by [`BridgeTransport`]; tests substitute a mock.
pub trait Link {
    /// Sends one frame; returns the timestamp it was stamped with.
    ///
    /// # Errors
    ///
    /// Any transport failure.
    fn send(&mut self, msg_type: u8, body: &[u8]) -> Result<u64, TransportError>;

    /// Blocks until the next data frame is available.
    ///
    /// # Errors
    ///
    /// Any transport failure, including peer termination.
    fn poll_blocking(&mut self) -> Result<Frame, TransportError>;

    /// Returns the negotiated sync mode.
    fn sync_mode(&self) -> SyncMode;
}

/// Established connection to the memory backend.
pub struct BridgeTransport {
    stream: UnixStream,
    socket_path: PathBuf,
    sync_mode: SyncMode,
    link_latency: u64,
    established: bool,
    clock: u64,
    peer_clock: u64,
    peer: Intro,
    _lease: SlotLease,
}

impl BridgeTransport {
    /// Connects to the memory backend and completes the handshake.
    ///
    /// Steps run in order and each failure aborts the whole sequence; nothing
    /// from a failed attempt is reused. The connect itself always blocks.
    ///
    /// # Errors
    ///
    /// * `AlreadyConnected` - another transport holds `slot`.
    /// * `Init` - the parameters are unusable.
    /// * `Connect` - the socket could not be reached.
    /// * `NotConnected` - the socket reports no peer.
    /// * `Handshake` - the introduction exchange failed.
    pub fn connect(slot: &Slot, params: BridgeParams) -> Result<Self, ConnectError> {
        let lease = slot.claim().ok_or(ConnectError::AlreadyConnected)?;
        if params.socket_path.as_os_str().is_empty() {
            return Err(ConnectError::Init("socket path is empty"));
        }
        if params.handshake_timeout.is_some_and(|t| t.is_zero())
            || params.poll_timeout.is_some_and(|t| t.is_zero())
        {
            return Err(ConnectError::Init("timeouts must be non-zero"));
        }
        let link_latency = params.effective_latency();

        let mut stream =
            UnixStream::connect(&params.socket_path).map_err(|source| ConnectError::Connect {
                path: params.socket_path.clone(),
                source,
            })?;

        if stream.peer_addr().is_err() {
            return Err(ConnectError::NotConnected);
        }

        stream
            .set_read_timeout(params.handshake_timeout)
            .map_err(HandshakeError::Io)?;
        let local = Intro {
            role: Role::Host,
            sync_required: params.sync_mode.is_required(),
            link_latency,
        };
        let peer = wire::exchange_intro(&mut stream, &local, Role::Memory)?;
        stream
            .set_read_timeout(params.poll_timeout)
            .map_err(HandshakeError::Io)?;

        info!(
            socket = %params.socket_path.display(),
            sync = ?params.sync_mode,
            link_latency,
            "bridge transport established"
        );

        Ok(Self {
            stream,
            socket_path: params.socket_path,
            sync_mode: params.sync_mode,
            link_latency,
            established: true,
            clock: 0,
            peer_clock: 0,
            peer,
            _lease: lease,
        })
    }

    /// Returns `true` once the handshake has completed.
    pub const fn is_established(&self) -> bool {
        self.established
    }

    /// Returns the socket path this transport dialled.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Returns the effective link latency.
    pub const fn link_latency(&self) -> u64 {
        self.link_latency
    }

    /// Returns the local logical time.
    pub const fn now(&self) -> u64 {
        self.clock
    }

    /// Returns the latest logical time announced by the peer.
    pub const fn peer_time(&self) -> u64 {
        self.peer_clock
    }

    /// Returns the peer's introduction record.
    pub const fn peer_intro(&self) -> &Intro {
        &self.peer
    }

    /// Moves the local logical time forward; earlier times are ignored.
    pub fn advance_to(&mut self, timestamp: u64) {
        self.clock = self.clock.max(timestamp);
    }

    /// Tells the peer that no frame earlier than `now + link_latency` will follow.
    ///
    /// # Errors
    ///
    /// Any socket failure.
    pub fn send_sync(&mut self) -> Result<(), TransportError> {
        self.send(msg::SYNC, &[]).map(|_| ())
    }

    /// Closes the connection and frees the bridge slot.
    ///
    /// The terminate message is best effort: a peer that is already gone is
    /// not an error here.
    pub fn close(mut self) {
        let timestamp = self.clock.saturating_add(self.link_latency);
        if let Err(err) = wire::write_frame(&mut self.stream, msg::TERMINATE, timestamp, &[]) {
            debug!(%err, "terminate message not delivered");
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        self.established = false;
        info!(socket = %self.socket_path.display(), "bridge transport closed");
    }
}

impl Link for BridgeTransport {
    fn send(&mut self, msg_type: u8, body: &[u8]) -> Result<u64, TransportError> {
        let timestamp = self.clock.saturating_add(self.link_latency);
        wire::write_frame(&mut self.stream, msg_type, timestamp, body)
            .map_err(wire::classify_io)?;
        trace!(msg_type, timestamp, len = body.len(), "frame sent");
        Ok(timestamp)
    }

    fn poll_blocking(&mut self) -> Result<Frame, TransportError> {
        loop {
            let frame = wire::read_frame(&mut self.stream)?;
            match frame.msg_type {
                msg::SYNC => {
                    self.peer_clock = self.peer_clock.max(frame.timestamp);
                }
                msg::TERMINATE => return Err(TransportError::Terminated),
                _ => {
                    if self.sync_mode.is_required() && frame.timestamp > self.clock {
                        // The caller was parked until this frame became visible.
                        self.clock = frame.timestamp;
                    }
                    trace!(msg_type = frame.msg_type, timestamp = frame.timestamp, "frame received");
                    return Ok(frame);
                }
            }
        }
    }

    fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }
}

impl std::fmt::Debug for BridgeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeTransport")
            .field("socket_path", &self.socket_path)
            .field("sync_mode", &self.sync_mode)
            .field("link_latency", &self.link_latency)
            .field("established", &self.established)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
