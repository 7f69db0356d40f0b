//! Memory request/response protocol.
//!
//! Read and write requests travel host to memory; each is answered by exactly
//! one completion before the next request may be sent.
//!
//! # Bodies
//!
//! ```text
//! read request     [request_id:u64][address:u64][length:u32][address_space:u32]
//! write request    [request_id:u64][address:u64][length:u32][address_space:u32][data:length]
//! read completion  [request_id:u64][data...]
//! write completion [request_id:u64]
//! ```
//!
//! Correlation is positional; the request id is carried so a multiplexed
//! extension could match completions by id.

use tracing::{debug, error};

use super::transport::{BridgeTransport, Link};
use super::wire::{Frame, msg};
use crate::common::constants::DEFAULT_ADDRESS_SPACE;
use crate::common::data::AccessSize;
use crate::common::error::{BridgeError, FrameError, ProtocolError};

const REQUEST_HEADER_LEN: usize = 24;
const COMPLETION_HEADER_LEN: usize = 8;

/// Direction of a memory request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// Load from the backend.
    Read,
    /// Store to the backend.
    Write,
}

impl RequestKind {
    /// Wire message type of the request.
    pub const fn msg_type(self) -> u8 {
        match self {
            Self::Read => msg::H2M_READ,
            Self::Write => msg::H2M_WRITE,
        }
    }
}

/// A decoded memory request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemRequest {
    /// Request direction.
    pub kind: RequestKind,
    /// Identifier assigned by the host.
    pub request_id: u64,
    /// Window-relative address.
    pub address: u64,
    /// Access length in bytes (1..=8).
    pub length: u32,
    /// Address-space identifier.
    pub address_space: u32,
    /// Store data; empty for reads.
    pub payload: Vec<u8>,
}

impl MemRequest {
    /// Encodes the request body.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(REQUEST_HEADER_LEN + self.payload.len());
        body.extend_from_slice(&self.request_id.to_le_bytes());
        body.extend_from_slice(&self.address.to_le_bytes());
        body.extend_from_slice(&self.length.to_le_bytes());
        body.extend_from_slice(&self.address_space.to_le_bytes());
        body.extend_from_slice(&self.payload);
        body
    }

    /// Decodes a request frame; returns `None` for non-request message types.
    ///
    /// # Errors
    ///
    /// `FrameError::Truncated` if the body is shorter than its header or, for
    /// writes, than the declared length.
    pub fn decode(frame: &Frame) -> Result<Option<Self>, FrameError> {
        let kind = match frame.msg_type {
            msg::H2M_READ => RequestKind::Read,
            msg::H2M_WRITE => RequestKind::Write,
            _ => return Ok(None),
        };
        let body = &frame.body;
        if body.len() < REQUEST_HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: REQUEST_HEADER_LEN,
                actual: body.len(),
            });
        }
        let request_id = le_u64(&body[0..8]);
        let address = le_u64(&body[8..16]);
        let length = u32::from_le_bytes([body[16], body[17], body[18], body[19]]);
        let address_space = u32::from_le_bytes([body[20], body[21], body[22], body[23]]);

        let payload = match kind {
            RequestKind::Read => Vec::new(),
            RequestKind::Write => {
                let end = REQUEST_HEADER_LEN + length as usize;
                if body.len() < end {
                    return Err(FrameError::Truncated {
                        expected: end,
                        actual: body.len(),
                    });
                }
                body[REQUEST_HEADER_LEN..end].to_vec()
            }
        };

        Ok(Some(Self {
            kind,
            request_id,
            address,
            length,
            address_space,
            payload,
        }))
    }
}

/// Typed answer to a memory request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Data for a read; exactly the requested length once accepted by [`MemProtocol`].
    ReadComplete(Vec<u8>),
    /// Acknowledgement of a write.
    WriteComplete,
}

impl Completion {
    /// Returns the wire message type and body answering `request_id`.
    pub fn encode(&self, request_id: u64) -> (u8, Vec<u8>) {
        let mut body = request_id.to_le_bytes().to_vec();
        match self {
            Self::ReadComplete(data) => {
                body.extend_from_slice(data);
                (msg::M2H_READ_COMPLETE, body)
            }
            Self::WriteComplete => (msg::M2H_WRITE_COMPLETE, body),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Outstanding {
    request_id: u64,
    kind: RequestKind,
    length: usize,
    sent_at: u64,
}

/// Host side of the request protocol over a [`Link`].
///
/// Strictly one request in flight: [`submit`](Self::submit) followed by
/// [`complete`](Self::complete), or both at once through [`request`](Self::request).
/// Any transport or protocol failure poisons the instance; later requests fail
/// with [`BridgeError::Poisoned`] and the link should be closed.
pub struct MemProtocol<L: Link = BridgeTransport> {
    link: L,
    next_request_id: u64,
    outstanding: Option<Outstanding>,
    poisoned: bool,
}

impl<L: Link> MemProtocol<L> {
    /// Wraps an established link.
    pub const fn new(link: L) -> Self {
        Self {
            link,
            next_request_id: 0,
            outstanding: None,
            poisoned: false,
        }
    }

    /// Sends a request without waiting for its completion.
    ///
    /// # Errors
    ///
    /// * `Reentrancy` - a previous request has not been completed.
    /// * `Poisoned` - an earlier failure disabled the bridge.
    /// * `Protocol(PayloadLength)` - write payload length differs from `length`.
    /// * `Transport` - the send failed (poisons the protocol).
    pub fn submit(
        &mut self,
        kind: RequestKind,
        address: u64,
        length: AccessSize,
        payload: Option<&[u8]>,
    ) -> Result<u64, BridgeError> {
        if self.poisoned {
            return Err(BridgeError::Poisoned);
        }
        if let Some(pending) = self.outstanding {
            return Err(BridgeError::Reentrancy {
                outstanding: pending.request_id,
            });
        }

        let payload = match (kind, payload) {
            (RequestKind::Read, _) => Vec::new(),
            (RequestKind::Write, data) => {
                let data = data.unwrap_or_default();
                if data.len() != length.bytes() {
                    return Err(ProtocolError::PayloadLength {
                        expected: length.bytes(),
                        actual: data.len(),
                    }
                    .into());
                }
                data.to_vec()
            }
        };

        let request = MemRequest {
            kind,
            request_id: self.next_request_id,
            address,
            length: length.bytes() as u32,
            address_space: DEFAULT_ADDRESS_SPACE,
            payload,
        };
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let sent_at = self
            .link
            .send(kind.msg_type(), &request.encode())
            .inspect_err(|_| self.poisoned = true)?;
        debug!(
            request_id = request.request_id,
            ?kind,
            address = format_args!("{address:#x}"),
            length = request.length,
            "memory request sent"
        );

        self.outstanding = Some(Outstanding {
            request_id: request.request_id,
            kind,
            length: length.bytes(),
            sent_at,
        });
        Ok(request.request_id)
    }

    /// Blocks until the outstanding request completes.
    ///
    /// # Errors
    ///
    /// * `Idle` - nothing was submitted.
    /// * `Transport` - the wait failed.
    /// * `Protocol` - the completion does not answer the request.
    ///
    /// Transport and protocol errors poison the protocol.
    pub fn complete(&mut self) -> Result<Completion, BridgeError> {
        if self.poisoned {
            return Err(BridgeError::Poisoned);
        }
        let pending = self.outstanding.take().ok_or(BridgeError::Idle)?;

        let frame = self
            .link
            .poll_blocking()
            .inspect_err(|_| self.poisoned = true)?;

        self.interpret(&pending, frame).map_err(|err| {
            error!(request_id = pending.request_id, %err, "invalid completion from memory backend");
            self.poisoned = true;
            BridgeError::Protocol(err)
        })
    }

    /// Sends a request and waits for its completion.
    ///
    /// # Errors
    ///
    /// Everything [`submit`](Self::submit) and [`complete`](Self::complete) report.
    pub fn request(
        &mut self,
        kind: RequestKind,
        address: u64,
        length: AccessSize,
        payload: Option<&[u8]>,
    ) -> Result<Completion, BridgeError> {
        let _ = self.submit(kind, address, length, payload)?;
        self.complete()
    }

    /// Returns `true` if an earlier failure disabled this protocol.
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the id of the unresolved request, if any.
    pub fn outstanding(&self) -> Option<u64> {
        self.outstanding.map(|p| p.request_id)
    }

    /// Returns the underlying link.
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Returns the underlying link mutably.
    pub const fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Unwraps the link, e.g. to close it.
    pub fn into_link(self) -> L {
        self.link
    }

    fn interpret(&self, pending: &Outstanding, frame: Frame) -> Result<Completion, ProtocolError> {
        if self.link.sync_mode().is_required() && frame.timestamp < pending.sent_at {
            return Err(ProtocolError::CausalityViolation {
                request: pending.sent_at,
                completion: frame.timestamp,
            });
        }
        if frame.body.len() < COMPLETION_HEADER_LEN {
            return Err(ProtocolError::ShortPayload {
                expected: COMPLETION_HEADER_LEN,
                actual: frame.body.len(),
            });
        }

        match (pending.kind, frame.msg_type) {
            (RequestKind::Read, msg::M2H_READ_COMPLETE) => {
                let data = &frame.body[COMPLETION_HEADER_LEN..];
                if data.len() < pending.length {
                    return Err(ProtocolError::ShortPayload {
                        expected: pending.length,
                        actual: data.len(),
                    });
                }
                Ok(Completion::ReadComplete(data[..pending.length].to_vec()))
            }
            (RequestKind::Write, msg::M2H_WRITE_COMPLETE) => Ok(Completion::WriteComplete),
            (_, other) => Err(ProtocolError::UnexpectedKind(other)),
        }
    }
}

impl<L: Link> std::fmt::Debug for MemProtocol<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemProtocol")
            .field("next_request_id", &self.next_request_id)
            .field("outstanding", &self.outstanding())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
