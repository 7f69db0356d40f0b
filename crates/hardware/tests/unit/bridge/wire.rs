//! # Wire Format Tests
//!
//! Handshake outcomes over a socket pair, and frame decoding limits.

use farmem_core::bridge::wire::{
    self, FRAME_HEADER_LEN, INTRO_LEN, Intro, MAX_BODY_LEN, Role, msg,
};
use farmem_core::common::{FrameError, HandshakeError, TransportError};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

fn host(sync_required: bool) -> Intro {
    Intro {
        role: Role::Host,
        sync_required,
        link_latency: 500_000,
    }
}

fn memory(sync_required: bool) -> Intro {
    Intro {
        role: Role::Memory,
        sync_required,
        link_latency: 0,
    }
}

// ══════════════════════════════════════════════════════════
// 1. Introduction exchange
// ══════════════════════════════════════════════════════════

#[test]
fn test_exchange_succeeds_and_sends_local_record() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    b.write_all(&memory(false).encode()).unwrap();

    let remote = wire::exchange_intro(&mut a, &host(false), Role::Memory).unwrap();
    assert_eq!(remote, memory(false));

    let mut sent = [0u8; INTRO_LEN];
    b.read_exact(&mut sent).unwrap();
    assert_eq!(Intro::decode(&sent).unwrap(), host(false));
}

#[test]
fn test_exchange_sync_mismatch() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    b.write_all(&memory(true).encode()).unwrap();

    let err = wire::exchange_intro(&mut a, &host(false), Role::Memory).unwrap_err();
    assert!(matches!(
        err,
        HandshakeError::SyncMismatch {
            local: false,
            remote: true
        }
    ));
}

#[test]
fn test_exchange_role_mismatch() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    b.write_all(&host(false).encode()).unwrap();

    let err = wire::exchange_intro(&mut a, &host(false), Role::Memory).unwrap_err();
    assert!(matches!(err, HandshakeError::RoleMismatch(1)));
}

#[test]
fn test_exchange_bad_magic() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    b.write_all(&[0u8; INTRO_LEN]).unwrap();

    let err = wire::exchange_intro(&mut a, &host(false), Role::Memory).unwrap_err();
    assert!(matches!(err, HandshakeError::BadMagic(0)));
}

#[test]
fn test_exchange_version_mismatch() {
    let mut record = memory(false).encode();
    record[4..6].copy_from_slice(&7u16.to_le_bytes());
    let err = Intro::decode(&record).unwrap_err();
    assert!(matches!(
        err,
        HandshakeError::VersionMismatch {
            local: 1,
            remote: 7
        }
    ));
}

#[test]
fn test_exchange_peer_gone() {
    let (mut a, b) = UnixStream::pair().unwrap();
    drop(b);

    let err = wire::exchange_intro(&mut a, &host(false), Role::Memory).unwrap_err();
    assert!(matches!(err, HandshakeError::Io(_)));
}

// ══════════════════════════════════════════════════════════
// 2. Frames
// ══════════════════════════════════════════════════════════

#[test]
fn test_read_frame_rejects_oversized_length() {
    let mut header = vec![0u8; FRAME_HEADER_LEN];
    header[0] = msg::H2M_READ;
    header[4..8].copy_from_slice(&(MAX_BODY_LEN + 1).to_le_bytes());

    let err = wire::read_frame(&mut header.as_slice()).unwrap_err();
    assert!(matches!(
        err,
        TransportError::Frame(FrameError::Oversized(n)) if n == MAX_BODY_LEN + 1
    ));
}

#[test]
fn test_write_frame_rejects_oversized_body() {
    let body = vec![0u8; MAX_BODY_LEN as usize + 1];
    let mut out = Vec::new();
    let err = wire::write_frame(&mut out, msg::H2M_WRITE, 0, &body).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    assert!(out.is_empty());
}

#[test]
fn test_read_timeout_maps_to_timed_out() {
    let (mut a, _b) = UnixStream::pair().unwrap();
    a.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

    let err = wire::read_frame(&mut a).unwrap_err();
    assert!(matches!(err, TransportError::TimedOut));
}

#[test]
fn test_frames_arrive_in_order() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    wire::write_frame(&mut a, msg::SYNC, 5, &[]).unwrap();
    wire::write_frame(&mut a, msg::H2M_READ, 9, &[1, 2, 3]).unwrap();

    let first = wire::read_frame(&mut b).unwrap();
    let second = wire::read_frame(&mut b).unwrap();
    assert_eq!((first.msg_type, first.timestamp), (msg::SYNC, 5));
    assert_eq!(second.body, vec![1, 2, 3]);
}
