//! # Transport Lifecycle Tests
//!
//! Connect, handshake, logical time, and close against real Unix sockets.

use crate::common::harness::{EchoPeer, RawPeer, answer_intro, init_tracing, socket_dir};
use farmem_core::bridge::wire::{self, msg};
use farmem_core::bridge::{
    BridgeParams, BridgeTransport, Completion, MemProtocol, MemoryPeer, RequestKind, SyncMode,
};
use farmem_core::common::{
    AccessSize, BridgeError, ConnectError, HandshakeError, Slot, TransportError,
};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// ══════════════════════════════════════════════════════════
// 1. Connect failures
// ══════════════════════════════════════════════════════════

#[test]
fn test_missing_socket_is_connect_error() {
    init_tracing();
    let (_dir, path) = socket_dir();
    let slot = Slot::new("bridge");

    let err = BridgeTransport::connect(&slot, BridgeParams::new(&path)).unwrap_err();
    assert!(matches!(err, ConnectError::Connect { path: p, .. } if p == path));
    assert!(!slot.is_occupied());
}

#[test]
fn test_empty_path_is_init_error() {
    let slot = Slot::new("bridge");
    let err = BridgeTransport::connect(&slot, BridgeParams::new("")).unwrap_err();
    assert!(matches!(err, ConnectError::Init(_)));
}

#[test]
fn test_zero_timeout_is_init_error() {
    let slot = Slot::new("bridge");
    let params = BridgeParams::new("/tmp/unused.sock").with_poll_timeout(Duration::ZERO);
    let err = BridgeTransport::connect(&slot, params).unwrap_err();
    assert!(matches!(err, ConnectError::Init(_)));
}

#[test]
fn test_held_slot_is_already_connected() {
    let slot = Slot::new("bridge");
    let _lease = slot.claim().unwrap();
    let err = BridgeTransport::connect(&slot, BridgeParams::new("/tmp/unused.sock")).unwrap_err();
    assert!(matches!(err, ConnectError::AlreadyConnected));
}

#[test]
fn test_immediately_closing_peer_fails_handshake() {
    let peer = RawPeer::spawn(drop);
    let slot = Slot::new("bridge");

    let err = BridgeTransport::connect(&slot, BridgeParams::new(&peer.path)).unwrap_err();
    assert!(matches!(
        err,
        ConnectError::Handshake(HandshakeError::Io(_)) | ConnectError::NotConnected
    ));
    assert!(!slot.is_occupied());
    peer.join();
}

#[test]
fn test_sync_mismatch_fails_handshake() {
    init_tracing();
    let (_dir, path) = socket_dir();
    let peer = MemoryPeer::bind(&path, SyncMode::Required, 0).unwrap();
    let server = thread::spawn(move || peer.accept().map(|_| ()));

    let slot = Slot::new("bridge");
    let err = BridgeTransport::connect(&slot, BridgeParams::new(&path)).unwrap_err();
    assert!(matches!(
        err,
        ConnectError::Handshake(HandshakeError::SyncMismatch {
            local: false,
            remote: true
        })
    ));
    assert!(server.join().unwrap().is_err());
}

// ══════════════════════════════════════════════════════════
// 2. Established sessions
// ══════════════════════════════════════════════════════════

#[test]
fn test_connect_then_close_releases_slot() {
    let peer = EchoPeer::spawn(64, SyncMode::Disabled);
    let slot = Slot::new("bridge");

    let transport = BridgeTransport::connect(&slot, BridgeParams::new(&peer.path)).unwrap();
    assert!(transport.is_established());
    assert_eq!(transport.link_latency(), 500_000);
    assert!(matches!(
        BridgeTransport::connect(&slot, BridgeParams::new(&peer.path)),
        Err(ConnectError::AlreadyConnected)
    ));

    transport.close();
    assert!(!slot.is_occupied());

    let (_, stats) = peer.finish().unwrap();
    assert_eq!(stats.reads + stats.writes, 0);
}

#[test]
fn test_required_sync_advances_clock_to_completion() {
    let peer = RawPeer::spawn(|mut stream| {
        let _ = answer_intro(&mut stream, SyncMode::Required);
        wire::write_frame(&mut stream, msg::SYNC, 50, &[]).unwrap();

        let request = wire::read_frame(&mut stream).unwrap();
        assert_eq!(request.msg_type, msg::H2M_READ);
        assert_eq!(request.timestamp, 10);

        let mut body = request.body[0..8].to_vec();
        body.push(0x5A);
        wire::write_frame(&mut stream, msg::M2H_READ_COMPLETE, 110, &body).unwrap();
        let _ = wire::read_frame(&mut stream);
    });

    let slot = Slot::new("bridge");
    let params = BridgeParams::new(&peer.path)
        .with_sync_mode(SyncMode::Required)
        .with_link_latency(10);
    let transport = BridgeTransport::connect(&slot, params).unwrap();
    let mut protocol = MemProtocol::new(transport);

    let completion = protocol
        .request(RequestKind::Read, 0x20, AccessSize::Byte, None)
        .unwrap();
    assert_eq!(completion, Completion::ReadComplete(vec![0x5A]));
    assert_eq!(protocol.link().now(), 110);
    assert_eq!(protocol.link().peer_time(), 50);

    protocol.into_link().close();
    peer.join();
}

#[test]
fn test_advance_to_never_moves_backward() {
    let peer = EchoPeer::spawn(8, SyncMode::Required);
    let slot = Slot::new("bridge");
    let params = BridgeParams::new(&peer.path).with_sync_mode(SyncMode::Required);
    let mut transport = BridgeTransport::connect(&slot, params).unwrap();

    transport.advance_to(1_000);
    transport.advance_to(400);
    assert_eq!(transport.now(), 1_000);
    transport.send_sync().unwrap();
    transport.close();

    let (_, stats) = peer.finish().unwrap();
    assert_eq!(stats.syncs, 1);
}

#[test]
fn test_poll_timeout_when_configured() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let peer = RawPeer::spawn(move |mut stream| {
        let _ = answer_intro(&mut stream, SyncMode::Disabled);
        let _ = wire::read_frame(&mut stream);
        let _ = release_rx.recv();
    });

    let slot = Slot::new("bridge");
    let params = BridgeParams::new(&peer.path).with_poll_timeout(Duration::from_millis(50));
    let transport = BridgeTransport::connect(&slot, params).unwrap();
    let mut protocol = MemProtocol::new(transport);

    let err = protocol
        .request(RequestKind::Read, 0, AccessSize::Word, None)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Transport(TransportError::TimedOut)));

    release_tx.send(()).unwrap();
    protocol.into_link().close();
    peer.join();
}

#[test]
fn test_peer_terminate_surfaces_as_terminated() {
    let peer = RawPeer::spawn(|mut stream| {
        let _ = answer_intro(&mut stream, SyncMode::Disabled);
        let _ = wire::read_frame(&mut stream);
        wire::write_frame(&mut stream, msg::TERMINATE, 0, &[]).unwrap();
    });

    let slot = Slot::new("bridge");
    let transport = BridgeTransport::connect(&slot, BridgeParams::new(&peer.path)).unwrap();
    let mut protocol = MemProtocol::new(transport);

    let err = protocol
        .request(RequestKind::Write, 0, AccessSize::Byte, Some(&[1]))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Transport(TransportError::Terminated)));
    assert!(protocol.is_poisoned());
    peer.join();
}
