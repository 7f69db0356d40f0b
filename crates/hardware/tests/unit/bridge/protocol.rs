//! # Request Protocol Tests
//!
//! Drives `MemProtocol` through a mock link so every completion shape,
//! including malformed ones, can be produced on demand.

use crate::common::mocks::link::{MockBridgeLink, read_completion, write_completion};
use farmem_core::bridge::wire::msg;
use farmem_core::bridge::{Completion, MemProtocol, RequestKind, SyncMode};
use farmem_core::common::{AccessSize, BridgeError, ProtocolError, TransportError};
use pretty_assertions::assert_eq;

fn link(sync_mode: SyncMode) -> MockBridgeLink {
    let mut link = MockBridgeLink::new();
    link.expect_sync_mode().return_const(sync_mode);
    link
}

// ══════════════════════════════════════════════════════════
// 1. Successful requests
// ══════════════════════════════════════════════════════════

#[test]
fn test_write_request_body() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send()
        .withf(|msg_type, body| {
            *msg_type == msg::H2M_WRITE
                && body.len() == 24 + 4
                && body[8..16] == 0x40u64.to_le_bytes()
                && body[16..20] == 4u32.to_le_bytes()
                && body[24..] == [0xEF, 0xBE, 0xAD, 0xDE]
        })
        .times(1)
        .returning(|_, _| Ok(10));
    link.expect_poll_blocking()
        .times(1)
        .returning(|| Ok(write_completion(0, 10)));

    let mut protocol = MemProtocol::new(link);
    let completion = protocol
        .request(
            RequestKind::Write,
            0x40,
            AccessSize::Word,
            Some(&[0xEF, 0xBE, 0xAD, 0xDE]),
        )
        .unwrap();
    assert_eq!(completion, Completion::WriteComplete);
    assert_eq!(protocol.outstanding(), None);
}

#[test]
fn test_read_copies_exactly_length() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send()
        .withf(|msg_type, body| *msg_type == msg::H2M_READ && body.len() == 24)
        .returning(|_, _| Ok(0));
    link.expect_poll_blocking()
        .returning(|| Ok(read_completion(0, 0, &[1, 2, 3, 4, 5, 6])));

    let mut protocol = MemProtocol::new(link);
    let completion = protocol
        .request(RequestKind::Read, 0, AccessSize::Half, None)
        .unwrap();
    assert_eq!(completion, Completion::ReadComplete(vec![1, 2]));
}

#[test]
fn test_request_ids_increase() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send().times(2).returning(|_, _| Ok(0));
    link.expect_poll_blocking()
        .times(2)
        .returning(|| Ok(write_completion(0, 0)));

    let mut protocol = MemProtocol::new(link);
    let first = protocol
        .submit(RequestKind::Write, 0, AccessSize::Byte, Some(&[1]))
        .unwrap();
    let _ = protocol.complete().unwrap();
    let second = protocol
        .submit(RequestKind::Write, 1, AccessSize::Byte, Some(&[2]))
        .unwrap();
    let _ = protocol.complete().unwrap();
    assert_eq!((first, second), (0, 1));
}

// ══════════════════════════════════════════════════════════
// 2. Single outstanding request
// ══════════════════════════════════════════════════════════

#[test]
fn test_second_submit_is_reentrancy() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send().times(1).returning(|_, _| Ok(0));
    link.expect_poll_blocking().never();

    let mut protocol = MemProtocol::new(link);
    let id = protocol
        .submit(RequestKind::Read, 0, AccessSize::Double, None)
        .unwrap();
    let err = protocol
        .submit(RequestKind::Read, 8, AccessSize::Double, None)
        .unwrap_err();

    assert!(matches!(err, BridgeError::Reentrancy { outstanding } if outstanding == id));
    assert_eq!(protocol.outstanding(), Some(id));
    assert!(!protocol.is_poisoned());
}

#[test]
fn test_complete_without_submit_is_idle() {
    let mut link = link(SyncMode::Disabled);
    link.expect_poll_blocking().never();

    let mut protocol = MemProtocol::new(link);
    assert!(matches!(protocol.complete(), Err(BridgeError::Idle)));
}

#[test]
fn test_payload_length_mismatch_sends_nothing() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send().never();

    let mut protocol = MemProtocol::new(link);
    let err = protocol
        .submit(RequestKind::Write, 0, AccessSize::Word, Some(&[1, 2]))
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Protocol(ProtocolError::PayloadLength {
            expected: 4,
            actual: 2
        })
    ));
    assert!(!protocol.is_poisoned());
}

// ══════════════════════════════════════════════════════════
// 3. Malformed completions poison the protocol
// ══════════════════════════════════════════════════════════

#[test]
fn test_short_read_completion() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send().times(1).returning(|_, _| Ok(0));
    link.expect_poll_blocking()
        .returning(|| Ok(read_completion(0, 0, &[9, 9])));

    let mut protocol = MemProtocol::new(link);
    let err = protocol
        .request(RequestKind::Read, 0, AccessSize::Word, None)
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Protocol(ProtocolError::ShortPayload {
            expected: 4,
            actual: 2
        })
    ));

    assert!(protocol.is_poisoned());
    let again = protocol.request(RequestKind::Read, 0, AccessSize::Word, None);
    assert!(matches!(again, Err(BridgeError::Poisoned)));
}

#[test]
fn test_mismatched_completion_kind() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send().returning(|_, _| Ok(0));
    link.expect_poll_blocking()
        .returning(|| Ok(write_completion(0, 0)));

    let mut protocol = MemProtocol::new(link);
    let err = protocol
        .request(RequestKind::Read, 0, AccessSize::Byte, None)
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Protocol(ProtocolError::UnexpectedKind(k)) if k == msg::M2H_WRITE_COMPLETE
    ));
}

#[test]
fn test_completion_before_request_violates_causality() {
    let mut link = link(SyncMode::Required);
    link.expect_send().returning(|_, _| Ok(1_000));
    link.expect_poll_blocking()
        .returning(|| Ok(write_completion(0, 999)));

    let mut protocol = MemProtocol::new(link);
    let err = protocol
        .request(RequestKind::Write, 0, AccessSize::Byte, Some(&[0]))
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Protocol(ProtocolError::CausalityViolation {
            request: 1_000,
            completion: 999
        })
    ));
}

#[test]
fn test_early_timestamp_ignored_without_sync() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send().returning(|_, _| Ok(1_000));
    link.expect_poll_blocking()
        .returning(|| Ok(write_completion(0, 0)));

    let mut protocol = MemProtocol::new(link);
    let completion = protocol
        .request(RequestKind::Write, 0, AccessSize::Byte, Some(&[0]))
        .unwrap();
    assert_eq!(completion, Completion::WriteComplete);
}

#[test]
fn test_transport_failure_poisons() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send().times(1).returning(|_, _| Ok(0));
    link.expect_poll_blocking()
        .times(1)
        .returning(|| Err(TransportError::Closed));

    let mut protocol = MemProtocol::new(link);
    let err = protocol
        .request(RequestKind::Read, 0, AccessSize::Byte, None)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Transport(TransportError::Closed)));
    assert!(matches!(
        protocol.submit(RequestKind::Read, 0, AccessSize::Byte, None),
        Err(BridgeError::Poisoned)
    ));
}

#[test]
fn test_send_failure_poisons() {
    let mut link = link(SyncMode::Disabled);
    link.expect_send()
        .times(1)
        .returning(|_, _| Err(TransportError::Closed));
    link.expect_poll_blocking().never();

    let mut protocol = MemProtocol::new(link);
    assert!(protocol
        .submit(RequestKind::Read, 0, AccessSize::Byte, None)
        .is_err());
    assert!(protocol.is_poisoned());
    assert_eq!(protocol.outstanding(), None);
}
