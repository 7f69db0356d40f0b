//! # Memory Transaction Type Tests

use farmem_core::common::{AccessError, AccessSize, MemTx};
use rstest::rstest;

#[rstest]
#[case(1, AccessSize::Byte)]
#[case(2, AccessSize::Half)]
#[case(4, AccessSize::Word)]
#[case(8, AccessSize::Double)]
fn test_access_size_from_len(#[case] len: usize, #[case] expected: AccessSize) {
    let size = AccessSize::try_from(len).unwrap();
    assert_eq!(size, expected);
    assert_eq!(size.bytes(), len);
}

#[rstest]
#[case(0)]
#[case(3)]
#[case(16)]
fn test_access_size_rejects(#[case] len: usize) {
    let err = AccessSize::try_from(len).unwrap_err();
    assert!(matches!(err, AccessError::InvalidAccessSize(n) if n == len));
}

#[test]
fn test_access_sizes_ascending() {
    let lens: Vec<usize> = AccessSize::ALL.iter().map(|s| s.bytes()).collect();
    assert_eq!(lens, vec![1, 2, 4, 8]);
}

#[test]
fn test_memtx_is_ok() {
    assert!(MemTx::Ok.is_ok());
    assert!(!MemTx::Error.is_ok());
}
