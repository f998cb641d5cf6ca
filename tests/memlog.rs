//! Binary trace-record parsing.

use symtrace::memlog::RECORD_SIZE;
use symtrace::{parse_trace, AddrFlag, AddrKind, AddrOp, TraceEntry, TraceParseError};

fn addr_record(op: u64, kind: u64, val: u64, off: u32, flag: i32) -> Vec<u8> {
    let mut record = vec![0u8; RECORD_SIZE];
    record[0..8].copy_from_slice(&0u64.to_le_bytes());
    record[8..16].copy_from_slice(&op.to_le_bytes());
    record[16..24].copy_from_slice(&kind.to_le_bytes());
    record[24..32].copy_from_slice(&val.to_le_bytes());
    record[32..36].copy_from_slice(&off.to_le_bytes());
    record[36..40].copy_from_slice(&flag.to_le_bytes());
    record
}

fn branch_record(taken: u32) -> Vec<u8> {
    let mut record = vec![0u8; RECORD_SIZE];
    record[0..8].copy_from_slice(&1u64.to_le_bytes());
    record[8..12].copy_from_slice(&taken.to_le_bytes());
    record
}

fn select_record(value: u32) -> Vec<u8> {
    let mut record = vec![0u8; RECORD_SIZE];
    record[0..8].copy_from_slice(&2u64.to_le_bytes());
    record[8..12].copy_from_slice(&value.to_le_bytes());
    record
}

#[test]
fn empty_trace_parses() {
    assert_eq!(parse_trace(&[]).unwrap(), vec![]);
}

#[test]
fn address_records_parse() {
    let bytes = addr_record(0, 1, 0x401000, 4, 0);
    let entries = parse_trace(&bytes).unwrap();
    match entries[0] {
        TraceEntry::Addr { op, addr } => {
            assert_eq!(op, AddrOp::Load);
            assert_eq!(addr.kind, AddrKind::MAddr);
            assert_eq!(addr.val, 0x401000);
            assert_eq!(addr.off, 4);
            assert_eq!(addr.flag, AddrFlag::None);
        },
        other => panic!("expected an address record, got {:?}", other),
    }
}

#[test]
fn all_address_kinds_decode() {
    for (kind_value, kind) in [
        (0, AddrKind::HAddr),
        (1, AddrKind::MAddr),
        (2, AddrKind::IAddr),
        (3, AddrKind::LAddr),
        (4, AddrKind::GReg),
        (5, AddrKind::GSpec),
        (6, AddrKind::Unk),
        (7, AddrKind::Const),
        (8, AddrKind::Ret),
    ] {
        let bytes = addr_record(1, kind_value, 7, 0, 0);
        match parse_trace(&bytes).unwrap()[0] {
            TraceEntry::Addr { addr, .. } => assert_eq!(addr.kind, kind),
            ref other => panic!("expected an address record, got {:?}", other),
        }
    }
}

#[test]
fn irrelevant_flag_is_read_signed() {
    // -1 occupies the flag field as 0xffffffff; it must decode as Irrelevant,
    // not as a huge unsigned value
    let bytes = addr_record(1, 1, 0, 0, -1);
    match parse_trace(&bytes).unwrap()[0] {
        TraceEntry::Addr { addr, .. } => assert_eq!(addr.flag, AddrFlag::Irrelevant),
        ref other => panic!("expected an address record, got {:?}", other),
    }
}

#[test]
fn branch_and_select_records_parse() {
    let mut bytes = branch_record(1);
    bytes.extend(select_record(0));
    let entries = parse_trace(&bytes).unwrap();
    assert_eq!(entries, vec![TraceEntry::Branch { taken: 1 }, TraceEntry::Select { value: 0 }]);
}

#[test]
fn unknown_entry_type_is_fatal() {
    let mut record = vec![0u8; RECORD_SIZE];
    record[0..8].copy_from_slice(&3u64.to_le_bytes());
    match parse_trace(&record) {
        Err(TraceParseError::UnknownEntryType { offset: 0, value: 3 }) => {},
        other => panic!("expected an unknown-entry-type error, got {:?}", other),
    }
}

#[test]
fn unknown_flag_is_fatal() {
    let bytes = addr_record(0, 1, 0, 0, 7);
    match parse_trace(&bytes) {
        Err(TraceParseError::UnknownAddrFlag { value: 7, .. }) => {},
        other => panic!("expected an unknown-flag error, got {:?}", other),
    }
}

#[test]
fn unknown_kind_and_op_are_fatal() {
    assert!(matches!(
        parse_trace(&addr_record(9, 1, 0, 0, 0)),
        Err(TraceParseError::UnknownAddrOp { value: 9, .. })
    ));
    assert!(matches!(
        parse_trace(&addr_record(0, 12, 0, 0, 0)),
        Err(TraceParseError::UnknownAddrKind { value: 12, .. })
    ));
}

#[test]
fn truncated_record_is_fatal() {
    let bytes = branch_record(0);
    match parse_trace(&bytes[..20]) {
        Err(TraceParseError::Truncated { offset: 0, remaining: 20 }) => {},
        other => panic!("expected a truncation error, got {:?}", other),
    }
    // a whole record followed by a partial one reports the partial's offset
    let mut bytes = branch_record(0);
    bytes.extend(&branch_record(0)[..8]);
    match parse_trace(&bytes) {
        Err(TraceParseError::Truncated { offset, remaining: 8 }) => {
            assert_eq!(offset, RECORD_SIZE)
        },
        other => panic!("expected a truncation error, got {:?}", other),
    }
}

#[test]
fn error_offsets_point_at_the_offending_record() {
    let mut bytes = branch_record(0);
    bytes.extend(addr_record(0, 1, 0, 0, 9));
    match parse_trace(&bytes) {
        Err(TraceParseError::UnknownAddrFlag { offset, value: 9 }) => {
            assert_eq!(offset, RECORD_SIZE)
        },
        other => panic!("expected an unknown-flag error, got {:?}", other),
    }
}
