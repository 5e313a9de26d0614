use super::*;

const TOP: KeyHash = u128::MAX;

#[test]
fn test_key_hash_is_stable() {
    assert_eq!(key_hash("book_100"), key_hash("book_100"));
    assert_ne!(key_hash("book_100"), key_hash("book_101"));
    assert_eq!(key_hash(""), xxh3_128(b""));
}

#[test]
fn test_hash_hex_round_trip() {
    let hash = key_hash("some-key");
    let hex = format_hash(hash);
    assert_eq!(hex.len(), 32);
    assert_eq!(parse_hash(&hex).unwrap(), hash);

    assert_eq!(format_hash(10), "0000000000000000000000000000000a");
    assert_eq!(parse_hash("0xff").unwrap(), 255);
    assert!(parse_hash("").is_err());
    assert!(parse_hash("xyz").is_err());
    assert!(parse_hash(&"f".repeat(33)).is_err());
}

#[test]
fn test_plain_range_is_half_open() {
    let range = KeyRange::new(100, 200);
    assert!(!range.wraps());
    assert!(range.contains(100));
    assert!(range.contains(199));
    assert!(!range.contains(200));
    assert!(!range.contains(99));
}

#[test]
fn test_wrapped_range_spans_zero() {
    let range = KeyRange::new(TOP - 0x0f, 0x0a);
    assert!(range.wraps());

    assert!(range.contains(0x05));
    assert!(range.contains(0));
    assert!(range.contains(TOP));
    assert!(range.contains(TOP - 0x0f));
    assert!(!range.contains(0x0a));
    assert!(!range.contains(1u128 << 127));
}

#[test]
fn test_equal_bounds_cover_whole_ring() {
    let range = KeyRange::new(42, 42);
    assert!(range.wraps());
    assert!(range.contains(0));
    assert!(range.contains(42));
    assert!(range.contains(TOP));
}

#[test]
fn test_no_range_owns_nothing() {
    assert!(!is_key_in_range(0, None));
    assert!(!is_key_in_range(TOP, None));
    assert!(is_key_in_range(5, Some(&KeyRange::new(0, 10))));
}

#[test]
fn test_from_bounds() {
    assert_eq!(KeyRange::from_bounds(None, None), Ok(None));
    assert_eq!(
        KeyRange::from_bounds(Some(1), Some(2)),
        Ok(Some(KeyRange::new(1, 2)))
    );
    assert_eq!(
        KeyRange::from_bounds(Some(1), None),
        Err(RangeError::HalfSpecified)
    );
}

#[test]
fn test_metadata_wire_format() {
    let entries = vec![
        RingEntry {
            range: KeyRange::new(0, 1 << 127),
            address: "127.0.0.1:50000".to_string(),
        },
        RingEntry {
            range: KeyRange::new(1 << 127, 0),
            address: "127.0.0.1:50001".to_string(),
        },
    ];

    let wire = format_metadata(&entries);
    assert_eq!(
        wire,
        "00000000000000000000000000000000,80000000000000000000000000000000,127.0.0.1:50000;\
         80000000000000000000000000000000,00000000000000000000000000000000,127.0.0.1:50001;"
    );
    assert_eq!(parse_metadata(&wire).unwrap(), entries);
    assert!(parse_metadata("0,1;").is_err());
    assert!(parse_metadata("").unwrap().is_empty());
}

#[test]
fn test_key_range_json_uses_hex() {
    let range = KeyRange::new(1, 255);
    let json = serde_json::to_value(range).unwrap();
    assert_eq!(json["low"], "00000000000000000000000000000001");
    assert_eq!(json["high"], "000000000000000000000000000000ff");

    let back: KeyRange = serde_json::from_value(json).unwrap();
    assert_eq!(back, range);
}

#[test]
fn test_cluster_state_updates_are_visible() {
    let state = ClusterState::new("127.0.0.1:50000", None);
    assert!(!state.is_responsible("anything"));
    assert!(state.keyrange().is_err());

    state.set_range(Some(KeyRange::new(7, 7)));
    assert!(state.is_responsible("anything"));

    state.set_write_locked(true);
    assert!(state.is_write_locked());
    state.set_write_locked(false);
    assert!(!state.is_write_locked());
}

#[test]
fn test_keyrange_falls_back_to_own_range() {
    let state = ClusterState::new("10.0.0.1:5000", Some(KeyRange::new(1, 2)));
    assert_eq!(
        state.keyrange().unwrap(),
        "00000000000000000000000000000001,00000000000000000000000000000002,10.0.0.1:5000;"
    );

    let table = parse_metadata(
        "00000000000000000000000000000001,00000000000000000000000000000002,a:1;\
         00000000000000000000000000000002,00000000000000000000000000000001,b:2;",
    )
    .unwrap();
    state.set_metadata(table.clone());
    assert_eq!(state.keyrange().unwrap(), format_metadata(&table));
    assert_eq!(state.metadata(), table);
}
