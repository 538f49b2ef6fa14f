use super::*;

#[test]
fn disjoint_ranges_stay_separate() {
    let mut buf = SourceBuffer::new();
    assert!(buf.insert(0, &[1, 2, 3]).unwrap());
    assert!(buf.insert(10, &[4, 5]).unwrap());
    assert_eq!(buf.range_count(), 2);
    assert_eq!(buf.get(0, 3), Some(&[1u8, 2, 3][..]));
    assert_eq!(buf.get(10, 2), Some(&[4u8, 5][..]));
    assert_eq!(buf.get(2, 2), None);
    assert_eq!(buf.contiguous_len(1), 2);
    assert_eq!(buf.contiguous_len(5), 0);
}

#[test]
fn touching_and_overlapping_ranges_merge() {
    let mut buf = SourceBuffer::new();
    buf.insert(0, &[0, 1, 2]).unwrap();
    buf.insert(6, &[6, 7]).unwrap();
    // Touches the first range and overlaps the second.
    buf.insert(3, &[3, 4, 5, 6]).unwrap();
    assert_eq!(buf.range_count(), 1);
    assert_eq!(buf.get(0, 8), Some(&[0u8, 1, 2, 3, 4, 5, 6, 7][..]));
    assert_eq!(buf.total_len(), 8);
}

#[test]
fn reinserting_held_bytes_is_a_no_op() {
    let mut buf = SourceBuffer::new();
    buf.insert(0, &[9; 32]).unwrap();
    assert!(!buf.insert(8, &[9; 8]).unwrap());
    assert!(!buf.insert(0, &[]).unwrap());
    assert_eq!(buf.range_count(), 1);
    assert_eq!(buf.total_len(), 32);
}

#[test]
fn insert_before_existing_range_keeps_order() {
    let mut buf = SourceBuffer::new();
    buf.insert(100, &[1]).unwrap();
    buf.insert(10, &[2]).unwrap();
    buf.insert(50, &[3]).unwrap();
    assert_eq!(buf.range_count(), 3);
    assert_eq!(buf.get(10, 1), Some(&[2u8][..]));
    assert_eq!(buf.get(50, 1), Some(&[3u8][..]));
    assert_eq!(buf.get(100, 1), Some(&[1u8][..]));
    buf.clear();
    assert_eq!(buf.total_len(), 0);
}

#[test]
fn ranges_near_the_top_of_the_offset_space_do_not_wrap() {
    let mut buf = SourceBuffer::new();
    let err = buf.insert(u64::MAX - 1, &[1, 2, 3]).unwrap_err();
    assert!(matches!(err, PlayerError::Container(_)));
    assert_eq!(buf.range_count(), 0);

    assert!(buf.insert(u64::MAX - 2, &[1, 2]).unwrap());
    assert_eq!(buf.get(u64::MAX - 2, 2), Some(&[1u8, 2][..]));
    assert_eq!(buf.get(u64::MAX - 1, u64::MAX), None);
}
