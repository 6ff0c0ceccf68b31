//! Property-based tests for the bounded stream buffer using proptest.
//!
//! Properties verified:
//! - Length never exceeds capacity
//! - After overflow the buffer holds exactly the newest `capacity` entries
//! - Appending never reorders retained entries
//! - The persistent `append` and in-place `push` agree

#![allow(clippy::indexing_slicing, clippy::cast_possible_truncation)]

use meerkat_telemetry::BoundedBuffer;
use proptest::prelude::*;

fn filled(capacity: usize, entries: &[u32]) -> BoundedBuffer<u32> {
    let mut buffer = BoundedBuffer::with_capacity(capacity);
    for entry in entries {
        buffer.push(*entry);
    }
    buffer
}

proptest! {
    /// Property: the buffer never grows past its capacity.
    #[test]
    fn prop_length_bounded_by_capacity(
        capacity in 1usize..64,
        entries in prop::collection::vec(any::<u32>(), 0..256),
    ) {
        let buffer = filled(capacity, &entries);
        prop_assert!(buffer.len() <= capacity);
        prop_assert_eq!(buffer.len(), entries.len().min(capacity));
    }

    /// Property: after N > C appends the buffer equals the last C entries.
    #[test]
    fn prop_overflow_keeps_newest_suffix(
        capacity in 1usize..64,
        extra in 1usize..128,
    ) {
        let total = capacity + extra;
        let entries: Vec<u32> = (0..total).map(|n| n as u32).collect();
        let buffer = filled(capacity, &entries);

        let kept: Vec<u32> = buffer.iter().copied().collect();
        prop_assert_eq!(kept.len(), capacity);
        prop_assert_eq!(&kept[..], &entries[total - capacity..]);
    }

    /// Property: retained entries keep their relative order across appends.
    #[test]
    fn prop_append_never_reorders(
        capacity in 1usize..32,
        entries in prop::collection::vec(any::<u32>(), 1..128),
        next in any::<u32>(),
    ) {
        let before: Vec<u32> = filled(capacity, &entries).iter().copied().collect();
        let after: Vec<u32> = filled(capacity, &entries).append(next).iter().copied().collect();

        prop_assert_eq!(after.last().copied(), Some(next));
        let survivors = &after[..after.len() - 1];
        let offset = before.len() - survivors.len();
        prop_assert_eq!(survivors, &before[offset..]);
    }

    /// Property: `append` leaves the original untouched and matches `push`.
    #[test]
    fn prop_append_matches_push(
        capacity in 1usize..32,
        entries in prop::collection::vec(any::<u32>(), 0..64),
        next in any::<u32>(),
    ) {
        let original = filled(capacity, &entries);
        let appended = original.append(next);

        let mut pushed = original.clone();
        pushed.push(next);

        prop_assert_eq!(appended.snapshot(), pushed.snapshot());
        prop_assert_eq!(original.snapshot(), filled(capacity, &entries).snapshot());
    }
}
