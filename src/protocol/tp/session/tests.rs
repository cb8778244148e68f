//! Reassembly-session tests covering sequencing, capacity, and scavenging.
// SESSION TABLE
use super::*;

fn open(table: &mut SessionTable, session_number: u8, source: u8, size: usize, now: u64) {
    let packets = crate::protocol::tp::packets_for(size);
    let evicted = table.insert(0xEF00, source, session_number, size, packets, now);
    assert!(evicted.is_none(), "pool unexpectedly full");
}

#[test]
/// Rebuild a complete sixteen-byte message from three data packets.
fn test_full_reassembly() {
    let mut table = SessionTable::new();
    let key = session_key(2, 0x42);
    open(&mut table, 2, 0x42, 16, 0);

    let msg = table.get_mut(key).expect("session just opened");
    assert_eq!(msg.expected_sequence(), 1);
    assert_eq!(
        msg.append(1, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07], 10),
        AppendOutcome::Accepted
    );
    assert_eq!(
        msg.append(2, &[0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E], 20),
        AppendOutcome::Accepted
    );
    // Final packet: two payload bytes, the rest is padding.
    assert_eq!(
        msg.append(3, &[0x0F, 0x10, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 30),
        AppendOutcome::Completed
    );

    assert!(msg.is_complete());
    assert_eq!(msg.payload().len(), 16);
    assert_eq!(
        msg.payload(),
        &[
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
            0x0F, 0x10
        ]
    );
}

#[test]
/// A skipped sequence number is reported so the engine can abort.
fn test_out_of_sequence_packet() {
    let mut table = SessionTable::new();
    let key = session_key(3, 0x10);
    open(&mut table, 3, 0x10, 21, 0);

    let msg = table.get_mut(key).expect("session just opened");
    assert_eq!(msg.append(1, &[0; 7], 5), AppendOutcome::Accepted);
    assert_eq!(msg.append(3, &[0; 7], 6), AppendOutcome::OutOfSequence);
}

#[test]
/// The expected sequence wraps 15 → 1 past the fifteenth packet.
fn test_sequence_wrap() {
    let mut table = SessionTable::new();
    let key = session_key(2, 0x42);
    // 112 bytes: sixteen packets, one full wrap.
    open(&mut table, 2, 0x42, 112, 0);

    let msg = table.get_mut(key).expect("session just opened");
    for seq in 1..=15u8 {
        assert_eq!(msg.append(seq, &[seq; 7], 0), AppendOutcome::Accepted);
    }
    assert_eq!(msg.expected_sequence(), 1);
    assert_eq!(msg.append(1, &[0xAA; 7], 0), AppendOutcome::Completed);
    assert_eq!(msg.payload().len(), 112);
}

#[test]
/// A packet whose offset passes the announced size is an overrun.
fn test_overrun_packet() {
    let mut table = SessionTable::new();
    let key = session_key(2, 0x42);
    // Announce claims three packets but only fourteen bytes of payload.
    let evicted = table.insert(0xEF00, 0x42, 2, 14, 3, 0);
    assert!(evicted.is_none());

    let msg = table.get_mut(key).expect("session just opened");
    assert_eq!(msg.append(1, &[0; 7], 0), AppendOutcome::Accepted);
    assert_eq!(msg.append(2, &[0; 7], 0), AppendOutcome::Accepted);
    assert_eq!(msg.append(3, &[0; 7], 0), AppendOutcome::Overrun);
}

#[test]
/// Distinct keys reassemble independently.
fn test_multiple_concurrent_sessions() {
    let mut table = SessionTable::new();
    open(&mut table, 2, 0x10, 9, 0);
    open(&mut table, 2, 0x20, 10, 0);
    assert_eq!(table.len(), 2);

    let a = table.get_mut(session_key(2, 0x10)).expect("session A");
    assert_eq!(a.append(1, &[1; 7], 1), AppendOutcome::Accepted);
    assert_eq!(a.append(2, &[2; 7], 2), AppendOutcome::Completed);

    let b = table.get_mut(session_key(2, 0x20)).expect("session B");
    assert_eq!(b.append(1, &[3; 7], 1), AppendOutcome::Accepted);
    assert_eq!(b.append(2, &[4; 7], 2), AppendOutcome::Completed);

    assert_eq!(table.get(session_key(2, 0x10)).unwrap().payload()[0], 1);
    assert_eq!(table.get(session_key(2, 0x20)).unwrap().payload()[0], 3);
}

#[test]
/// Re-inserting a key replaces its session in place.
fn test_insert_replaces_same_key() {
    let mut table = SessionTable::new();
    open(&mut table, 2, 0x42, 16, 0);
    table
        .get_mut(session_key(2, 0x42))
        .expect("open session")
        .append(1, &[0; 7], 5);

    let evicted = table.insert(0xEF20, 0x42, 2, 21, 3, 10);
    assert!(evicted.is_none());
    assert_eq!(table.len(), 1);

    let replaced = table.get(session_key(2, 0x42)).expect("replaced session");
    assert_eq!(replaced.pgn(), 0xEF20);
    assert_eq!(replaced.packets_received(), 0);
    assert_eq!(replaced.total_size(), 21);
}

#[test]
/// Mutable iteration covers exactly the in-progress sessions.
fn test_iter_mut_touches_active_sessions() {
    let mut table = SessionTable::new();
    open(&mut table, 2, 0x10, 9, 0);
    open(&mut table, 3, 0x20, 9, 0);

    assert_eq!(table.iter_mut().count(), 2);
    for session in table.iter_mut() {
        session.touch(500);
    }
    assert_eq!(
        table
            .get(session_key(2, 0x10))
            .expect("first session")
            .last_activity_ms(),
        500
    );
}

#[test]
/// A full pool evicts the least-recently-active session.
fn test_pool_full_evicts_least_recently_active() {
    let mut table = SessionTable::new();
    for (i, source) in (0x10..0x10 + MAX_CONCURRENT_SESSIONS as u8).enumerate() {
        open(&mut table, 2, source, 14, i as u64 * 10);
    }
    assert_eq!(table.len(), MAX_CONCURRENT_SESSIONS);

    // Freshen the oldest-by-insertion slot so the second-oldest is evicted.
    table
        .get_mut(session_key(2, 0x10))
        .expect("first session")
        .touch(1000);

    let evicted = table.insert(0xEF00, 0x77, 3, 14, 2, 2000);
    assert_eq!(evicted, Some(session_key(2, 0x11)));
    assert!(table.contains(session_key(2, 0x10)));
    assert!(table.contains(session_key(3, 0x77)));
    assert!(!table.contains(session_key(2, 0x11)));
}

#[test]
/// Outbound session tags map to their diagnostic labels.
fn test_session_labels() {
    use crate::protocol::tp::{session_label, TX_SESSION_ROTATION};

    let labels: [&str; 6] = ["A", "B", "C", "D", "E", "F"];
    for (tag, label) in TX_SESSION_ROTATION.iter().zip(labels) {
        assert_eq!(session_label(*tag), label);
    }
    assert_eq!(session_label(5), "?");
}

#[test]
/// Scavenging erases idle sessions and reports their keys.
fn test_scavenge_reports_evicted_keys() {
    let mut table = SessionTable::new();
    open(&mut table, 2, 0x42, 14, 0);
    open(&mut table, 3, 0x43, 14, 600);

    let mut evicted = [None; MAX_CONCURRENT_SESSIONS];
    let mut count = 0;
    table.scavenge(1200, 1000, |key| {
        evicted[count] = Some(key);
        count += 1;
    });

    // Only the first session crossed the inactivity budget.
    assert_eq!(count, 1);
    assert_eq!(evicted[0], Some(session_key(2, 0x42)));
    assert!(!table.contains(session_key(2, 0x42)));
    assert!(table.contains(session_key(3, 0x43)));

    // Exactly at the budget is not yet stale.
    let mut count = 0;
    table.scavenge(1600, 1000, |_| count += 1);
    assert_eq!(count, 0);
}
