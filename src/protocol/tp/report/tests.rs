//! Byte-exact tests for the JSON line renderer.
// REPORT
use super::*;
use crate::protocol::tp::session::SessionTable;
use crate::protocol::tp::session_key;

#[test]
/// Single-frame messages report the literal size "SF".
fn test_single_frame_line() {
    let message = ReceivedMessage::single(0xEF00, 0x11, &[0xDE, 0xAD, 0xBE]);

    let mut line = heapless::String::<128>::new();
    render_json(&message, &mut line).expect("line fits the buffer");
    assert_eq!(
        line.as_str(),
        "{\"pgn\":\"0ef00\",\"sender\":11,\"size\":\"SF\",\"data\":\"DEADBE\"}\n"
    );
}

#[test]
/// Reassembled broadcasts report their announced byte count.
fn test_multi_frame_line() {
    let mut table = SessionTable::new();
    table.insert(0xEF00, 0x42, 2, 16, 3, 0);
    let session = table.get_mut(session_key(2, 0x42)).expect("open session");
    session.append(1, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07], 0);
    session.append(2, &[0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E], 0);
    session.append(3, &[0x0F, 0x10, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 0);
    let message = ReceivedMessage::assembled(session);

    let mut line = heapless::String::<128>::new();
    render_json(&message, &mut line).expect("line fits the buffer");
    assert_eq!(
        line.as_str(),
        "{\"pgn\":\"0ef00\",\"sender\":42,\"size\":16,\"data\":\"0102030405060708090A0B0C0D0E0F10\"}\n"
    );
}

#[test]
/// Group numbers with the data-page bit render five hex digits.
fn test_five_digit_pgn() {
    let message = ReceivedMessage::single(0x1F805, 0x0A, &[0x00]);

    let mut line = heapless::String::<128>::new();
    render_json(&message, &mut line).expect("line fits the buffer");
    assert_eq!(
        line.as_str(),
        "{\"pgn\":\"1f805\",\"sender\":0A,\"size\":\"SF\",\"data\":\"00\"}\n"
    );
}
