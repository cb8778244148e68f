//! Line-delimited JSON rendering of published messages for the host
//! channel.
use core::fmt::{self, Write};

use crate::protocol::tp::controller::ReceivedMessage;

/// Render one published message as a JSON line.
///
/// Layout: `{"pgn":"<5 lowercase hex>","sender":<2 uppercase hex>,`
/// `"size":"SF"|<bytes>,"data":"<uppercase hex>"}` plus a trailing newline.
/// Single-frame messages report the literal size `"SF"`; reassembled
/// broadcasts report their announced byte count.
pub fn render_json<W: Write>(message: &ReceivedMessage, out: &mut W) -> fmt::Result {
    write!(
        out,
        "{{\"pgn\":\"{:05x}\",\"sender\":{:02X},\"size\":",
        message.pgn(),
        message.source_address()
    )?;

    match message.announced_size() {
        None => out.write_str("\"SF\"")?,
        Some(size) => write!(out, "{size}")?,
    }

    out.write_str(",\"data\":\"")?;
    for byte in message.payload() {
        write!(out, "{byte:02X}")?;
    }
    out.write_str("\"}\n")
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
