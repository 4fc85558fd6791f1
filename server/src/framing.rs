//! Newline framing with a hard cap on line length.
//!
//! Bytes are checked against the cap as they arrive, so a client that never
//! sends `\n` cannot make the server buffer more than one line's worth.

use crate::error::LineError;
use reversi_shared::ProtocolError;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Reads one line of at most `max_len` bytes, terminator excluded.
///
/// Returns `Ok(None)` at a clean end of stream. A trailing `\r` is stripped
/// along with the `\n`, and a final unterminated line is still returned.
/// Partial input stays in `buf`, so the future can be dropped inside a
/// `select!` and polled again later without losing bytes.
pub async fn read_line_bounded<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> Result<Option<String>, LineError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            return finish_line(buf, max_len).map(Some);
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let take = newline.unwrap_or(available.len());
        // One extra byte for a `\r` before the `\n`.
        if buf.len() + take > max_len + 1 {
            buf.clear();
            return Err(ProtocolError::TooLong.into());
        }
        buf.extend_from_slice(&available[..take]);
        reader.consume(newline.map_or(take, |i| i + 1));

        if newline.is_some() {
            return finish_line(buf, max_len).map(Some);
        }
    }
}

fn finish_line(buf: &mut Vec<u8>, max_len: usize) -> Result<String, LineError> {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let bytes = std::mem::take(buf);
    if bytes.len() > max_len {
        return Err(ProtocolError::TooLong.into());
    }
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}
