//! Byte-level filtering applied to usernames and relayed text.

use crate::protocol::MAX_STR;

const FILTER_ASCII_START: u8 = 33;
const FILTER_ASCII_END: u8 = 126;
const FILTER_ASCII_TAB: u8 = 9;
const FILTER_ASCII_NEWLINE: u8 = 10;
const FILTER_ASCII_SPACE: u8 = 32;

/// Strip a raw wire string down to permitted bytes.
///
/// Keeps printable ASCII (33..=126); with `allow_whitespace`, also keeps
/// tab, newline, and space. Forbidden bytes are dropped, not escaped.
/// Input longer than [`MAX_STR`] is truncated before filtering.
///
/// Usernames sanitize without whitespace; message bodies and system
/// notices sanitize with it. An empty result fails registration at the
/// call site.
pub fn sanitize(input: &[u8], allow_whitespace: bool) -> String {
    let limit = input.len().min(MAX_STR);
    let mut output = String::with_capacity(limit);
    for &byte in &input[..limit] {
        let printable = (FILTER_ASCII_START..=FILTER_ASCII_END).contains(&byte);
        let whitespace = allow_whitespace
            && (byte == FILTER_ASCII_TAB
                || byte == FILTER_ASCII_NEWLINE
                || byte == FILTER_ASCII_SPACE);
        if printable || whitespace {
            output.push(byte as char);
        }
    }
    output
}
