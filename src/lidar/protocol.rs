//! Wire constants and request construction for the range-sensor protocol.
//!
//! Each request and each response is one frame: `STX`, ASCII payload, `ETX`.
//! Response payloads are space-delimited tokens; after the marker field come
//! a few protocol fields, the hexadecimal sample count, and that many
//! hexadecimal ranges in millimeters.

/// Start-of-frame delimiter.
pub const STX: u8 = 0x02;

/// End-of-frame delimiter.
pub const ETX: u8 = 0x03;

/// Default simulator host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default simulator port.
pub const DEFAULT_PORT: u16 = 23000;

/// Poll request for one scan.
pub const DEFAULT_COMMAND: &str = "sRN LMDscandata";

/// Field name preceding the sample count.
pub const DEFAULT_MARKER: &str = "DIST1";

/// Carry buffer ceiling in bytes.
pub const DEFAULT_CARRY_LIMIT: usize = 60_000;

/// Bytes requested per socket read.
pub const DEFAULT_READ_CHUNK: usize = 16_384;

/// Literal the sensor includes in a successful authentication response.
pub const AUTH_OK: &str = "OK";

/// Wrap `command` in frame delimiters.
pub fn request_frame(command: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(command.len() + 2);
    frame.push(STX);
    frame.extend_from_slice(command.as_bytes());
    frame.push(ETX);
    frame
}

/// Identifier line sent during authentication.
pub fn auth_line(identifier: &str) -> Vec<u8> {
    let mut line = identifier.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
    line.push(b'\n');
    line
}

/// Whether an authentication response accepts the session.
pub fn auth_accepted(response: &[u8]) -> bool {
    response
        .windows(AUTH_OK.len())
        .any(|w| w == AUTH_OK.as_bytes())
}

/// Lossy preview of the first `max` characters of a payload, for logs.
pub fn preview(payload: &[u8], max: usize) -> String {
    let head = &payload[..payload.len().min(max)];
    String::from_utf8_lossy(head)
        .chars()
        .map(|c| if c.is_control() { '.' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frame_layout() {
        let frame = request_frame(DEFAULT_COMMAND);
        assert_eq!(frame.first(), Some(&0x02));
        assert_eq!(frame.last(), Some(&0x03));
        assert_eq!(&frame[1..frame.len() - 1], b"sRN LMDscandata");
    }

    #[test]
    fn test_auth_line_has_single_newline() {
        assert_eq!(auth_line("z1234567"), b"z1234567\n");
        assert_eq!(auth_line("z1234567\n"), b"z1234567\n");
    }

    #[test]
    fn test_auth_accepted() {
        assert!(auth_accepted(b"OK\n"));
        assert!(auth_accepted(b"Welcome, OK"));
        assert!(!auth_accepted(b"DENIED\n"));
        assert!(!auth_accepted(b"O"));
        assert!(!auth_accepted(b""));
    }

    #[test]
    fn test_preview_masks_control_bytes() {
        assert_eq!(preview(b"\x02sRA LMD", 5), ".sRA ");
        assert_eq!(preview(b"ab", 120), "ab");
    }
}
