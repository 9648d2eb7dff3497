// frame.rs - Command Frame Parsing

//! Plaintext frame format: `<senderLabel>:<messageType>:<payload>`.
//!
//! Only the first two delimiters are significant; the payload may contain
//! further `:` characters.

use std::fmt;
use thiserror::Error;

/// Field delimiter
pub const DELIMITER: char = ':';

/// Message type that requests command execution
pub const MESSAGE_TYPE_CMD: &str = "cmd";

/// Frame parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed frame: expected 3 fields, found {fields}")]
    MalformedFrame { fields: usize },

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Parsed command message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandFrame {
    /// Label of the sending node, verbatim
    pub sender_label: String,

    /// Message type tag, trimmed (e.g. "cmd")
    pub message_type: String,

    /// Message body, trimmed
    pub payload: String,
}

impl CommandFrame {
    pub fn new(
        sender_label: impl Into<String>,
        message_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            sender_label: sender_label.into(),
            message_type: message_type.into(),
            payload: payload.into(),
        }
    }

    pub fn is_command(&self) -> bool {
        self.message_type == MESSAGE_TYPE_CMD
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.sender_label, DELIMITER, self.message_type, DELIMITER, self.payload
        )
    }
}

/// Parse a decoded plaintext into a [`CommandFrame`].
///
/// Fewer than three fields is rejected outright; nothing is partially filled.
pub fn parse(plaintext: &[u8]) -> Result<CommandFrame, FrameError> {
    let text = std::str::from_utf8(plaintext).map_err(|_| FrameError::InvalidUtf8)?;
    let parts: Vec<&str> = text.splitn(3, DELIMITER).collect();

    match parts.as_slice() {
        [sender_label, message_type, payload] => Ok(CommandFrame {
            sender_label: (*sender_label).to_string(),
            message_type: message_type.trim().to_string(),
            payload: payload.trim().to_string(),
        }),
        _ => Err(FrameError::MalformedFrame {
            fields: parts.len(),
        }),
    }
}

/// Format the three fields into a frame
pub fn format(sender_label: &str, message_type: &str, payload: &str) -> String {
    CommandFrame::new(sender_label, message_type, payload).to_string()
}

/// Prefix outgoing data with `"<label>: "`; an empty label leaves it untouched
pub fn prefix_sender(sender_label: &str, data: &[u8]) -> Vec<u8> {
    if sender_label.is_empty() {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(sender_label.len() + 2 + data.len());
    out.extend_from_slice(sender_label.as_bytes());
    out.push(DELIMITER as u8);
    out.push(b' ');
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_command() {
        let frame = parse(b"node-42: cmd: echo hi").unwrap();
        assert_eq!(frame, CommandFrame::new("node-42", "cmd", "echo hi"));
        assert!(frame.is_command());
    }

    #[test]
    fn test_payload_keeps_delimiters() {
        let frame = parse(b"ctl:cmd: curl http://example.com:8080/x ").unwrap();
        assert_eq!(frame.payload, "curl http://example.com:8080/x");
    }

    #[test]
    fn test_sender_label_not_trimmed() {
        let frame = parse(b" ctl :note:x").unwrap();
        assert_eq!(frame.sender_label, " ctl ");
        assert_eq!(frame.message_type, "note");
        assert!(!frame.is_command());
    }

    #[test]
    fn test_malformed_frames() {
        assert_eq!(parse(b"no delimiters"), Err(FrameError::MalformedFrame { fields: 1 }));
        assert_eq!(parse(b"one:delimiter"), Err(FrameError::MalformedFrame { fields: 2 }));
        assert_eq!(parse(b""), Err(FrameError::MalformedFrame { fields: 1 }));
    }

    #[test]
    fn test_empty_fields_are_still_three() {
        assert_eq!(parse(b"::").unwrap(), CommandFrame::new("", "", ""));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(parse(&[0xff, b':', b':']), Err(FrameError::InvalidUtf8));
    }

    #[test]
    fn test_prefix_sender() {
        assert_eq!(prefix_sender("node-1", b"cmd: ls"), b"node-1: cmd: ls");
        assert_eq!(prefix_sender("", b"cmd: ls"), b"cmd: ls");
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            label in "[^:\n]{0,16}",
            message_type in "[^:\n]{0,16}",
            payload in "[^\n]{0,64}",
        ) {
            let frame = parse(format(&label, &message_type, &payload).as_bytes()).unwrap();
            prop_assert_eq!(frame.sender_label, label);
            prop_assert_eq!(frame.message_type, message_type.trim());
            prop_assert_eq!(frame.payload, payload.trim());
        }

        #[test]
        fn prop_fewer_than_two_delimiters_rejected(text in "[^:]{0,32}(:[^:]{0,32})?") {
            let is_malformed = matches!(
                parse(text.as_bytes()),
                Err(FrameError::MalformedFrame { .. })
            );
            prop_assert!(is_malformed);
        }
    }
}
