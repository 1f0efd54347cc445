//! Gateway wire protocol: constants and reply classification.
//!
//! Requests and replies are single ASCII lines terminated by a carriage return.

/// Default TCP port of the iTach command interface.
pub const DEFAULT_PORT: u16 = 4998;

/// Line terminator for both requests and replies.
pub const TERMINATOR: u8 = b'\r';

const COMPLETE_MARKER: &str = "completeir";
const ERROR_MARKER: &str = "ERR";

/// What a reply line means, before any session policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    /// No bytes at all; the gateway closed without answering.
    Empty,
    /// The gateway finished sending the IR command.
    Complete,
    /// The gateway rejected the request.
    Error { code: String },
    /// Anything else; carries the reply text.
    Unexpected(String),
}

/// Classify a raw reply. Only a reply with no bytes is empty; a bare terminator
/// is an (unexpected) blank line.
pub fn classify_reply(raw: &[u8]) -> ReplyKind {
    if raw.is_empty() {
        return ReplyKind::Empty;
    }
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(TERMINATOR as char);
    if text.contains(COMPLETE_MARKER) {
        return ReplyKind::Complete;
    }
    if text.contains(ERROR_MARKER) {
        let code = text
            .split(',')
            .nth(1)
            .unwrap_or("unknown")
            .to_string();
        return ReplyKind::Error { code };
    }
    ReplyKind::Unexpected(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeir_is_success() {
        assert_eq!(classify_reply(b"completeir\r"), ReplyKind::Complete);
        assert_eq!(classify_reply(b"completeir,1:3,1\r"), ReplyKind::Complete);
    }

    #[test]
    fn err_carries_second_field() {
        assert_eq!(
            classify_reply(b"ERR,1\r"),
            ReplyKind::Error { code: "1".to_string() }
        );
        assert_eq!(
            classify_reply(b"ERR_1:1,001\r"),
            ReplyKind::Error { code: "001".to_string() }
        );
    }

    #[test]
    fn err_without_code_is_unknown() {
        assert_eq!(
            classify_reply(b"ERR\r"),
            ReplyKind::Error { code: "unknown".to_string() }
        );
    }

    #[test]
    fn completeir_wins_over_err() {
        assert_eq!(classify_reply(b"completeir ERR\r"), ReplyKind::Complete);
    }

    #[test]
    fn empty_reply() {
        assert_eq!(classify_reply(b""), ReplyKind::Empty);
    }

    #[test]
    fn bare_terminator_is_a_blank_line() {
        assert_eq!(classify_reply(b"\r"), ReplyKind::Unexpected(String::new()));
    }

    #[test]
    fn other_text_is_unexpected() {
        assert_eq!(
            classify_reply(b"busyIR,1:1,1\r"),
            ReplyKind::Unexpected("busyIR,1:1,1".to_string())
        );
    }
}
