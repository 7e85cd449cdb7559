//! Line protocol parser and response generator.
//!
//! Requests are single lines of UTF-8 text terminated by `\n`:
//! - `LIST`: return every stored message
//! - `CLOSE`: acknowledge and close the connection
//! - anything else: store the line as a message
//!
//! Each response is one or more non-empty lines followed by an empty line.

use bytes::BytesMut;

use crate::storage::LogEntry;

/// Maximum length of a single request line, excluding the terminator
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List all stored messages
    List,

    /// Close the connection
    Close,

    /// Store a message
    Store(String),
}

impl Command {
    /// Interpret one trimmed, non-empty line.
    pub fn from_line(line: &str) -> Self {
        if line.eq_ignore_ascii_case("LIST") {
            Command::List
        } else if line.eq_ignore_ascii_case("CLOSE") {
            Command::Close
        } else {
            Command::Store(line.to_string())
        }
    }
}

/// Protocol parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No terminator within `MAX_LINE_LENGTH` bytes
    LineTooLong(usize),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::LineTooLong(len) => {
                write!(f, "line too long ({} bytes, max {})", len, MAX_LINE_LENGTH)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Result of parsing a request
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// Successfully parsed command with bytes consumed
    Complete(Command, usize),
    /// Blank line, skip the bytes consumed
    Blank(usize),
    /// Need more data
    Incomplete,
    /// Parse error
    Error(ParseError),
}

/// Parser for the line protocol
pub struct Parser;

impl Parser {
    /// Parse one terminated line from the buffer
    pub fn parse(buffer: &[u8]) -> ParseResult {
        let line_end = match find_newline(buffer) {
            Some(pos) => pos,
            None if buffer.len() > MAX_LINE_LENGTH => {
                return ParseResult::Error(ParseError::LineTooLong(buffer.len()))
            }
            None => return ParseResult::Incomplete,
        };

        if line_end > MAX_LINE_LENGTH {
            return ParseResult::Error(ParseError::LineTooLong(line_end));
        }

        Self::parse_line(&buffer[..line_end], line_end + 1)
    }

    /// Parse whatever is left in the buffer once the peer stopped sending.
    ///
    /// Returns `None` if nothing but whitespace remains.
    pub fn parse_final(buffer: &[u8]) -> Option<Command> {
        match Self::parse_line(buffer, buffer.len()) {
            ParseResult::Complete(command, _) => Some(command),
            _ => None,
        }
    }

    fn parse_line(raw: &[u8], consumed: usize) -> ParseResult {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            ParseResult::Blank(consumed)
        } else {
            ParseResult::Complete(Command::from_line(line), consumed)
        }
    }
}

/// Response builder
pub struct Response;

impl Response {
    /// Acknowledge a stored message
    pub fn received(msg: &str) -> BytesMut {
        Self::lines([format!("Message received: {}", msg)])
    }

    /// Render the message table
    pub fn listing(entries: &[LogEntry]) -> BytesMut {
        let header = std::iter::once("Messages in the database:".to_string());
        let rows = entries
            .iter()
            .map(|entry| format!("ID: {}, Message: {}", entry.id, entry.msg));
        Self::lines(header.chain(rows))
    }

    /// Acknowledge CLOSE
    pub fn closed() -> BytesMut {
        Self::lines(["Connection closed.".to_string()])
    }

    /// Report a database failure
    pub fn database_error(err: &dyn std::fmt::Display) -> BytesMut {
        Self::lines([format!("Database error: {}", err)])
    }

    /// Report a protocol failure
    pub fn client_error(msg: &str) -> BytesMut {
        Self::lines([format!("ERROR {}", msg)])
    }

    fn lines(lines: impl IntoIterator<Item = String>) -> BytesMut {
        let mut out = BytesMut::new();
        for line in lines {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\n");
        }
        out.extend_from_slice(b"\n");
        out
    }
}

/// Find `\n` in buffer, returning its position. A preceding `\r` is trimmed later.
fn find_newline(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(Parser::parse(b"LIST\n"), ParseResult::Complete(Command::List, 5));
        assert_eq!(Parser::parse(b"list\r\n"), ParseResult::Complete(Command::List, 6));
    }

    #[test]
    fn test_parse_close() {
        assert_eq!(
            Parser::parse(b"  Close  \n"),
            ParseResult::Complete(Command::Close, 10)
        );
    }

    #[test]
    fn test_parse_store() {
        match Parser::parse(b"  hello world \nLIST\n") {
            ParseResult::Complete(Command::Store(msg), consumed) => {
                assert_eq!(msg, "hello world");
                assert_eq!(consumed, 15);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_commands_match_whole_line() {
        assert_eq!(
            Command::from_line("LIST all"),
            Command::Store("LIST all".to_string())
        );
        assert_eq!(
            Command::from_line("closed"),
            Command::Store("closed".to_string())
        );
    }

    #[test]
    fn test_blank_and_incomplete() {
        assert_eq!(Parser::parse(b" \r\n"), ParseResult::Blank(3));
        assert_eq!(Parser::parse(b"hello"), ParseResult::Incomplete);
        assert_eq!(Parser::parse(b""), ParseResult::Incomplete);
    }

    #[test]
    fn test_line_too_long() {
        let buffer = vec![b'a'; MAX_LINE_LENGTH + 1];
        match Parser::parse(&buffer) {
            ParseResult::Error(ParseError::LineTooLong(len)) => {
                assert_eq!(len, MAX_LINE_LENGTH + 1)
            }
            other => panic!("unexpected: {:?}", other),
        }

        let mut terminated = vec![b'a'; MAX_LINE_LENGTH];
        terminated.push(b'\n');
        assert!(matches!(
            Parser::parse(&terminated),
            ParseResult::Complete(Command::Store(_), _)
        ));
    }

    #[test]
    fn test_parse_final() {
        assert_eq!(
            Parser::parse_final(b"last words"),
            Some(Command::Store("last words".to_string()))
        );
        assert_eq!(Parser::parse_final(b"close"), Some(Command::Close));
        assert_eq!(Parser::parse_final(b"  \r"), None);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        match Parser::parse(b"caf\xff\n") {
            ParseResult::Complete(Command::Store(msg), _) => assert_eq!(msg, "caf\u{fffd}"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_responses() {
        assert_eq!(&Response::received("hi")[..], b"Message received: hi\n\n");
        assert_eq!(&Response::closed()[..], b"Connection closed.\n\n");
        assert_eq!(
            &Response::database_error(&"disk I/O error")[..],
            b"Database error: disk I/O error\n\n"
        );
        assert_eq!(&Response::client_error("bad")[..], b"ERROR bad\n\n");
    }

    #[test]
    fn test_listing() {
        assert_eq!(&Response::listing(&[])[..], b"Messages in the database:\n\n");

        let entries = vec![
            LogEntry {
                id: 1,
                msg: "first".to_string(),
            },
            LogEntry {
                id: 2,
                msg: "second".to_string(),
            },
        ];
        assert_eq!(
            &Response::listing(&entries)[..],
            b"Messages in the database:\nID: 1, Message: first\nID: 2, Message: second\n\n"
        );
    }
}
