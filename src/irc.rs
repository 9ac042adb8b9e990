//! Wire codec for TMI frames.
//!
//! TMI is Twitch's IRC derivative. One frame is one CRLF-terminated line:
//!
//! ```text
//! ['@' <tags> ' '] [':' <prefix> ' '] <command> {' ' <middle>} [' :' <trailer>]
//! ```
//!
//! [`Message::parse`] extracts exactly one complete line per call from a
//! growing receive buffer; callers loop until it returns `None`.

use std::fmt;

use crate::tags::{self, TagsInfo};

/// The line terminator for all traffic to and from the chat server.
pub(crate) const CRLF: &str = "\r\n";

/// A single parsed frame from the chat server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Decoded IRCv3 tags. Default-valued when the frame carried none.
    pub tags: TagsInfo,
    /// Message prefix without the leading colon, or empty if absent.
    pub prefix: String,
    /// Command mnemonic (`PRIVMSG`) or three-digit code (`376`).
    ///
    /// Empty means the line did not form a valid frame; such messages are
    /// discarded by the session.
    pub command: String,
    /// Middle parameters, followed by the trailer (colon stripped) if the
    /// line had one. Only the trailer may contain spaces.
    pub parameters: Vec<String>,
}

/// Scanner position while unpacking one line.
enum ScanState {
    LineFirstChar,
    Tags,
    PrefixOrCommandFirstChar,
    Prefix,
    CommandFirstChar,
    CommandRest,
    ParamFirstChar,
    ParamRest,
    Trailer,
}

impl Message {
    /// Extract the next complete line from `buffer` and parse it.
    ///
    /// When a CRLF is present, consumes the line plus its terminator from
    /// the front of the buffer and returns the parsed frame, even if the
    /// line was malformed (the returned message then has an empty
    /// `command`). Otherwise the buffer is left untouched and `None` is
    /// returned. A single call never consumes more than one line.
    pub fn parse(buffer: &mut Vec<u8>) -> Option<Message> {
        let line_end = buffer.windows(CRLF.len()).position(|w| w == CRLF.as_bytes())?;
        let line = String::from_utf8_lossy(&buffer[..line_end]).into_owned();
        buffer.drain(..line_end + CRLF.len());
        tracing::trace!("> {line}");

        let mut message = Message::default();
        let mut raw_tags = String::new();
        let mut state = ScanState::LineFirstChar;
        for c in line.chars() {
            state = match state {
                ScanState::LineFirstChar => {
                    if c == '@' {
                        ScanState::Tags
                    } else if c == ':' {
                        ScanState::Prefix
                    } else {
                        message.command.push(c);
                        ScanState::CommandRest
                    }
                }
                ScanState::Tags => {
                    if c == ' ' {
                        ScanState::PrefixOrCommandFirstChar
                    } else {
                        raw_tags.push(c);
                        ScanState::Tags
                    }
                }
                ScanState::PrefixOrCommandFirstChar => {
                    if c == ':' {
                        ScanState::Prefix
                    } else {
                        message.command.push(c);
                        ScanState::CommandRest
                    }
                }
                ScanState::Prefix => {
                    if c == ' ' {
                        ScanState::CommandFirstChar
                    } else {
                        message.prefix.push(c);
                        ScanState::Prefix
                    }
                }
                ScanState::CommandFirstChar => {
                    if c == ' ' {
                        ScanState::CommandFirstChar
                    } else {
                        message.command.push(c);
                        ScanState::CommandRest
                    }
                }
                ScanState::CommandRest => {
                    if c == ' ' {
                        ScanState::ParamFirstChar
                    } else {
                        message.command.push(c);
                        ScanState::CommandRest
                    }
                }
                ScanState::ParamFirstChar => {
                    if c == ':' {
                        message.parameters.push(String::new());
                        ScanState::Trailer
                    } else if c == ' ' {
                        ScanState::ParamFirstChar
                    } else {
                        message.parameters.push(c.to_string());
                        ScanState::ParamRest
                    }
                }
                ScanState::ParamRest => {
                    if c == ' ' {
                        ScanState::ParamFirstChar
                    } else {
                        if let Some(param) = message.parameters.last_mut() {
                            param.push(c);
                        }
                        ScanState::ParamRest
                    }
                }
                ScanState::Trailer => {
                    if let Some(param) = message.parameters.last_mut() {
                        param.push(c);
                    }
                    ScanState::Trailer
                }
            };
        }

        // A line that never reached the command body is not a frame.
        if matches!(
            state,
            ScanState::LineFirstChar
                | ScanState::Tags
                | ScanState::PrefixOrCommandFirstChar
                | ScanState::Prefix
                | ScanState::CommandFirstChar
        ) {
            message.command.clear();
        }
        message.tags = tags::decode(&raw_tags);
        Some(message)
    }
}

impl fmt::Display for Message {
    /// Serialize back to wire form, without the trailing CRLF.
    ///
    /// Tag values are written as stored in `all_tags` (wire-escaped form).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.all_tags.is_empty() {
            write!(f, "@")?;
            for (i, (name, value)) in self.tags.all_tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ";")?;
                }
                if value.is_empty() {
                    write!(f, "{name}")?;
                } else {
                    write!(f, "{name}={value}")?;
                }
            }
            write!(f, " ")?;
        }
        if !self.prefix.is_empty() {
            write!(f, ":{} ", self.prefix)?;
        }
        write!(f, "{}", self.command)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i == self.parameters.len() - 1
                && (param.contains(' ') || param.starts_with(':') || param.is_empty())
            {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}
