//! IRCv3 tag decoding.
//!
//! Tags arrive as a semicolon-separated `name=value` list ahead of the
//! frame. Everything is kept verbatim in [`TagsInfo::all_tags`]; the
//! handful of tags with engine-level meaning are additionally decoded into
//! typed fields.

use std::collections::{BTreeMap, BTreeSet};

/// Name color used when the server sends no (or an unparseable) `color` tag.
pub const DEFAULT_NAME_COLOR: u32 = 0xFF_FF_FF;

/// Decoded tags of a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TagsInfo {
    /// The sender's name as it should be displayed, with capitalization.
    pub display_name: String,
    /// Badges to show in front of the name, each as `name/version`.
    pub badges: BTreeSet<String>,
    /// Emotes used in the message: emote id to `(begin, end)` character
    /// offsets into the message text, one pair per occurrence.
    pub emotes: BTreeMap<u32, Vec<(usize, usize)>>,
    /// Name color as 24-bit RGB (`0xRRGGBB`).
    pub color: u32,
    /// When the message was sent, in whole seconds past the UNIX epoch.
    pub timestamp: u64,
    /// Millisecond remainder of [`timestamp`](Self::timestamp), `0..=999`.
    pub time_milliseconds: u32,
    /// Id of the channel the message was sent to (`room-id`).
    pub channel_id: u64,
    /// Id of the sending user (`user-id`).
    pub user_id: u64,
    /// Every tag of the frame, by name, with its raw wire value. Unknown
    /// tags are preserved here untouched.
    pub all_tags: BTreeMap<String, String>,
}

impl Default for TagsInfo {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            badges: BTreeSet::new(),
            emotes: BTreeMap::new(),
            color: DEFAULT_NAME_COLOR,
            timestamp: 0,
            time_milliseconds: 0,
            channel_id: 0,
            user_id: 0,
            all_tags: BTreeMap::new(),
        }
    }
}

/// Decode the raw tag list of one frame.
pub(crate) fn decode(raw: &str) -> TagsInfo {
    let mut info = TagsInfo::default();
    for pair in raw.split(';') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        info.all_tags.insert(name.to_string(), value.to_string());
        match name {
            "badges" => {
                for badge in value.split(',').filter(|badge| !badge.is_empty()) {
                    info.badges.insert(badge.to_string());
                }
            }
            "color" => {
                if let Some(hex) = value.strip_prefix('#') {
                    if let Ok(rgb) = u32::from_str_radix(hex, 16) {
                        info.color = rgb;
                    }
                }
            }
            "display-name" => info.display_name = value.to_string(),
            "emotes" => decode_emotes(value, &mut info.emotes),
            "tmi-sent-ts" => match value.parse::<u64>() {
                Ok(milliseconds) => {
                    info.timestamp = milliseconds / 1000;
                    info.time_milliseconds = (milliseconds % 1000) as u32;
                }
                Err(_) => {
                    info.timestamp = 0;
                    info.time_milliseconds = 0;
                }
            },
            "room-id" => info.channel_id = value.parse().unwrap_or(0),
            "user-id" => info.user_id = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    info
}

/// `emotes` is slash-separated groups of `id:begin-end,begin-end,…`.
fn decode_emotes(value: &str, emotes: &mut BTreeMap<u32, Vec<(usize, usize)>>) {
    for group in value.split('/') {
        let Some((id, spans)) = group.split_once(':') else {
            continue;
        };
        let Ok(id) = id.parse::<u32>() else {
            continue;
        };
        let occurrences = emotes.entry(id).or_default();
        for span in spans.split(',') {
            let Some((begin, end)) = span.split_once('-') else {
                continue;
            };
            let (Ok(begin), Ok(end)) = (begin.parse(), end.parse()) else {
                continue;
            };
            occurrences.push((begin, end));
        }
    }
}

/// Unescape a tag value from wire form.
///
/// `\:` → `;`, `\s` → space, `\\` → `\`, `\r` → CR, `\n` → LF. A lone
/// backslash before any other character yields that character; a trailing
/// backslash is dropped.
pub fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        let out = if c == '\\' {
            match chars.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(other) => other,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(out);
    }
    unescaped
}

/// Escape a tag value for wire form. Inverse of [`unescape_tag_value`].
pub fn escape_tag_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => escaped.push_str("\\:"),
            ' ' => escaped.push_str("\\s"),
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}
