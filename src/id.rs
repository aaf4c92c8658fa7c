//! Note ID generation for nx
//!
//! IDs are 26-character ULIDs in Crockford Base32 (alphabet `0-9A-Z` minus
//! `I L O U`): a 10-character millisecond timestamp followed by 16 random
//! characters. Lexicographic order equals creation-time order.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NxError, Result};

const ULID_LENGTH: usize = 26;
const TIMESTAMP_LENGTH: usize = 10;
const BASE32_SIZE: u64 = 32;

/// Unique note identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteId(String);

impl NoteId {
    /// ID length in characters
    pub const LENGTH: usize = ULID_LENGTH;

    /// Generate a new ID stamped with the current time
    pub fn generate() -> Self {
        NoteId(ulid::Ulid::new().to_string())
    }

    /// Generate a new ID stamped with an explicit time
    pub fn generate_at(timestamp: DateTime<Utc>) -> Self {
        let system_time: SystemTime = timestamp.into();
        NoteId(ulid::Ulid::from_datetime(system_time).to_string())
    }

    /// Get the ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the embedded creation timestamp
    ///
    /// Invalid characters decode to the epoch; a parsed `NoteId` never
    /// contains any.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let mut millis: u64 = 0;
        for c in self.0[..TIMESTAMP_LENGTH].chars() {
            match decode_base32_char(c) {
                Some(value) => millis = millis * BASE32_SIZE + u64::from(value),
                None => return Utc.timestamp_millis_opt(0).single().unwrap_or_default(),
            }
        }
        Utc.timestamp_millis_opt(millis as i64)
            .single()
            .unwrap_or_default()
    }
}

impl FromStr for NoteId {
    type Err = NxError;

    fn from_str(s: &str) -> Result<Self> {
        if !is_valid_format(s) {
            return Err(NxError::InvalidArgument(format!(
                "invalid note id: {}",
                s
            )));
        }
        Ok(NoteId(s.to_string()))
    }
}

impl TryFrom<String> for NoteId {
    type Error = NxError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NoteId> for String {
    fn from(id: NoteId) -> String {
        id.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether a string is a well-formed 26-character ID
pub fn is_valid_format(s: &str) -> bool {
    s.len() == ULID_LENGTH && s.chars().all(|c| decode_base32_char(c).is_some())
}

/// Decode a Crockford Base32 character, rejecting `I L O U`
fn decode_base32_char(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        'A'..='H' => Some(c as u8 - b'A' + 10),
        'J'..='K' => Some(c as u8 - b'A' + 9),
        'M'..='N' => Some(c as u8 - b'A' + 8),
        'P'..='T' => Some(c as u8 - b'A' + 7),
        'V'..='Z' => Some(c as u8 - b'A' + 6),
        _ => None,
    }
}

/// Generate a slug from a title
///
/// Lowercase, non-alphanumerics collapsed to `-`, trimmed, capped at 50
/// characters, `untitled` when nothing survives.
pub fn generate_slug(title: &str) -> String {
    let mut slug = slug::slugify(title);

    if slug.len() > 50 {
        slug.truncate(50);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Generate a note filename: `<id>-<slug>.md`
pub fn note_filename(id: &NoteId, title: &str) -> String {
    format!("{}-{}.md", id, generate_slug(title))
}
