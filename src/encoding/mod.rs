//! Encoding catalog and input sanity checking.
//!
//! The catalog is built once and shared (`Arc<EncodingCatalog>`) by the option
//! registry and every [`TidyModel`](crate::state::TidyModel). Besides listing
//! and resolving encodings, it decodes raw bytes and judges whether the
//! declared encoding was plausible. When it was not, it suggests another
//! catalog entry for the *same* bytes; it never alters the data itself.
//!
//! # Anomalies
//!
//! A decode is [`DecodeOutcome::Suspect`] when any of these hold:
//! - the bytes start with a byte-order mark belonging to a different encoding
//! - the decoder hit byte sequences it could not map
//! - UTF-16 without a BOM where fewer than half the code units are ASCII
//! - a single-byte encoding was declared for non-ASCII bytes that form valid UTF-8
//! - more than 1% of the decoded characters are control characters

pub(crate) mod codecs;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Share of control characters above which decoded text is considered implausible.
const CONTROL_DENSITY_LIMIT: f64 = 0.01;

/// Identifier of a supported text encoding. Serializes as its config name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EncodingId {
    #[serde(rename = "utf8")]
    Utf8,
    #[serde(rename = "utf16le")]
    Utf16Le,
    #[serde(rename = "utf16be")]
    Utf16Be,
    #[serde(rename = "win1252")]
    Windows1252,
    #[serde(rename = "mac")]
    MacRoman,
    #[serde(rename = "latin1")]
    Latin1,
    #[serde(rename = "ascii")]
    Ascii,
}

impl EncodingId {
    /// Every supported encoding, in suggestion priority order.
    pub const ALL: [EncodingId; 7] = [
        EncodingId::Utf8,
        EncodingId::Utf16Le,
        EncodingId::Utf16Be,
        EncodingId::Windows1252,
        EncodingId::MacRoman,
        EncodingId::Latin1,
        EncodingId::Ascii,
    ];

    /// The name the engine's configuration syntax uses for this encoding.
    pub fn config_name(self) -> &'static str {
        match self {
            EncodingId::Utf8 => "utf8",
            EncodingId::Utf16Le => "utf16le",
            EncodingId::Utf16Be => "utf16be",
            EncodingId::Windows1252 => "win1252",
            EncodingId::MacRoman => "mac",
            EncodingId::Latin1 => "latin1",
            EncodingId::Ascii => "ascii",
        }
    }

    /// Human-readable name used for display and for the localized ranking.
    pub fn localized_name(self) -> &'static str {
        match self {
            EncodingId::Utf8 => "Unicode (UTF-8)",
            EncodingId::Utf16Le => "Unicode (UTF-16LE)",
            EncodingId::Utf16Be => "Unicode (UTF-16BE)",
            EncodingId::Windows1252 => "Western (Windows Latin 1)",
            EncodingId::MacRoman => "Western (Mac OS Roman)",
            EncodingId::Latin1 => "Western (ISO Latin 1)",
            EncodingId::Ascii => "Western (ASCII)",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            EncodingId::Utf8 => &["utf-8"],
            EncodingId::Utf16Le => &["utf-16le"],
            EncodingId::Utf16Be => &["utf-16be", "utf16", "utf-16"],
            EncodingId::Windows1252 => &["windows-1252", "cp1252"],
            EncodingId::MacRoman => &["macroman", "macintosh"],
            EncodingId::Latin1 => &["iso-8859-1", "iso8859-1"],
            EncodingId::Ascii => &["us-ascii"],
        }
    }

    /// Matches config names and common aliases, ignoring ASCII case.
    pub fn matches(self, name: &str) -> bool {
        let name = name.trim();
        self.config_name().eq_ignore_ascii_case(name)
            || self.localized_name().eq_ignore_ascii_case(name)
            || self.aliases().iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    fn is_single_byte(self) -> bool {
        matches!(
            self,
            EncodingId::Windows1252 | EncodingId::MacRoman | EncodingId::Latin1 | EncodingId::Ascii
        )
    }

    fn is_utf16(self) -> bool {
        matches!(self, EncodingId::Utf16Le | EncodingId::Utf16Be)
    }
}

impl fmt::Display for EncodingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingDescriptor {
    pub id: EncodingId,
    pub localized_name: String,
    /// Dense 0-based rank of `localized_name` within the catalog.
    pub localized_index: usize,
}

/// Errors raised by catalog lookups and encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("Character {ch:?} cannot be represented in {encoding}")]
    Unencodable { ch: char, encoding: EncodingId },
}

/// Why a decode was judged implausible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// The byte stream starts with a BOM for another encoding.
    ByteOrderMark(EncodingId),
    /// Byte sequences the decoder could not map.
    Undecodable(usize),
    /// UTF-16 without BOM whose code units are mostly outside ASCII.
    ImplausibleUtf16,
    /// Non-ASCII bytes that form valid UTF-8 under a single-byte encoding.
    LooksLikeUtf8,
    /// Too many control characters in the decoded text.
    ControlCharacters(usize),
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::ByteOrderMark(id) => write!(f, "byte-order mark for {}", id),
            Anomaly::Undecodable(n) => write!(f, "{} undecodable byte sequence(s)", n),
            Anomaly::ImplausibleUtf16 => f.write_str("implausible UTF-16 code units"),
            Anomaly::LooksLikeUtf8 => f.write_str("bytes look like UTF-8"),
            Anomaly::ControlCharacters(n) => write!(f, "{} control character(s)", n),
        }
    }
}

/// Verdict of the sanity check on a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Clean,
    Suspect {
        anomaly: Anomaly,
        /// Catalog entry that decodes the same bytes without anomalies, or
        /// the declared encoding when none does.
        suggested: EncodingId,
    },
}

impl DecodeOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, DecodeOutcome::Clean)
    }

    pub fn suggested(&self) -> Option<EncodingId> {
        match self {
            DecodeOutcome::Clean => None,
            DecodeOutcome::Suspect { suggested, .. } => Some(*suggested),
        }
    }
}

/// Text produced by [`EncodingCatalog::decode`] plus the sanity verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub outcome: DecodeOutcome,
}

/// Immutable list of supported encodings.
#[derive(Debug, Clone)]
pub struct EncodingCatalog {
    /// Entries in suggestion priority order.
    entries: Vec<EncodingDescriptor>,
}

impl EncodingCatalog {
    /// Catalog of every supported encoding.
    pub fn new() -> Self {
        Self::with_encodings(&EncodingId::ALL)
    }

    /// Catalog restricted to `ids`. Priority order follows [`EncodingId::ALL`];
    /// duplicates are dropped.
    pub fn with_encodings(ids: &[EncodingId]) -> Self {
        let selected: Vec<EncodingId> = EncodingId::ALL
            .into_iter()
            .filter(|id| ids.contains(id))
            .collect();

        let mut by_name = selected.clone();
        by_name.sort_by_key(|id| id.localized_name());

        let entries = selected
            .into_iter()
            .map(|id| EncodingDescriptor {
                id,
                localized_name: id.localized_name().to_string(),
                localized_index: by_name.iter().position(|other| *other == id).unwrap_or(0),
            })
            .collect();

        Self { entries }
    }

    /// All entries ordered by `localized_index`.
    pub fn list_encodings(&self) -> Vec<&EncodingDescriptor> {
        let mut list: Vec<&EncodingDescriptor> = self.entries.iter().collect();
        list.sort_by_key(|e| e.localized_index);
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: EncodingId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn resolve(&self, id: EncodingId) -> Result<&EncodingDescriptor, CatalogError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| CatalogError::UnknownEncoding(id.to_string()))
    }

    /// Resolves a config name, alias, or localized name.
    pub fn resolve_name(&self, name: &str) -> Result<&EncodingDescriptor, CatalogError> {
        self.entries
            .iter()
            .find(|e| e.id.matches(name))
            .ok_or_else(|| CatalogError::UnknownEncoding(name.to_string()))
    }

    /// Config names of every entry, in priority order.
    pub fn config_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.id.config_name().to_string())
            .collect()
    }

    /// Entry following (or preceding) `id` in localized order, wrapping around.
    pub fn neighbour(&self, id: EncodingId, forward: bool) -> Option<EncodingId> {
        let list = self.list_encodings();
        let pos = list.iter().position(|e| e.id == id)?;
        let len = list.len();
        let next = if forward {
            (pos + 1) % len
        } else {
            (pos + len - 1) % len
        };
        Some(list[next].id)
    }

    /// Decodes `bytes` as `id` and sanity checks the result.
    ///
    /// On a suspect decode the text is still the one produced by `id`; the
    /// caller decides whether to switch to the suggested encoding.
    pub fn decode(&self, bytes: &[u8], id: EncodingId) -> Result<Decoded, CatalogError> {
        self.resolve(id)?;
        let (text, anomaly) = decode_checked(bytes, id);

        let outcome = match anomaly {
            None => DecodeOutcome::Clean,
            Some(anomaly) => {
                let suggested = self.suggest(bytes, id);
                tracing::warn!(
                    "Decoding as {} looks wrong ({}); suggesting {}",
                    id,
                    anomaly,
                    suggested
                );
                DecodeOutcome::Suspect { anomaly, suggested }
            }
        };

        Ok(Decoded { text, outcome })
    }

    /// First catalog entry, in priority order, that decodes `bytes` cleanly.
    fn suggest(&self, bytes: &[u8], declared: EncodingId) -> EncodingId {
        self.entries
            .iter()
            .map(|e| e.id)
            .filter(|id| *id != declared)
            .find(|id| decode_checked(bytes, *id).1.is_none())
            .unwrap_or(declared)
    }

    /// Encodes `text` as `id`. Fails on the first unrepresentable character.
    pub fn encode(&self, text: &str, id: EncodingId) -> Result<Vec<u8>, CatalogError> {
        self.resolve(id)?;
        let mut out = Vec::with_capacity(text.len());
        for ch in text.chars() {
            if !codecs::encode_char(id, ch, &mut out) {
                return Err(CatalogError::Unencodable { ch, encoding: id });
            }
        }
        Ok(out)
    }
}

impl Default for EncodingCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes with `id`, stripping a matching BOM, and reports the first anomaly.
fn decode_checked(bytes: &[u8], id: EncodingId) -> (String, Option<Anomaly>) {
    let bom = codecs::detect_bom(bytes);
    let body = match bom {
        Some((bom_id, len)) if bom_id == id => &bytes[len..],
        _ => bytes,
    };

    let raw = codecs::decode(id, body);

    let anomaly = if let Some((bom_id, _)) = bom.filter(|(bom_id, _)| *bom_id != id) {
        Some(Anomaly::ByteOrderMark(bom_id))
    } else if raw.errors > 0 {
        Some(Anomaly::Undecodable(raw.errors))
    } else if id.is_utf16() && bom.is_none() && !mostly_ascii_units(&raw.text) {
        Some(Anomaly::ImplausibleUtf16)
    } else if id.is_single_byte() && !body.is_ascii() && std::str::from_utf8(body).is_ok() {
        Some(Anomaly::LooksLikeUtf8)
    } else {
        control_density(&raw.text).map(Anomaly::ControlCharacters)
    };

    (raw.text, anomaly)
}

fn mostly_ascii_units(text: &str) -> bool {
    let total = text.encode_utf16().count();
    if total == 0 {
        return true;
    }
    let ascii = text.encode_utf16().filter(|u| *u < 0x80).count();
    ascii * 2 >= total
}

/// Count of control characters when their share exceeds the limit.
fn control_density(text: &str) -> Option<usize> {
    let mut total = 0usize;
    let mut controls = 0usize;
    for ch in text.chars() {
        total += 1;
        if ch.is_control() && !matches!(ch, '\t' | '\n' | '\r' | '\u{000C}') {
            controls += 1;
        }
    }
    if controls > 0 && controls as f64 / total as f64 > CONTROL_DENSITY_LIMIT {
        Some(controls)
    } else {
        None
    }
}
