//! Byte-level decoders and encoders for the catalog's encodings.
//!
//! Decoders never fail: undecodable input is replaced with U+FFFD and counted,
//! so the sanity check can judge the result instead of the caller.

use super::EncodingId;

const REPLACEMENT: char = '\u{FFFD}';

/// Windows-1252 code points for bytes 0x80..=0x9F. `None` marks the five
/// unassigned positions.
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Mac OS Roman code points for bytes 0x80..=0xFF.
const MAC_ROMAN_HIGH: [char; 128] = [
    // 0x80
    '\u{00C4}', '\u{00C5}', '\u{00C7}', '\u{00C9}', '\u{00D1}', '\u{00D6}', '\u{00DC}', '\u{00E1}',
    '\u{00E0}', '\u{00E2}', '\u{00E4}', '\u{00E3}', '\u{00E5}', '\u{00E7}', '\u{00E9}', '\u{00E8}',
    // 0x90
    '\u{00EA}', '\u{00EB}', '\u{00ED}', '\u{00EC}', '\u{00EE}', '\u{00EF}', '\u{00F1}', '\u{00F3}',
    '\u{00F2}', '\u{00F4}', '\u{00F6}', '\u{00F5}', '\u{00FA}', '\u{00F9}', '\u{00FB}', '\u{00FC}',
    // 0xA0
    '\u{2020}', '\u{00B0}', '\u{00A2}', '\u{00A3}', '\u{00A7}', '\u{2022}', '\u{00B6}', '\u{00DF}',
    '\u{00AE}', '\u{00A9}', '\u{2122}', '\u{00B4}', '\u{00A8}', '\u{2260}', '\u{00C6}', '\u{00D8}',
    // 0xB0
    '\u{221E}', '\u{00B1}', '\u{2264}', '\u{2265}', '\u{00A5}', '\u{00B5}', '\u{2202}', '\u{2211}',
    '\u{220F}', '\u{03C0}', '\u{222B}', '\u{00AA}', '\u{00BA}', '\u{03A9}', '\u{00E6}', '\u{00F8}',
    // 0xC0
    '\u{00BF}', '\u{00A1}', '\u{00AC}', '\u{221A}', '\u{0192}', '\u{2248}', '\u{2206}', '\u{00AB}',
    '\u{00BB}', '\u{2026}', '\u{00A0}', '\u{00C0}', '\u{00C3}', '\u{00D5}', '\u{0152}', '\u{0153}',
    // 0xD0
    '\u{2013}', '\u{2014}', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '\u{00F7}', '\u{25CA}',
    '\u{00FF}', '\u{0178}', '\u{2044}', '\u{20AC}', '\u{2039}', '\u{203A}', '\u{FB01}', '\u{FB02}',
    // 0xE0
    '\u{2021}', '\u{00B7}', '\u{201A}', '\u{201E}', '\u{2030}', '\u{00C2}', '\u{00CA}', '\u{00C1}',
    '\u{00CB}', '\u{00C8}', '\u{00CD}', '\u{00CE}', '\u{00CF}', '\u{00CC}', '\u{00D3}', '\u{00D4}',
    // 0xF0
    '\u{F8FF}', '\u{00D2}', '\u{00DA}', '\u{00DB}', '\u{00D9}', '\u{0131}', '\u{02C6}', '\u{02DC}',
    '\u{00AF}', '\u{02D8}', '\u{02D9}', '\u{02DA}', '\u{00B8}', '\u{02DD}', '\u{02DB}', '\u{02C7}',
];

/// Result of decoding a byte buffer with one encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawDecode {
    pub text: String,
    /// Number of byte sequences that could not be decoded.
    pub errors: usize,
}

/// Byte-order marks recognised on input.
pub(crate) fn detect_bom(bytes: &[u8]) -> Option<(EncodingId, usize)> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some((EncodingId::Utf8, 3))
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some((EncodingId::Utf16Le, 2))
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some((EncodingId::Utf16Be, 2))
    } else {
        None
    }
}

/// Decodes `bytes` (BOM already stripped) as `id`.
pub(crate) fn decode(id: EncodingId, bytes: &[u8]) -> RawDecode {
    match id {
        EncodingId::Utf8 => decode_utf8(bytes),
        EncodingId::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        EncodingId::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        EncodingId::Ascii => decode_single_byte(bytes, |b| (b < 0x80).then_some(b as char)),
        EncodingId::Latin1 => decode_single_byte(bytes, |b| Some(b as char)),
        EncodingId::Windows1252 => decode_single_byte(bytes, |b| match b {
            0x80..=0x9F => WINDOWS_1252_HIGH[usize::from(b - 0x80)],
            _ => Some(b as char),
        }),
        EncodingId::MacRoman => decode_single_byte(bytes, |b| {
            if b < 0x80 {
                Some(b as char)
            } else {
                Some(MAC_ROMAN_HIGH[usize::from(b - 0x80)])
            }
        }),
    }
}

/// Encodes a single character, returning `None` when `id` cannot represent it.
pub(crate) fn encode_char(id: EncodingId, ch: char, out: &mut Vec<u8>) -> bool {
    match id {
        EncodingId::Utf8 => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            true
        }
        EncodingId::Utf16Le | EncodingId::Utf16Be => {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                let bytes = if id == EncodingId::Utf16Le {
                    unit.to_le_bytes()
                } else {
                    unit.to_be_bytes()
                };
                out.extend_from_slice(&bytes);
            }
            true
        }
        EncodingId::Ascii => push_if(out, ch.is_ascii().then_some(ch as u8)),
        EncodingId::Latin1 => push_if(out, u8::try_from(u32::from(ch)).ok()),
        EncodingId::Windows1252 => {
            let byte = match u32::from(ch) {
                c @ (0x00..=0x7F | 0xA0..=0xFF) => Some(c as u8),
                _ => WINDOWS_1252_HIGH
                    .iter()
                    .position(|mapped| *mapped == Some(ch))
                    .map(|idx| 0x80 + idx as u8),
            };
            push_if(out, byte)
        }
        EncodingId::MacRoman => {
            let byte = if ch.is_ascii() {
                Some(ch as u8)
            } else {
                MAC_ROMAN_HIGH
                    .iter()
                    .position(|mapped| *mapped == ch)
                    .map(|idx| 0x80 + idx as u8)
            };
            push_if(out, byte)
        }
    }
}

fn push_if(out: &mut Vec<u8>, byte: Option<u8>) -> bool {
    match byte {
        Some(b) => {
            out.push(b);
            true
        }
        None => false,
    }
}

fn decode_utf8(bytes: &[u8]) -> RawDecode {
    let mut text = String::with_capacity(bytes.len());
    let mut errors = 0;
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
        if !chunk.invalid().is_empty() {
            errors += 1;
            text.push(REPLACEMENT);
        }
    }
    RawDecode { text, errors }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> RawDecode {
    let mut errors = 0;
    let units = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]));
    let mut text: String = char::decode_utf16(units)
        .map(|r| {
            r.unwrap_or_else(|_| {
                errors += 1;
                REPLACEMENT
            })
        })
        .collect();
    if bytes.len() % 2 == 1 {
        errors += 1;
        text.push(REPLACEMENT);
    }
    RawDecode { text, errors }
}

fn decode_single_byte(bytes: &[u8], map: impl Fn(u8) -> Option<char>) -> RawDecode {
    let mut errors = 0;
    let text = bytes
        .iter()
        .map(|&b| {
            map(b).unwrap_or_else(|| {
                errors += 1;
                REPLACEMENT
            })
        })
        .collect();
    RawDecode { text, errors }
}
