//! Safe, never-failing conversion of raw payloads into displayable text.
//!
//! Decoding walks an ordered table of strategies. Each entry pairs a strict
//! decoder with an acceptance predicate; the first entry whose decoder
//! succeeds and whose predicate approves the result wins. When nothing is
//! accepted the payload is rendered as hex.

use crate::charsets;
use crate::classify::is_printable;

/// Prefix of the hex rendering used when no strategy is accepted.
pub const BINARY_MARKER_PREFIX: &str = "[BINARY: ";

/// Suffix of the hex rendering used when no strategy is accepted.
pub const BINARY_MARKER_SUFFIX: &str = "]";

/// Text encodings tried by [`decode`], in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Utf8,
    Latin1,
    Utf16,
    Utf32,
    Ascii,
    Cp1252,
}

impl Strategy {
    /// Codec-style name of the encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Utf8 => "utf-8",
            Strategy::Latin1 => "latin-1",
            Strategy::Utf16 => "utf-16",
            Strategy::Utf32 => "utf-32",
            Strategy::Ascii => "ascii",
            Strategy::Cp1252 => "cp1252",
        }
    }

    /// Runs the strict decoder. `None` means the strategy rejected the input.
    pub fn attempt(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Strategy::Utf8 => charsets::utf8(bytes),
            Strategy::Latin1 => charsets::latin1(bytes),
            Strategy::Utf16 => charsets::utf16(bytes),
            Strategy::Utf32 => charsets::utf32(bytes),
            Strategy::Ascii => charsets::ascii(bytes),
            Strategy::Cp1252 => charsets::cp1252(bytes),
        }
    }
}

/// Accepts any successfully decoded text.
fn always(_: &str) -> bool {
    true
}

/// The decode chain. Latin-1 maps every byte sequence, so its printability
/// check is what makes it a real discriminator.
const CHAIN: [(Strategy, fn(&str) -> bool); 6] = [
    (Strategy::Utf8, always),
    (Strategy::Latin1, is_printable),
    (Strategy::Utf16, always),
    (Strategy::Utf32, always),
    (Strategy::Ascii, always),
    (Strategy::Cp1252, always),
];

/// Outcome of [`decode_detailed`]: the text plus which strategy produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Display text.
    pub text: String,
    /// The accepted strategy, or `None` when the hex fallback was used.
    pub strategy: Option<Strategy>,
}

/// Decodes a payload and reports which strategy was accepted.
pub fn decode_detailed(bytes: &[u8]) -> Decoded {
    CHAIN
        .iter()
        .find_map(|(strategy, accept)| {
            strategy
                .attempt(bytes)
                .filter(|text| accept(text.as_str()))
                .map(|text| Decoded {
                    text,
                    strategy: Some(*strategy),
                })
        })
        .unwrap_or_else(|| Decoded {
            text: hex_fallback(bytes),
            strategy: None,
        })
}

/// Decodes a payload into displayable text. Never fails.
///
/// Tried in order: strict UTF-8; Latin-1 if the result is entirely
/// printable; then UTF-16, UTF-32, ASCII and CP1252 on decode success alone.
/// If none is accepted the result is `[BINARY: <lowercase hex>]`.
///
/// # Examples
/// ```
/// use kpeek_sniff::decode;
///
/// assert_eq!(decode(b"hello"), "hello");
/// assert_eq!(decode(b"caf\xe9"), "café");
/// assert_eq!(decode(&[0x81]), "[BINARY: 81]");
/// ```
pub fn decode(bytes: &[u8]) -> String {
    decode_detailed(bytes).text
}

/// Like [`decode`], but passes an absent payload through as `None`.
pub fn decode_payload(payload: Option<&[u8]>) -> Option<String> {
    payload.map(decode)
}

/// Renders bytes as `[BINARY: <lowercase hex>]`.
pub fn hex_fallback(bytes: &[u8]) -> String {
    format!(
        "{}{}{}",
        BINARY_MARKER_PREFIX,
        hex::encode(bytes),
        BINARY_MARKER_SUFFIX
    )
}
