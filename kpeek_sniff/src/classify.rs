//! Byte-pattern sniffing for raw payloads.

use crate::tag::ContentTag;

/// Minimum length for the leading-zero binary framing sniff.
pub const AVRO_MIN_LEN: usize = 5;

/// Whether a decoded character is fit for direct display.
///
/// Control characters are not, except the whitespace controls tab, line feed
/// and carriage return.
pub fn is_printable_char(c: char) -> bool {
    !c.is_control() || matches!(c, '\t' | '\n' | '\r')
}

/// Whether every character of `s` is printable. Vacuously true for `""`.
pub fn is_printable(s: &str) -> bool {
    s.chars().all(is_printable_char)
}

/// Assigns a [`ContentTag`] to a payload. First matching rule wins:
///
/// 1. absent payload: [`ContentTag::Null`]
/// 2. at least [`AVRO_MIN_LEN`] bytes starting with `0x00`: [`ContentTag::AvroBinary`]
/// 3. starts with `{` or `[`: [`ContentTag::JsonLike`]
/// 4. valid UTF-8 and entirely printable: [`ContentTag::Utf8Text`]
/// 5. contains a `0x00` byte: [`ContentTag::BinaryWithNull`]
/// 6. otherwise [`ContentTag::Unknown`]
///
/// The leading-zero check is a cheap sniff, not a verified magic number.
/// An empty payload falls through to rule 4 and is `Utf8Text`.
///
/// # Examples
/// ```
/// use kpeek_sniff::{classify, ContentTag};
///
/// assert_eq!(classify(None), ContentTag::Null);
/// assert_eq!(classify(Some(b"[1,2]")), ContentTag::JsonLike);
/// assert_eq!(classify(Some(b"A\x00B")), ContentTag::BinaryWithNull);
/// ```
pub fn classify(payload: Option<&[u8]>) -> ContentTag {
    let Some(bytes) = payload else {
        return ContentTag::Null;
    };

    match bytes.first() {
        Some(0x00) if bytes.len() >= AVRO_MIN_LEN => return ContentTag::AvroBinary,
        Some(b'{') | Some(b'[') => return ContentTag::JsonLike,
        _ => {}
    }

    if std::str::from_utf8(bytes).is_ok_and(is_printable) {
        return ContentTag::Utf8Text;
    }

    if bytes.contains(&0x00) {
        return ContentTag::BinaryWithNull;
    }

    ContentTag::Unknown
}
