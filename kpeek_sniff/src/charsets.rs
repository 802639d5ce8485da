//! Strict single-shot decoders for the legacy character sets tried by the
//! decode chain.
//!
//! Each decoder either converts the whole input or returns `None`. There is
//! no replacement-character recovery: a partially decodable payload is a
//! rejected payload.

/// Windows-1252 mappings for `0x80..=0x9F`. `None` marks the five bytes the
/// code page leaves undefined.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), // 0x80
    None,             // 0x81
    Some('\u{201A}'), // 0x82
    Some('\u{0192}'), // 0x83
    Some('\u{201E}'), // 0x84
    Some('\u{2026}'), // 0x85
    Some('\u{2020}'), // 0x86
    Some('\u{2021}'), // 0x87
    Some('\u{02C6}'), // 0x88
    Some('\u{2030}'), // 0x89
    Some('\u{0160}'), // 0x8A
    Some('\u{2039}'), // 0x8B
    Some('\u{0152}'), // 0x8C
    None,             // 0x8D
    Some('\u{017D}'), // 0x8E
    None,             // 0x8F
    None,             // 0x90
    Some('\u{2018}'), // 0x91
    Some('\u{2019}'), // 0x92
    Some('\u{201C}'), // 0x93
    Some('\u{201D}'), // 0x94
    Some('\u{2022}'), // 0x95
    Some('\u{2013}'), // 0x96
    Some('\u{2014}'), // 0x97
    Some('\u{02DC}'), // 0x98
    Some('\u{2122}'), // 0x99
    Some('\u{0161}'), // 0x9A
    Some('\u{203A}'), // 0x9B
    Some('\u{0153}'), // 0x9C
    None,             // 0x9D
    Some('\u{017E}'), // 0x9E
    Some('\u{0178}'), // 0x9F
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// Strict UTF-8.
pub fn utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

/// ISO-8859-1: every byte maps to the code point of the same value, so this
/// never fails.
pub fn latin1(bytes: &[u8]) -> Option<String> {
    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

/// 7-bit ASCII; any byte with the high bit set rejects.
pub fn ascii(bytes: &[u8]) -> Option<String> {
    if !bytes.is_ascii() {
        return None;
    }
    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Windows-1252; the five undefined bytes reject.
pub fn cp1252(bytes: &[u8]) -> Option<String> {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
            _ => Some(char::from(b)),
        })
        .collect()
}

/// UTF-16 with optional BOM, little-endian when no BOM is present.
///
/// Odd lengths and unpaired surrogates reject.
pub fn utf16(bytes: &[u8]) -> Option<String> {
    let (endian, body) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (Endian::Little, rest),
        [0xFE, 0xFF, rest @ ..] => (Endian::Big, rest),
        _ => (Endian::Little, bytes),
    };
    if body.len() % 2 != 0 {
        return None;
    }

    let units = body.chunks_exact(2).map(|pair| {
        let pair = [pair[0], pair[1]];
        match endian {
            Endian::Little => u16::from_le_bytes(pair),
            Endian::Big => u16::from_be_bytes(pair),
        }
    });

    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// UTF-32 with optional BOM, little-endian when no BOM is present.
///
/// Lengths that are not a multiple of 4, values beyond `U+10FFFF` and
/// surrogate values reject.
pub fn utf32(bytes: &[u8]) -> Option<String> {
    let (endian, body) = match bytes {
        [0xFF, 0xFE, 0x00, 0x00, rest @ ..] => (Endian::Little, rest),
        [0x00, 0x00, 0xFE, 0xFF, rest @ ..] => (Endian::Big, rest),
        _ => (Endian::Little, bytes),
    };
    if body.len() % 4 != 0 {
        return None;
    }

    body.chunks_exact(4)
        .map(|quad| {
            let quad = [quad[0], quad[1], quad[2], quad[3]];
            let value = match endian {
                Endian::Little => u32::from_le_bytes(quad),
                Endian::Big => u32::from_be_bytes(quad),
            };
            char::from_u32(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_strict() {
        assert_eq!(utf8(b"caf\xc3\xa9").as_deref(), Some("café"));
        assert_eq!(utf8(b"caf\xe9"), None);
        assert_eq!(utf8(b"").as_deref(), Some(""));
    }

    #[test]
    fn test_latin1_accepts_everything() {
        let all: Vec<u8> = (0..=255u8).collect();
        let decoded = latin1(&all).unwrap();
        assert_eq!(decoded.chars().count(), 256);
        assert_eq!(latin1(b"caf\xe9").as_deref(), Some("café"));
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert_eq!(ascii(b"plain").as_deref(), Some("plain"));
        assert_eq!(ascii(b"\x00\x7f").as_deref(), Some("\u{0}\u{7f}"));
        assert_eq!(ascii(b"\x80"), None);
    }

    #[test]
    fn test_cp1252_table() {
        assert_eq!(cp1252(b"\x80").as_deref(), Some("€"));
        assert_eq!(cp1252(b"\x93quoted\x94").as_deref(), Some("\u{201C}quoted\u{201D}"));
        assert_eq!(cp1252(b"\xe9").as_deref(), Some("é"));
        for undefined in [0x81u8, 0x8D, 0x8F, 0x90, 0x9D] {
            assert_eq!(cp1252(&[b'a', undefined]), None, "byte 0x{:02x}", undefined);
        }
    }

    #[test]
    fn test_utf16_byte_order() {
        assert_eq!(utf16(b"h\x00i\x00").as_deref(), Some("hi"));
        assert_eq!(utf16(b"\xff\xfeh\x00i\x00").as_deref(), Some("hi"));
        assert_eq!(utf16(b"\xfe\xff\x00h\x00i").as_deref(), Some("hi"));
        assert_eq!(utf16(b"").as_deref(), Some(""));
    }

    #[test]
    fn test_utf16_rejections() {
        // odd length
        assert_eq!(utf16(b"abc"), None);
        // lone high surrogate 0xD800
        assert_eq!(utf16(b"\x00\xd8"), None);
        // lone low surrogate 0xDC00
        assert_eq!(utf16(b"\x00\xdcA\x00"), None);
        // valid surrogate pair for U+1F600
        assert_eq!(utf16(b"\x3d\xd8\x00\xde").as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn test_utf32_byte_order_and_rejections() {
        assert_eq!(utf32(b"A\x00\x00\x00").as_deref(), Some("A"));
        assert_eq!(utf32(b"\xff\xfe\x00\x00A\x00\x00\x00").as_deref(), Some("A"));
        assert_eq!(utf32(b"\x00\x00\xfe\xff\x00\x00\x00A").as_deref(), Some("A"));
        assert_eq!(utf32(b"A\x00\x00"), None);
        // beyond U+10FFFF
        assert_eq!(utf32(b"\x00\x00\x11\x00"), None);
        // surrogate U+D800
        assert_eq!(utf32(b"\x00\xd8\x00\x00"), None);
    }
}
