//! Content tags assigned to payloads by [`classify`](crate::classify).

use std::fmt;

/// Best-guess description of what a payload's bytes look like.
///
/// Every payload, including an empty one, maps to exactly one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ContentTag {
    /// The payload is absent (a `null` key or value, e.g. a tombstone).
    Null,
    /// At least 5 bytes with a leading `0x00`, the framing used by
    /// schema-registry style binary serializers.
    AvroBinary,
    /// Starts with `{` or `[`.
    JsonLike,
    /// Valid UTF-8 made only of printable characters.
    Utf8Text,
    /// Contains a `0x00` byte somewhere.
    BinaryWithNull,
    /// None of the above.
    Unknown,
}

impl ContentTag {
    /// Every tag, in classification priority order.
    pub const ALL: [ContentTag; 6] = [
        ContentTag::Null,
        ContentTag::AvroBinary,
        ContentTag::JsonLike,
        ContentTag::Utf8Text,
        ContentTag::BinaryWithNull,
        ContentTag::Unknown,
    ];

    /// The canonical upper-case name, as written in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentTag::Null => "NULL",
            ContentTag::AvroBinary => "AVRO_BINARY",
            ContentTag::JsonLike => "JSON_LIKE",
            ContentTag::Utf8Text => "UTF8_TEXT",
            ContentTag::BinaryWithNull => "BINARY_WITH_NULL",
            ContentTag::Unknown => "UNKNOWN",
        }
    }

    /// Whether payloads with this tag read well as plain text.
    ///
    /// Text-like payloads are shown in full by report printers, the others
    /// get truncated previews.
    pub fn is_textual(&self) -> bool {
        matches!(self, ContentTag::Utf8Text | ContentTag::JsonLike)
    }
}

impl fmt::Display for ContentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
