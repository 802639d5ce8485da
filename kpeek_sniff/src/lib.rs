//! kpeek_sniff - content sniffing and safe decoding for raw Kafka payloads
//!
//! This crate answers two questions about an arbitrary message key or value:
//! what does it look like ([`classify`]) and how can it be shown to a human
//! ([`decode`]). Both are pure, total functions: they never panic, never fail,
//! and keep no state between calls, so they can be called from any number of
//! consumer tasks at once.
//!
//! ```
//! use kpeek_sniff::{classify, decode, ContentTag};
//!
//! let value: &[u8] = b"{\"user\":42}";
//! assert_eq!(classify(Some(value)), ContentTag::JsonLike);
//! assert_eq!(decode(value), "{\"user\":42}");
//! ```
//!
//! Absent payloads (`None`) are distinct from empty ones: `classify(None)` is
//! [`ContentTag::Null`] while an empty slice classifies as
//! [`ContentTag::Utf8Text`] and decodes to `""`.

pub mod charsets;
mod classify;
mod decode;
mod tag;

pub use classify::{classify, is_printable, is_printable_char, AVRO_MIN_LEN};
pub use decode::{
    decode, decode_detailed, decode_payload, hex_fallback, Decoded, Strategy,
    BINARY_MARKER_PREFIX, BINARY_MARKER_SUFFIX,
};
pub use tag::ContentTag;

#[cfg(test)]
mod tests {
    use super::*;

    fn is_thread_safe<T: Sized + Send + Sync + Unpin>() {}

    #[test]
    fn test_types_thread_safety() {
        is_thread_safe::<ContentTag>();
        is_thread_safe::<Decoded>();
        is_thread_safe::<Strategy>();
    }

    #[test]
    fn test_classify_then_decode() {
        let cases: [(Option<&[u8]>, ContentTag, Option<&str>); 4] = [
            (None, ContentTag::Null, None),
            (Some(b""), ContentTag::Utf8Text, Some("")),
            (Some(b"hello world"), ContentTag::Utf8Text, Some("hello world")),
            (Some(b"[1,2]"), ContentTag::JsonLike, Some("[1,2]")),
        ];
        for (payload, tag, text) in cases {
            assert_eq!(classify(payload), tag);
            assert_eq!(decode_payload(payload).as_deref(), text);
        }
    }

    #[test]
    fn test_concurrent_callers() {
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                std::thread::spawn(move || {
                    let payload = vec![i, 0x00, 0xff, b'{', i];
                    (0..1000)
                        .map(|_| (classify(Some(&payload)), decode(&payload)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            let results = handle.join().unwrap();
            assert!(results.windows(2).all(|w| w[0] == w[1]));
        }
    }
}
