//! impress-frames: interned record store for the impress case editor.
//!
//! Records ("frames") are ordered sequences of `(key, value)` slots. Keys may
//! repeat, which is how multi-valued properties are expressed. A record is
//! either named (it has a stable id such as `t/17/4` or `Q42`) or anonymous
//! (used for qualified values nested inside other records).
//!
//! All records live in an append-only [`Store`] arena and are referenced by
//! [`Handle`]. Handles are never invalidated, so references between records
//! can be rewritten in place without any ownership bookkeeping.
//!
//! Two serializations are provided:
//!
//! ```text
//! text:    {=t/17/4 name:"Alice" is:Q42 P69:{is:Q35794 P580:1998}}
//! binary:  0x00 <record>*      (LEB128 varints, tagged values)
//! ```
//!
//! [`parse_payload`] detects the format from the first byte.

pub mod binary;
pub mod error;
pub mod store;
pub mod text;

pub use binary::{Decoder, Encoder, BINARY_MARKER};
pub use error::FrameError;
pub use store::{Handle, Slot, Store, Value};
pub use text::{parse_text, Printer};

/// Parse a text or binary payload into `store`, returning the top-level
/// records in payload order.
pub fn parse_payload(store: &mut Store, data: &[u8]) -> Result<Vec<Handle>, FrameError> {
    match data.first() {
        Some(&BINARY_MARKER) => Decoder::new(store, data).decode_all(),
        Some(_) => {
            let text = std::str::from_utf8(data).map_err(|_| FrameError::InvalidUtf8)?;
            if text.trim_start().starts_with('{') {
                parse_text(store, text)
            } else {
                Err(FrameError::UnknownFormat)
            }
        }
        None => Err(FrameError::UnexpectedEnd),
    }
}

/// Returns true if `data` starts with a marker of one of the record formats.
pub fn is_record_payload(data: &[u8]) -> bool {
    matches!(data.first(), Some(&BINARY_MARKER) | Some(&b'{'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_dispatch() {
        let mut store = Store::new();
        let text = parse_payload(&mut store, b"{=Q42 name:\"Douglas\"}").unwrap();
        assert_eq!(store.id(text[0]), Some("Q42"));

        let mut encoder = Encoder::new(&store);
        encoder.encode(text[0]);
        let bytes = encoder.output();

        let mut other = Store::new();
        let binary = parse_payload(&mut other, &bytes).unwrap();
        assert_eq!(other.id(binary[0]), Some("Q42"));
    }

    #[test]
    fn test_unknown_format() {
        let mut store = Store::new();
        assert!(matches!(
            parse_payload(&mut store, b"https://example.org"),
            Err(FrameError::UnknownFormat)
        ));
        assert!(!is_record_payload(b"plain text"));
        assert!(is_record_payload(b"{}"));
    }
}
