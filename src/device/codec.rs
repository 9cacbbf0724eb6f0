//! Conversion between record fields and GATT characteristic values.
//!
//! A value is the bare UTF-8 encoding of the text, without a length prefix or terminator.

pub fn encode(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

/// Invalid UTF-8 is replaced with U+FFFD instead of failing the read.
pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reverses_encode() {
        for value in ["", "Ana", "Lee", "30", "Zoë Ñúñez", "李", "🦀 crab"] {
            assert_eq!(decode(&encode(value)), value);
        }
    }

    #[test]
    fn encode_has_no_prefix_or_terminator() {
        assert_eq!(encode("30"), vec![0x33, 0x30]);
    }

    #[test]
    fn decode_replaces_invalid_sequences() {
        assert_eq!(decode(&[0x41, 0xFF, 0x42]), "A\u{FFFD}B");
    }
}
