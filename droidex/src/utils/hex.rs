pub const HEX_BYTES: &[u8; 16] = HEX_BYTES_LOWER;

pub const HEX_BYTES_LOWER: &[u8; 16] = &[
    b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'a', b'b', b'c', b'd', b'e', b'f',
];

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut into = String::with_capacity(bytes.len() * 2);

    for b in bytes {
        let high = (b & 0xF0) >> 4;
        let low = b & 0xF;
        into.push(HEX_BYTES[high as usize] as char);
        into.push(HEX_BYTES[low as usize] as char);
    }
    into
}

/// Whether the string is a lower case hex digest of the given byte length
pub fn is_hex_digest(s: &str, byte_len: usize) -> bool {
    s.len() == byte_len * 2 && s.bytes().all(|b| HEX_BYTES_LOWER.contains(&b))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(bytes_to_hex(&[0x00, 0x7f, 0xab, 0xff]), "007fabff");
        assert_eq!(bytes_to_hex(&[]), "");
    }

    #[test]
    fn test_is_hex_digest() {
        assert!(is_hex_digest("007fabff", 4));
        assert!(!is_hex_digest("007FABFF", 4));
        assert!(!is_hex_digest("Error: nope", 4));
    }
}
