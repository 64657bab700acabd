use rand::RngCore as _;
use zeroize::Zeroizing;

use super::{ExternalToolError, MaterialGenerator};

const STATIC_KEY_BYTES: usize = 256;
const HEX_LINE_BYTES: usize = 16;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Generates an OpenVPN static key (version 1) without calling `openvpn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticKeyGenerator;

impl MaterialGenerator for StaticKeyGenerator {
    fn generate(&self) -> Result<Vec<u8>, ExternalToolError> {
        let mut key = Zeroizing::new([0u8; STATIC_KEY_BYTES]);
        rand::rng().fill_bytes(key.as_mut_slice());

        let pem = encode_static_key(key.as_slice());

        Ok(pem.as_bytes().to_vec())
    }
}

/// Formats `key` the way `openvpn --genkey secret` does.
fn encode_static_key(key: &[u8]) -> Zeroizing<String> {
    let mut pem = Zeroizing::new(String::with_capacity(1024));
    pem.push_str("#\n# 2048 bit OpenVPN static key\n#\n");
    pem.push_str("-----BEGIN OpenVPN Static key V1-----\n");
    for line in key.chunks(HEX_LINE_BYTES) {
        for byte in line {
            pem.push(char::from(HEX_DIGITS[usize::from(byte >> 4)]));
            pem.push(char::from(HEX_DIGITS[usize::from(byte & 0x0f)]));
        }
        pem.push('\n');
    }
    pem.push_str("-----END OpenVPN Static key V1-----\n");

    pem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_key_format() {
        let key = StaticKeyGenerator.generate().unwrap();
        let key = String::from_utf8(key).unwrap();
        let lines: Vec<_> = key.lines().collect();

        assert_eq!(lines.len(), 3 + 1 + 16 + 1);
        assert_eq!(lines[3], "-----BEGIN OpenVPN Static key V1-----");
        assert_eq!(lines[20], "-----END OpenVPN Static key V1-----");
        for line in &lines[4..20] {
            assert_eq!(line.len(), 32);
            assert!(line.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn encodes_lowercase_hex_lines() {
        let key: Vec<u8> = (0..=255).collect();
        let pem = encode_static_key(&key);
        let lines: Vec<_> = pem.lines().collect();

        assert_eq!(lines[4], "000102030405060708090a0b0c0d0e0f");
        assert_eq!(lines[19], "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff");
    }

    #[test]
    fn static_keys_are_random() {
        assert_ne!(
            StaticKeyGenerator.generate().unwrap(),
            StaticKeyGenerator.generate().unwrap()
        );
    }
}
