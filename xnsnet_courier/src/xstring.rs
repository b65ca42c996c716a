//! Courier STRING in the Xerox character-set-switching encoding.
//!
//! On the wire a STRING is a byte count followed by the bytes, packed two
//! per word. The bytes are kept verbatim so that re-serializing a received
//! string reproduces it exactly. Decoding follows the Xstring rules:
//!
//! * in 8-bit mode every byte except `0xFF` is a character of the current
//!   character set (initially 0);
//! * `0xFF cs` switches to character set `cs`, and `0xFF 0xFF` enters 16-bit
//!   mode;
//! * in 16-bit mode every byte pair is one character code, except `0xFF cs`
//!   which returns to 8-bit mode with character set `cs`.
//!
//! A character code is `charset << 8 | byte`. Codes are mapped to Unicode
//! one-to-one, which makes character set 0 read as Latin-1.

use crate::error::CourierError;
use crate::types::{CourierType, describe_line};
use crate::wire::{WireReader, WireWriter};
use serde_json::Value;
use std::fmt::{Display, Formatter};

const ESCAPE: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct XString {
    bytes: Vec<u8>,
}

impl XString {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Encodes `text` in 8-bit mode, switching character sets as needed.
    /// Characters outside the 16-bit range, and codes with the escape byte in
    /// either half, are replaced by `?`.
    pub fn encode(text: &str) -> Self {
        let mut bytes = Vec::with_capacity(text.len());
        let mut charset = 0u8;
        for character in text.chars() {
            let code = u32::from(character);
            let code = if code > 0xFFFF
                || code & 0xFF == u32::from(ESCAPE)
                || code >> 8 == u32::from(ESCAPE)
            {
                u32::from('?')
            } else {
                code
            };
            let (high, low) = ((code >> 8) as u8, code as u8);
            if high != charset {
                bytes.push(ESCAPE);
                bytes.push(high);
                charset = high;
            }
            bytes.push(low);
        }
        Self { bytes }
    }

    /// Xerox character codes carried by the string.
    pub fn codes(&self) -> Vec<u16> {
        let mut codes = Vec::with_capacity(self.bytes.len());
        let mut charset = 0u8;
        let mut wide = false;
        let mut index = 0;
        while index < self.bytes.len() {
            let byte = self.bytes[index];
            let next = self.bytes.get(index + 1).copied();
            if byte == ESCAPE {
                match next {
                    Some(ESCAPE) if !wide => wide = true,
                    Some(set) => {
                        charset = set;
                        wide = false;
                    }
                    None => {}
                }
                index += 2;
            } else if wide {
                codes.push(u16::from_be_bytes([byte, next.unwrap_or(0)]));
                index += 2;
            } else {
                codes.push(u16::from_be_bytes([charset, byte]));
                index += 1;
            }
        }
        codes
    }
}

impl From<&str> for XString {
    fn from(value: &str) -> Self {
        Self::encode(value)
    }
}

impl Display for XString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text: String = self
            .codes()
            .into_iter()
            .map(|code| char::from_u32(u32::from(code)).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        f.write_str(&text)
    }
}

impl CourierType for XString {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        if self.bytes.len() > usize::from(u16::MAX) {
            return Err(CourierError::EncodeError(format!(
                "STRING of {} bytes is too long",
                self.bytes.len()
            )));
        }
        writer.write_u16(self.bytes.len() as u16);
        for byte in &self.bytes {
            writer.write_u8(*byte);
        }
        writer.reset_word_boundary();
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        let length = usize::from(reader.read_u16()?);
        let mut bytes = Vec::with_capacity(length);
        for _ in 0..length {
            bytes.push(reader.read_u8()?);
        }
        reader.reset_word_boundary();
        Ok(Self { bytes })
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, format_args!("\"{self}\""));
    }

    /// A JSON string when the text re-encodes to the same bytes, otherwise
    /// the raw bytes as an array.
    fn to_json(&self) -> Value {
        let text = self.to_string();
        if Self::encode(&text) == *self {
            Value::String(text)
        } else {
            Value::Array(self.bytes.iter().map(|byte| Value::from(*byte)).collect())
        }
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        match value {
            Value::String(text) => Ok(Self::encode(text)),
            Value::Array(items) => items
                .iter()
                .map(|item| match item.as_u64() {
                    Some(byte) if byte <= 0xFF => Ok(byte as u8),
                    _ => Err(CourierError::Json(format!("expected a byte, found {item}"))),
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Self::from_bytes),
            other => Err(CourierError::Json(format!("expected STRING, found {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{from_wire, to_wire};

    fn cases() -> Vec<Vec<u8>> {
        vec![
            vec![],
            b"abcdef".to_vec(),
            vec![b'G', b'r', 0xFF, 0xF1, 0xE5, 0xFF, 0x00, 0xFB, b'e', b'n'],
            vec![0xFB, b'a', b'b', 0xAB],
            vec![
                b'a', b'B', 0xFF, 0xFF, 0x11, 0x22, 0x33, 0x44, 0xFF, 0x00, b'c', b'D',
            ],
        ]
    }

    #[test]
    fn reserializes_byte_exactly() {
        for case in cases() {
            let mut wire = vec![0, case.len() as u8];
            wire.extend_from_slice(&case);
            if case.len() % 2 == 1 {
                wire.push(0);
            }
            let decoded: XString = from_wire(&wire).unwrap();
            assert_eq!(decoded.as_bytes(), case.as_slice());
            assert_eq!(to_wire(&decoded).unwrap().as_ref(), wire.as_slice());
        }
    }

    #[test]
    fn decodes_character_sets() {
        let single = XString::from_bytes(cases()[2].clone());
        assert_eq!(single.codes(), vec![0x47, 0x72, 0xF1E5, 0x00FB, 0x65, 0x6E]);

        let wide = XString::from_bytes(cases()[4].clone());
        assert_eq!(wide.codes(), vec![0x61, 0x42, 0x1122, 0x3344, 0x63, 0x44]);
        assert_eq!(wide.to_string(), "aB\u{1122}\u{3344}cD");
    }

    #[test]
    fn encode_switches_sets() {
        let encoded = XString::encode("Gr\u{F1E5}\u{FB}en");
        assert_eq!(encoded.as_bytes(), cases()[2].as_slice());
        assert_eq!(XString::from("plain").as_bytes(), b"plain");
    }

    #[test]
    fn escape_charset_is_not_encodable() {
        let encoded = XString::encode("\u{FF41}b");
        assert_eq!(encoded.as_bytes(), b"?b");
        assert_eq!(encoded.codes(), vec![0x3F, 0x62]);

        let text = encoded.to_string();
        assert_eq!(text, "?b");
        let json = encoded.to_json();
        assert_eq!(json, Value::String(text));
        assert_eq!(XString::from_json(&json).unwrap(), encoded);
        assert_eq!(XString::encode("\u{00FF}\u{FFFF}").as_bytes(), b"??");
    }

    #[test]
    fn json_keeps_bytes() {
        for case in cases() {
            let string = XString::from_bytes(case);
            assert_eq!(XString::from_json(&string.to_json()).unwrap(), string);
        }
        assert_eq!(XString::from("hi").to_json(), Value::String("hi".to_string()));
    }
}
