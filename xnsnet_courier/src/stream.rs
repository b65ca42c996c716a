//! StreamOf: an unbounded list sent as a chain of SEQUENCE segments.
//!
//! Each segment is a CHOICE tag, `nextSegment` (0) or `lastSegment` (1),
//! followed by a counted list of elements. Reading follows the chain until
//! the last segment.

use crate::error::CourierError;
use crate::types::{CourierType, DESCRIBE_INDENT, describe_line};
use crate::wire::{WireReader, WireWriter};
use serde_json::Value;

pub const NEXT_SEGMENT: u16 = 0;
pub const LAST_SEGMENT: u16 = 1;
pub const MAX_SEGMENT_LENGTH: usize = u16::MAX as usize;

#[derive(Debug, Clone)]
pub struct StreamOf<T> {
    pub items: Vec<T>,
    segment_length: usize,
}

impl<T: PartialEq> PartialEq for StreamOf<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T> Default for StreamOf<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> StreamOf<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            segment_length: MAX_SEGMENT_LENGTH,
        }
    }

    /// Splits the stream into segments of at most `length` elements when
    /// serialized.
    pub fn with_segment_length(mut self, length: usize) -> Self {
        self.segment_length = length.clamp(1, MAX_SEGMENT_LENGTH);
        self
    }
}

impl<T: CourierType> CourierType for StreamOf<T> {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        let mut segments = self.items.chunks(self.segment_length).peekable();
        if segments.peek().is_none() {
            writer.write_u16(LAST_SEGMENT);
            writer.write_u16(0);
            return Ok(());
        }
        while let Some(segment) = segments.next() {
            let tag = if segments.peek().is_some() {
                NEXT_SEGMENT
            } else {
                LAST_SEGMENT
            };
            writer.write_u16(tag);
            writer.write_u16(segment.len() as u16);
            for item in segment {
                item.serialize(writer)?;
            }
        }
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        let mut items = Vec::new();
        loop {
            let tag = reader.read_u16()?;
            if tag != NEXT_SEGMENT && tag != LAST_SEGMENT {
                return Err(CourierError::UnknownChoiceTag(format!(
                    "StreamOf segment tag {tag}"
                )));
            }
            let count = reader.read_u16()?;
            for _ in 0..count {
                items.push(T::deserialize(reader)?);
            }
            if tag == LAST_SEGMENT {
                return Ok(Self::new(items));
            }
        }
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, format_args!("StreamOf[{}]", self.items.len()));
        let nested = format!("{prefix}{DESCRIBE_INDENT}");
        for (index, item) in self.items.iter().enumerate() {
            item.describe(out, &nested, &format!("[{index}]"));
        }
    }

    fn to_json(&self) -> Value {
        Value::Array(self.items.iter().map(CourierType::to_json).collect())
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        match value {
            Value::Array(items) => Ok(Self::new(
                items.iter().map(T::from_json).collect::<Result<_, _>>()?,
            )),
            other => Err(CourierError::Json(format!("expected StreamOf, found {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{from_wire, to_wire};

    #[test]
    fn segments_are_chained() {
        let stream = StreamOf::new(vec![1u16, 2, 3]).with_segment_length(2);
        let data = to_wire(&stream).unwrap();
        assert_eq!(data.as_ref(), &[0, 0, 0, 2, 0, 1, 0, 2, 0, 1, 0, 1, 0, 3]);

        let decoded: StreamOf<u16> = from_wire(&data).unwrap();
        assert_eq!(decoded.items, vec![1, 2, 3]);
    }

    #[test]
    fn empty_stream_is_one_last_segment() {
        let data = to_wire(&StreamOf::<u32>::default()).unwrap();
        assert_eq!(data.as_ref(), &[0, 1, 0, 0]);
        assert!(from_wire::<StreamOf<u32>>(&data).unwrap().items.is_empty());
    }

    #[test]
    fn broken_chain_fails() {
        assert!(from_wire::<StreamOf<u16>>(&[0, 0, 0, 1, 0, 9]).is_err());
        assert!(from_wire::<StreamOf<u16>>(&[0, 4, 0, 0]).is_err());
    }

    #[test]
    fn json_is_flat() {
        let stream = StreamOf::new(vec![true, false]);
        let value = stream.to_json();
        assert_eq!(value, serde_json::json!([true, false]));
        assert_eq!(StreamOf::<bool>::from_json(&value).unwrap(), stream);
    }
}
