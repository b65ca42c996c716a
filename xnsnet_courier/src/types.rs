//! The Courier type capability and its primitive and list implementations.
//!
//! Every Courier value, primitive or composite, implements [`CourierType`]:
//! wire (de)serialization, JSON conversion and a readable description.
//! RECORD, CHOICE and ENUM types are generated by the macros in
//! [`crate::macros`]; lists are the generic `Sequence` and `Array`.

use crate::error::CourierError;
use crate::wire::{WireReader, WireWriter};
use serde_json::Value;
use std::fmt::Write;

pub const DESCRIBE_INDENT: &str = "  ";

pub trait CourierType: Sized + Default {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError>;

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError>;

    /// Appends `prefix label: value` lines describing this value.
    fn describe(&self, out: &mut String, prefix: &str, label: &str);

    fn to_json(&self) -> Value;

    /// Missing members of JSON objects fall back to their defaults.
    fn from_json(value: &Value) -> Result<Self, CourierError>;
}

/// Serializes `value` into a fresh, word-aligned buffer.
pub fn to_wire<T: CourierType>(value: &T) -> Result<bytes::Bytes, CourierError> {
    let mut writer = WireWriter::new();
    value.serialize(&mut writer)?;
    Ok(writer.finish())
}

/// Deserializes `T` from `data`, which must be consumed exactly.
pub fn from_wire<T: CourierType>(data: &[u8]) -> Result<T, CourierError> {
    let mut reader = WireReader::from_slice(data);
    let value = T::deserialize(&mut reader)?;
    if !reader.is_at_end() {
        return Err(CourierError::MessageError(format!(
            "{} trailing bytes",
            reader.remaining()
        )));
    }
    Ok(value)
}

pub fn describe_value<T: CourierType>(value: &T, label: &str) -> String {
    let mut out = String::new();
    value.describe(&mut out, "", label);
    out
}

pub fn describe_line(out: &mut String, prefix: &str, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{prefix}{label}: {value}");
}

pub(crate) fn json_u64(value: &Value, kind: &str, max: u64) -> Result<u64, CourierError> {
    match value.as_u64() {
        Some(number) if number <= max => Ok(number),
        _ => Err(CourierError::Json(format!("expected {kind}, found {value}"))),
    }
}

pub(crate) fn json_i64(value: &Value, kind: &str, min: i64, max: i64) -> Result<i64, CourierError> {
    match value.as_i64() {
        Some(number) if (min..=max).contains(&number) => Ok(number),
        _ => Err(CourierError::Json(format!("expected {kind}, found {value}"))),
    }
}

/// Reads an object member, defaulting when the member is absent.
pub fn json_field<T: CourierType>(value: &Value, name: &str) -> Result<T, CourierError> {
    match value.get(name) {
        Some(Value::Null) | None => Ok(T::default()),
        Some(member) => T::from_json(member),
    }
}

impl CourierType for bool {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u16(u16::from(*self));
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        Ok(reader.read_u16()? != 0)
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, self);
    }

    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        value
            .as_bool()
            .ok_or_else(|| CourierError::Json(format!("expected BOOLEAN, found {value}")))
    }
}

/// CARDINAL
impl CourierType for u16 {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u16(*self);
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        reader.read_u16()
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, self);
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        Ok(json_u64(value, "CARDINAL", u64::from(u16::MAX))? as u16)
    }
}

/// LONG CARDINAL
impl CourierType for u32 {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u32(*self);
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        reader.read_u32()
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, self);
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        Ok(json_u64(value, "LONG CARDINAL", u64::from(u32::MAX))? as u32)
    }
}

/// INTEGER
impl CourierType for i16 {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u16(*self as u16);
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        Ok(reader.read_u16()? as i16)
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, self);
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        Ok(json_i64(value, "INTEGER", i64::from(i16::MIN), i64::from(i16::MAX))? as i16)
    }
}

/// LONG INTEGER
impl CourierType for i32 {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u32(*self as u32);
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        Ok(reader.read_u32()? as i32)
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, self);
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        Ok(json_i64(value, "LONG INTEGER", i64::from(i32::MIN), i64::from(i32::MAX))? as i32)
    }
}

/// UNSPECIFIED: one raw word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Unspecified(pub u16);

/// UNSPECIFIED2: two raw words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Unspecified2(pub u32);

/// UNSPECIFIED3: three raw words, e.g. a host number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Unspecified3(pub u64);

impl CourierType for Unspecified {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u16(self.0);
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        Ok(Self(reader.read_u16()?))
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, format_args!("0x{:04X}", self.0));
    }

    fn to_json(&self) -> Value {
        Value::from(self.0)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        Ok(Self(json_u64(value, "UNSPECIFIED", u64::from(u16::MAX))? as u16))
    }
}

impl CourierType for Unspecified2 {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u32(self.0);
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        Ok(Self(reader.read_u32()?))
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, format_args!("0x{:08X}", self.0));
    }

    fn to_json(&self) -> Value {
        Value::from(self.0)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        Ok(Self(json_u64(value, "UNSPECIFIED2", u64::from(u32::MAX))? as u32))
    }
}

impl CourierType for Unspecified3 {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        writer.write_u48(self.0);
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        Ok(Self(reader.read_u48()?))
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, format_args!("0x{:012X}", self.0));
    }

    fn to_json(&self) -> Value {
        Value::from(self.0)
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        Ok(Self(json_u64(value, "UNSPECIFIED3", 0xFFFF_FFFF_FFFF)?))
    }
}

/// An empty RECORD, the body of argument-less CHOICE variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Empty;

impl CourierType for Empty {
    fn serialize(&self, _writer: &mut WireWriter) -> Result<(), CourierError> {
        Ok(())
    }

    fn deserialize(_reader: &mut WireReader) -> Result<Self, CourierError> {
        Ok(Self)
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_line(out, prefix, label, "[]");
    }

    fn to_json(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    fn from_json(_value: &Value) -> Result<Self, CourierError> {
        Ok(Self)
    }
}

fn describe_items<T: CourierType>(items: &[T], out: &mut String, prefix: &str, label: &str, kind: &str) {
    describe_line(out, prefix, label, format_args!("{kind}[{}]", items.len()));
    let nested = format!("{prefix}{DESCRIBE_INDENT}");
    for (index, item) in items.iter().enumerate() {
        item.describe(out, &nested, &format!("[{index}]"));
    }
}

fn items_from_json<T: CourierType>(value: &Value, kind: &str) -> Result<Vec<T>, CourierError> {
    match value {
        Value::Array(items) => items.iter().map(T::from_json).collect(),
        other => Err(CourierError::Json(format!("expected {kind}, found {other}"))),
    }
}

/// SEQUENCE: a counted list of at most `MAX` elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence<T, const MAX: usize = 65535>(pub Vec<T>);

impl<T, const MAX: usize> Default for Sequence<T, MAX> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T, const MAX: usize> From<Vec<T>> for Sequence<T, MAX> {
    fn from(value: Vec<T>) -> Self {
        Self(value)
    }
}

impl<T, const MAX: usize> Sequence<T, MAX> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: CourierType, const MAX: usize> CourierType for Sequence<T, MAX> {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        let limit = MAX.min(usize::from(u16::MAX));
        if self.0.len() > limit {
            return Err(CourierError::EncodeError(format!(
                "SEQUENCE of {} elements exceeds maximum {limit}",
                self.0.len()
            )));
        }
        writer.write_u16(self.0.len() as u16);
        for item in &self.0 {
            item.serialize(writer)?;
        }
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        let count = usize::from(reader.read_u16()?);
        if count > MAX {
            return Err(CourierError::SequenceTooLong(format!(
                "{count} elements, maximum {MAX}"
            )));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::deserialize(reader)?);
        }
        Ok(Self(items))
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_items(&self.0, out, prefix, label, "SEQUENCE");
    }

    fn to_json(&self) -> Value {
        Value::Array(self.0.iter().map(CourierType::to_json).collect())
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        let items = items_from_json(value, "SEQUENCE")?;
        if items.len() > MAX {
            return Err(CourierError::SequenceTooLong(format!(
                "{} elements, maximum {MAX}",
                items.len()
            )));
        }
        Ok(Self(items))
    }
}

/// ARRAY: exactly `N` elements without a count on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Array<T, const N: usize>(pub Vec<T>);

impl<T: Default, const N: usize> Default for Array<T, N> {
    fn default() -> Self {
        Self((0..N).map(|_| T::default()).collect())
    }
}

impl<T, const N: usize> From<[T; N]> for Array<T, N> {
    fn from(value: [T; N]) -> Self {
        Self(Vec::from(value))
    }
}

impl<T: CourierType, const N: usize> CourierType for Array<T, N> {
    fn serialize(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        if self.0.len() != N {
            return Err(CourierError::EncodeError(format!(
                "ARRAY holds {} elements, declared {N}",
                self.0.len()
            )));
        }
        for item in &self.0 {
            item.serialize(writer)?;
        }
        Ok(())
    }

    fn deserialize(reader: &mut WireReader) -> Result<Self, CourierError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::deserialize(reader)?);
        }
        Ok(Self(items))
    }

    fn describe(&self, out: &mut String, prefix: &str, label: &str) {
        describe_items(&self.0, out, prefix, label, "ARRAY");
    }

    fn to_json(&self) -> Value {
        Value::Array(self.0.iter().map(CourierType::to_json).collect())
    }

    fn from_json(value: &Value) -> Result<Self, CourierError> {
        let items = items_from_json(value, "ARRAY")?;
        if items.len() != N {
            return Err(CourierError::ArrayLengthMismatch(format!(
                "{} elements, declared {N}",
                items.len()
            )));
        }
        Ok(Self(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_on_the_wire() {
        let mut writer = WireWriter::new();
        true.serialize(&mut writer).unwrap();
        (-2i16).serialize(&mut writer).unwrap();
        0x1234_5678u32.serialize(&mut writer).unwrap();
        Unspecified3(0x0000_AA00_0001).serialize(&mut writer).unwrap();
        let data = writer.finish();
        assert_eq!(
            data.as_ref(),
            &[0, 1, 0xFF, 0xFE, 0x12, 0x34, 0x56, 0x78, 0x00, 0x00, 0xAA, 0x00, 0x00, 0x01]
        );

        let mut reader = WireReader::new(data);
        assert!(bool::deserialize(&mut reader).unwrap());
        assert_eq!(i16::deserialize(&mut reader).unwrap(), -2);
        assert_eq!(u32::deserialize(&mut reader).unwrap(), 0x1234_5678);
        assert_eq!(Unspecified3::deserialize(&mut reader).unwrap(), Unspecified3(0xAA00_0001));
        assert!(reader.is_at_end());
    }

    #[test]
    fn sequence_bounds() {
        let short: Sequence<u16, 2> = Sequence(vec![1, 2]);
        let data = to_wire(&short).unwrap();
        assert_eq!(data.as_ref(), &[0, 2, 0, 1, 0, 2]);
        assert_eq!(from_wire::<Sequence<u16, 2>>(&data).unwrap(), short);

        let long: Sequence<u16, 2> = Sequence(vec![1, 2, 3]);
        assert!(matches!(to_wire(&long), Err(CourierError::EncodeError(_))));
        assert!(matches!(
            from_wire::<Sequence<u16, 2>>(&[0, 3, 0, 1, 0, 2, 0, 3]),
            Err(CourierError::SequenceTooLong(_))
        ));
    }

    #[test]
    fn array_has_no_count() {
        let flags: Array<bool, 3> = Array::from([true, false, true]);
        let data = to_wire(&flags).unwrap();
        assert_eq!(data.as_ref(), &[0, 1, 0, 0, 0, 1]);
        assert_eq!(from_wire::<Array<bool, 3>>(&data).unwrap(), flags);

        let wrong: Array<bool, 3> = Array(vec![true]);
        assert!(to_wire(&wrong).is_err());
        assert!(matches!(
            Array::<bool, 3>::from_json(&json!([true])),
            Err(CourierError::ArrayLengthMismatch(_))
        ));
    }

    #[test]
    fn json_scalars() {
        let values: Sequence<i32> = Sequence(vec![-5, 70_000]);
        let value = values.to_json();
        assert_eq!(value, json!([-5, 70000]));
        assert_eq!(Sequence::<i32>::from_json(&value).unwrap(), values);
        assert!(u16::from_json(&json!(70000)).is_err());
        assert!(bool::from_json(&json!(1)).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(from_wire::<u16>(&[0, 1, 0, 2]).is_err());
    }
}
