//! Declarative Courier RECORD, CHOICE, ENUM and ERROR definitions.
//!
//! ```ignore
//! courier_enum! {
//!     pub enum Direction { West = 0, East = 1 }
//! }
//!
//! courier_record! {
//!     pub struct Offset {
//!         pub direction: Direction,
//!         pub hours: u16,
//!     }
//! }
//!
//! courier_choice! {
//!     pub enum Answer { Nothing(Empty) = 0, Offset(Offset) = 1 }
//! }
//!
//! courier_error! {
//!     pub struct NoSuchThing = 3 { pub which: u16 }
//! }
//! ```

/// A RECORD: fields serialized in declaration order.
#[macro_export]
macro_rules! courier_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$field_meta:meta])* $field_vis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        $vis struct $name {
            $( $(#[$field_meta])* $field_vis $field: $ty, )*
        }

        impl $crate::types::CourierType for $name {
            #[allow(unused_variables)]
            fn serialize(
                &self,
                writer: &mut $crate::wire::WireWriter,
            ) -> Result<(), $crate::error::CourierError> {
                $( $crate::types::CourierType::serialize(&self.$field, writer)?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn deserialize(
                reader: &mut $crate::wire::WireReader,
            ) -> Result<Self, $crate::error::CourierError> {
                Ok(Self {
                    $( $field: <$ty as $crate::types::CourierType>::deserialize(reader)?, )*
                })
            }

            #[allow(unused_variables)]
            fn describe(&self, out: &mut String, prefix: &str, label: &str) {
                $crate::types::describe_line(out, prefix, label, stringify!($name));
                let nested = format!("{prefix}{}", $crate::types::DESCRIBE_INDENT);
                $( $crate::types::CourierType::describe(&self.$field, out, &nested, stringify!($field)); )*
            }

            fn to_json(&self) -> $crate::serde_json::Value {
                #[allow(unused_mut)]
                let mut object = $crate::serde_json::Map::new();
                $(
                    object.insert(
                        stringify!($field).to_string(),
                        $crate::types::CourierType::to_json(&self.$field),
                    );
                )*
                $crate::serde_json::Value::Object(object)
            }

            #[allow(unused_variables)]
            fn from_json(
                value: &$crate::serde_json::Value,
            ) -> Result<Self, $crate::error::CourierError> {
                if !value.is_object() {
                    return Err($crate::error::CourierError::Json(format!(
                        "expected {} object, found {value}",
                        stringify!($name)
                    )));
                }
                Ok(Self {
                    $( $field: $crate::types::json_field::<$ty>(value, stringify!($field))?, )*
                })
            }
        }
    };
}

/// An ENUM: a closed set of named CARDINAL values. JSON uses the names.
#[macro_export]
macro_rules! courier_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $first:ident = $first_value:literal
            $(, $variant:ident = $value:literal )* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis enum $name {
            #[default]
            $first,
            $( $variant, )*
        }

        impl $name {
            pub fn value(self) -> u16 {
                match self {
                    Self::$first => $first_value,
                    $( Self::$variant => $value, )*
                }
            }

            pub fn from_value(value: u16) -> Option<Self> {
                match value {
                    $first_value => Some(Self::$first),
                    $( $value => Some(Self::$variant), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    Self::$first => stringify!($first),
                    $( Self::$variant => stringify!($variant), )*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    stringify!($first) => Some(Self::$first),
                    $( stringify!($variant) => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }

        impl $crate::types::CourierType for $name {
            fn serialize(
                &self,
                writer: &mut $crate::wire::WireWriter,
            ) -> Result<(), $crate::error::CourierError> {
                writer.write_u16(self.value());
                Ok(())
            }

            fn deserialize(
                reader: &mut $crate::wire::WireReader,
            ) -> Result<Self, $crate::error::CourierError> {
                let value = reader.read_u16()?;
                Self::from_value(value).ok_or_else(|| {
                    $crate::error::CourierError::UnknownEnumValue(format!(
                        "{} has no value {value}",
                        stringify!($name)
                    ))
                })
            }

            fn describe(&self, out: &mut String, prefix: &str, label: &str) {
                $crate::types::describe_line(out, prefix, label, self.name());
            }

            fn to_json(&self) -> $crate::serde_json::Value {
                $crate::serde_json::Value::String(self.name().to_string())
            }

            fn from_json(
                value: &$crate::serde_json::Value,
            ) -> Result<Self, $crate::error::CourierError> {
                value
                    .as_str()
                    .and_then(Self::from_name)
                    .ok_or_else(|| {
                        $crate::error::CourierError::UnknownEnumValue(format!(
                            "{} has no member {value}",
                            stringify!($name)
                        ))
                    })
            }
        }
    };
}

/// A CHOICE: a CARDINAL tag followed by the body of the selected variant.
/// JSON is a single-member object keyed by the variant name.
#[macro_export]
macro_rules! courier_choice {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $first:ident ( $first_ty:ty ) = $first_tag:literal
            $(, $variant:ident ( $variant_ty:ty ) = $tag:literal )* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $first($first_ty),
            $( $variant($variant_ty), )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$first(Default::default())
            }
        }

        impl $name {
            pub fn tag(&self) -> u16 {
                match self {
                    Self::$first(_) => $first_tag,
                    $( Self::$variant(_) => $tag, )*
                }
            }

            pub fn variant_name(&self) -> &'static str {
                match self {
                    Self::$first(_) => stringify!($first),
                    $( Self::$variant(_) => stringify!($variant), )*
                }
            }
        }

        impl $crate::types::CourierType for $name {
            fn serialize(
                &self,
                writer: &mut $crate::wire::WireWriter,
            ) -> Result<(), $crate::error::CourierError> {
                writer.write_u16(self.tag());
                match self {
                    Self::$first(body) => $crate::types::CourierType::serialize(body, writer),
                    $( Self::$variant(body) => $crate::types::CourierType::serialize(body, writer), )*
                }
            }

            fn deserialize(
                reader: &mut $crate::wire::WireReader,
            ) -> Result<Self, $crate::error::CourierError> {
                match reader.read_u16()? {
                    $first_tag => Ok(Self::$first(
                        <$first_ty as $crate::types::CourierType>::deserialize(reader)?,
                    )),
                    $( $tag => Ok(Self::$variant(
                        <$variant_ty as $crate::types::CourierType>::deserialize(reader)?,
                    )), )*
                    other => Err($crate::error::CourierError::UnknownChoiceTag(format!(
                        "{} has no tag {other}",
                        stringify!($name)
                    ))),
                }
            }

            fn describe(&self, out: &mut String, prefix: &str, label: &str) {
                $crate::types::describe_line(
                    out,
                    prefix,
                    label,
                    format_args!("{} {}", stringify!($name), self.variant_name()),
                );
                let nested = format!("{prefix}{}", $crate::types::DESCRIBE_INDENT);
                match self {
                    Self::$first(body) => {
                        $crate::types::CourierType::describe(body, out, &nested, stringify!($first))
                    }
                    $( Self::$variant(body) => {
                        $crate::types::CourierType::describe(body, out, &nested, stringify!($variant))
                    } )*
                }
            }

            fn to_json(&self) -> $crate::serde_json::Value {
                let body = match self {
                    Self::$first(body) => $crate::types::CourierType::to_json(body),
                    $( Self::$variant(body) => $crate::types::CourierType::to_json(body), )*
                };
                let mut object = $crate::serde_json::Map::new();
                object.insert(self.variant_name().to_string(), body);
                $crate::serde_json::Value::Object(object)
            }

            fn from_json(
                value: &$crate::serde_json::Value,
            ) -> Result<Self, $crate::error::CourierError> {
                let Some(object) = value.as_object().filter(|object| object.len() == 1) else {
                    return Err($crate::error::CourierError::Json(format!(
                        "expected single-member {} object, found {value}",
                        stringify!($name)
                    )));
                };
                let Some((key, body)) = object.iter().next() else {
                    return Ok(Self::default());
                };
                match key.as_str() {
                    stringify!($first) => Ok(Self::$first(
                        <$first_ty as $crate::types::CourierType>::from_json(body)?,
                    )),
                    $( stringify!($variant) => Ok(Self::$variant(
                        <$variant_ty as $crate::types::CourierType>::from_json(body)?,
                    )), )*
                    other => Err($crate::error::CourierError::UnknownChoiceTag(format!(
                        "{} has no variant {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

/// An ERROR: a RECORD with the error code it is reported under.
#[macro_export]
macro_rules! courier_error {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident = $code:literal { $($body:tt)* }
    ) => {
        $crate::courier_record! {
            $(#[$meta])*
            $vis struct $name { $($body)* }
        }

        impl $crate::dispatch::CourierErrorRecord for $name {
            const CODE: u16 = $code;
        }
    };
}
