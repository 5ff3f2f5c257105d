//! `serde::Deserializer` over an owned [`Datum`], letting decoded results be
//! read straight into host types.

use std::fmt;

use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, Deserializer, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;

use crate::datum::Datum;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatumDeError(String);

impl fmt::Display for DatumDeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DatumDeError {}

impl de::Error for DatumDeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DatumDeError(msg.to_string())
    }
}

impl<'de> IntoDeserializer<'de, DatumDeError> for Datum {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! deserialize_integer {
    ($method:ident, $visit:ident, $t:ty) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
        where
            V: Visitor<'de>,
        {
            match self {
                // MAX + 1 is a power of two and exact as an f64, unlike MAX
                // itself for the 64 bit types.
                Datum::Number(n)
                    if n.fract() == 0.0
                        && n >= <$t>::MIN as f64
                        && n < <$t>::MAX as f64 + 1.0 =>
                {
                    visitor.$visit(n as $t)
                }
                Datum::Number(n) => Err(de::Error::invalid_value(
                    de::Unexpected::Float(n),
                    &stringify!($t),
                )),
                other => other.deserialize_any(visitor),
            }
        }
    };
}

impl<'de> Deserializer<'de> for Datum {
    type Error = DatumDeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self {
            Datum::Null => visitor.visit_unit(),
            Datum::Bool(b) => visitor.visit_bool(b),
            Datum::Number(n) => visitor.visit_f64(n),
            Datum::String(s) => visitor.visit_string(s),
            Datum::Array(arr) => {
                let mut seq = SeqDeserializer::new(arr.into_iter());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            Datum::Object(obj) => {
                let mut map = MapDeserializer::new(obj.into_iter());
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
        }
    }

    deserialize_integer!(deserialize_i8, visit_i8, i8);
    deserialize_integer!(deserialize_i16, visit_i16, i16);
    deserialize_integer!(deserialize_i32, visit_i32, i32);
    deserialize_integer!(deserialize_i64, visit_i64, i64);
    deserialize_integer!(deserialize_u8, visit_u8, u8);
    deserialize_integer!(deserialize_u16, visit_u16, u16);
    deserialize_integer!(deserialize_u32, visit_u32, u32);
    deserialize_integer!(deserialize_u64, visit_u64, u64);

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self {
            Datum::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self {
            // Only unit variants are supported, spelled as strings.
            Datum::String(s) => visitor.visit_enum(s.into_deserializer()),
            other => Err(de::Error::invalid_type(
                de::Unexpected::Other(other.type_name()),
                &"a string naming an enum variant",
            )),
        }
    }

    forward_to_deserialize_any! {
        bool f32 f64 char str string bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any i128 u128
    }
}
