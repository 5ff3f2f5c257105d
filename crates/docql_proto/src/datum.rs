use std::collections::{BTreeMap, HashMap};
use std::fmt;

use docql_error::{Result, decode_err};
use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A decoded (or literal) document value.
///
/// All numbers are stored as `f64`, whether or not the value on the wire was
/// integral. Comparing a decoded `1` against `Datum::Number(1.0)` is therefore
/// always well defined.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Datum>),
    Object(BTreeMap<String, Datum>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number as a `u64` if it's a non-negative integral value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            // u64::MAX rounds up to 2^64 as an f64, so the bound is exclusive.
            Self::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n < u64::MAX as f64 => {
                Some(*n as u64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Datum]> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get a field from an object datum.
    pub fn get(&self, field: &str) -> Option<&Datum> {
        self.as_object().and_then(|obj| obj.get(field))
    }

    /// Name of the datum's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Returns true if this datum (recursively) contains only finite numbers.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::Array(arr) => arr.iter().all(|d| d.is_finite()),
            Self::Object(obj) => obj.values().all(|d| d.is_finite()),
            _ => true,
        }
    }

    /// Deserialize this datum into some host type.
    ///
    /// Integral numbers can be read into integer destinations, everything else
    /// sees the stored `f64`.
    pub fn deserialize_into<T>(self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        T::deserialize(self).map_err(|e| decode_err!("Failed to deserialize datum: {e}"))
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(arr) => {
                write!(f, "[")?;
                for (idx, d) in arr.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, "]")
            }
            Self::Object(obj) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in obj.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<serde_json::Value> for Datum {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Bool(b),
            // Every json number is representable as a (possibly lossy) f64.
            Value::Number(n) => Datum::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Datum::String(s),
            Value::Array(arr) => Datum::Array(arr.into_iter().map(Datum::from).collect()),
            Value::Object(obj) => {
                Datum::Object(obj.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Bool(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Number(value)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Datum {
                fn from(value: $t) -> Self {
                    Datum::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32);

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::String(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::String(value)
    }
}

impl From<()> for Datum {
    fn from(_: ()) -> Self {
        Datum::Null
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(value: Vec<T>) -> Self {
        Datum::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Datum>> From<BTreeMap<String, T>> for Datum {
    fn from(value: BTreeMap<String, T>) -> Self {
        Datum::Object(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Datum>> From<HashMap<String, T>> for Datum {
    fn from(value: HashMap<String, T>) -> Self {
        Datum::Object(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl Serialize for Datum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for d in arr {
                    seq.serialize_element(d)?;
                }
                seq.end()
            }
            Self::Object(obj) => {
                let mut map = serializer.serialize_map(Some(obj.len()))?;
                for (k, v) in obj {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Datum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DatumVisitor)
    }
}

struct DatumVisitor;

impl<'de> Visitor<'de> for DatumVisitor {
    type Value = Datum;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a json value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Datum, E> {
        Ok(Datum::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Datum, E> {
        Ok(Datum::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Datum, D::Error>
    where
        D: Deserializer<'de>,
    {
        Datum::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Datum, E> {
        Ok(Datum::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Datum, E> {
        Ok(Datum::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Datum, E> {
        Ok(Datum::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Datum, E> {
        Ok(Datum::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Datum, E> {
        Ok(Datum::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Datum, E> {
        Ok(Datum::String(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Datum, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut arr = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(d) = seq.next_element()? {
            arr.push(d);
        }
        Ok(Datum::Array(arr))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Datum, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut obj = BTreeMap::new();
        while let Some((k, v)) = map.next_entry::<String, Datum>()? {
            obj.insert(k, v);
        }
        Ok(Datum::Object(obj))
    }
}
