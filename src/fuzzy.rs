//! Tolerant JSON decoding.
//!
//! The upstream service's JSON encoding is not type-stable: a field the
//! model declares as a number may arrive as a quoted string, and vice
//! versa. [`FuzzyDecoder`] decodes response bodies while coercing between
//! the two representations based on the destination field's declared type.
//!
//! The decoder is an explicit object owned by the session. There is no
//! process-global registration and no shared mutable state.

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, SeqAccess,
    Visitor,
};
use serde_json::Value;

use crate::error::DecodeError;

/// Decoder for server JSON with string/number type drift.
///
/// # Example
///
/// ```
/// use looker_rtl::FuzzyDecoder;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Row {
///     id: i64,
///     label: String,
/// }
///
/// let decoder = FuzzyDecoder::new();
/// // id arrives quoted, label arrives as a bare number
/// let row: Row = decoder.decode(r#"{"id": "12345", "label": 7}"#).unwrap();
/// assert_eq!(row.id, 12345);
/// assert_eq!(row.label, "7");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyDecoder;

impl FuzzyDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self
    }

    /// Decode a JSON body into `T`, coercing string/number mismatches.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Json`] when the body is not valid JSON;
    /// [`DecodeError::Shape`] when the JSON does not fit `T`, including a
    /// non-numeric string in a numeric destination.
    pub fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T, DecodeError> {
        let value: Value = serde_json::from_str(body).map_err(DecodeError::Json)?;
        self.decode_value(&value)
    }

    /// Decode an already-parsed JSON value into `T`.
    pub fn decode_value<T: DeserializeOwned>(&self, value: &Value) -> Result<T, DecodeError> {
        T::deserialize(Fuzzy(value)).map_err(DecodeError::Shape)
    }
}

/// A forwarding deserializer over a JSON value that coerces between string
/// and numeric tokens according to the type the destination asks for.
struct Fuzzy<'de>(&'de Value);

macro_rules! fuzzy_number {
    ($deserialize:ident, $visit:ident, $ty:ty) => {
        fn $deserialize<V>(self, visitor: V) -> Result<V::Value, Self::Error>
        where
            V: Visitor<'de>,
        {
            match self.0 {
                // quoted number: parse the text as the destination type
                Value::String(text) => match text.parse::<$ty>() {
                    Ok(parsed) => visitor.$visit(parsed),
                    Err(_) => Err(de::Error::custom(format_args!(
                        "cannot coerce string {:?} into {}",
                        text,
                        stringify!($ty)
                    ))),
                },
                other => other.$deserialize(visitor),
            }
        }
    };
}

impl<'de> Deserializer<'de> for Fuzzy<'de> {
    type Error = serde_json::Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Array(items) => visitor.visit_seq(FuzzySeq { iter: items.iter() }),
            Value::Object(entries) => visitor.visit_map(FuzzyMap {
                iter: entries.iter(),
                value: None,
            }),
            other => other.deserialize_any(visitor),
        }
    }

    fuzzy_number!(deserialize_i8, visit_i8, i8);
    fuzzy_number!(deserialize_i16, visit_i16, i16);
    fuzzy_number!(deserialize_i32, visit_i32, i32);
    fuzzy_number!(deserialize_i64, visit_i64, i64);
    fuzzy_number!(deserialize_u8, visit_u8, u8);
    fuzzy_number!(deserialize_u16, visit_u16, u16);
    fuzzy_number!(deserialize_u32, visit_u32, u32);
    fuzzy_number!(deserialize_u64, visit_u64, u64);
    fuzzy_number!(deserialize_f32, visit_f32, f32);
    fuzzy_number!(deserialize_f64, visit_f64, f64);

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            // bare number into a string destination: natural decimal text
            Value::Number(number) => visitor.visit_string(number.to_string()),
            other => other.deserialize_str(visitor),
        }
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Array(items) => visitor.visit_seq(FuzzySeq { iter: items.iter() }),
            other => other.deserialize_seq(visitor),
        }
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Object(entries) => visitor.visit_map(FuzzyMap {
                iter: entries.iter(),
                value: None,
            }),
            other => other.deserialize_map(visitor),
        }
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
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

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_bool(visitor)
    }

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_char(visitor)
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_bytes(visitor)
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_byte_buf(visitor)
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_unit(visitor)
    }

    fn deserialize_unit_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_identifier(visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_ignored_any(visitor)
    }
}

/// Sequence access that wraps each element in the coercing deserializer.
struct FuzzySeq<'de> {
    iter: std::slice::Iter<'de, Value>,
}

impl<'de> SeqAccess<'de> for FuzzySeq<'de> {
    type Error = serde_json::Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some(value) => seed.deserialize(Fuzzy(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Map access that wraps each value in the coercing deserializer.
struct FuzzyMap<'de> {
    iter: serde_json::map::Iter<'de>,
    value: Option<&'de Value>,
}

impl<'de> MapAccess<'de> for FuzzyMap<'de> {
    type Error = serde_json::Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(key.as_str().into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        let value = self
            .value
            .take()
            .ok_or_else(|| de::Error::custom("value requested before key"))?;
        seed.deserialize(Fuzzy(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}
