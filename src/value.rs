use std::collections::BTreeMap;
use std::fmt;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::bits::Bits;
use crate::result::{Error, Result};

/// Runtime value of a single record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    BigInt(BigInt),
    F32(f32),
    F64(f64),
    Decimal(BigDecimal),
    Bits(Bits),
    Str(String),
    Array(Vec<Value>),
    Object(Record),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    BigInt,
    F32,
    F64,
    Decimal,
    Bits,
    Str,
    Array,
    Object,
}

impl Value {
    pub fn type_of(&self) -> Option<ValueType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => ValueType::Bool,
            Value::I8(_) => ValueType::I8,
            Value::I16(_) => ValueType::I16,
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::U64(_) => ValueType::U64,
            Value::BigInt(_) => ValueType::BigInt,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::Decimal(_) => ValueType::Decimal,
            Value::Bits(_) => ValueType::Bits,
            Value::Str(_) => ValueType::Str,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        })
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::I8(v) => Ok(i64::from(*v)),
            Value::I16(v) => Ok(i64::from(*v)),
            Value::I32(v) => Ok(i64::from(*v)),
            Value::I64(v) => Ok(*v),
            Value::U8(v) => Ok(i64::from(*v)),
            Value::U16(v) => Ok(i64::from(*v)),
            Value::U32(v) => Ok(i64::from(*v)),
            Value::U64(v) => i64::try_from(*v)
                .map_err(|_| Error::Conversion(format!("{v} does not fit in i64"))),
            Value::BigInt(v) => v
                .to_i64()
                .ok_or_else(|| Error::Conversion(format!("{v} does not fit in i64"))),
            other => Err(Error::Conversion(format!("{other:?} is not an integer"))),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Value::U8(v) => Ok(u64::from(*v)),
            Value::U16(v) => Ok(u64::from(*v)),
            Value::U32(v) => Ok(u64::from(*v)),
            Value::U64(v) => Ok(*v),
            Value::I8(v) => Ok(*v as u64),
            Value::I16(v) => Ok(*v as u64),
            Value::I32(v) => Ok(*v as u64),
            Value::I64(v) => Ok(*v as u64),
            Value::BigInt(v) => v
                .to_u64()
                .ok_or_else(|| Error::Conversion(format!("{v} does not fit in u64"))),
            other => Err(Error::Conversion(format!("{other:?} is not an integer"))),
        }
    }

    pub fn as_usize(&self) -> Result<usize> {
        let value = self.as_i64()?;
        usize::try_from(value).map_err(|_| Error::Conversion(format!("{value} is negative")))
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Ok(other.as_i64()? != 0),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::F32(v) => Ok(f64::from(*v)),
            Value::F64(v) => Ok(*v),
            Value::Decimal(v) => v
                .to_f64()
                .ok_or_else(|| Error::Conversion(format!("{v} does not fit in f64"))),
            other => Ok(other.as_i64()? as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// The textual rendering compared against `match` patterns.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Str(v) => v.clone(),
            Value::Bool(v) => v.to_string(),
            Value::I8(v) => v.to_string(),
            Value::I16(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::U8(v) => v.to_string(),
            Value::U16(v) => v.to_string(),
            Value::U32(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::F32(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::Decimal(v) => v.to_string(),
            Value::Bits(v) => crate::utils::to_hex(v.as_bytes()),
            Value::Array(v) => format!("{v:?}"),
            Value::Object(v) => format!("{v:?}"),
        }
    }

    /// Narrows or widens into the requested type, as evaluated fields and
    /// evaluator results demand.
    pub fn coerce(self, want: ValueType) -> Result<Value> {
        if self.type_of() == Some(want) {
            return Ok(self);
        }
        let coerced = match want {
            ValueType::Bool => Value::Bool(self.as_bool()?),
            ValueType::I8 => Value::I8(self.as_i64()? as i8),
            ValueType::I16 => Value::I16(self.as_i64()? as i16),
            ValueType::I32 => Value::I32(self.as_i64()? as i32),
            ValueType::I64 => Value::I64(self.as_i64()?),
            ValueType::U8 => Value::U8(self.as_u64()? as u8),
            ValueType::U16 => Value::U16(self.as_u64()? as u16),
            ValueType::U32 => Value::U32(self.as_u64()? as u32),
            ValueType::U64 => Value::U64(self.as_u64()?),
            ValueType::BigInt => Value::BigInt(BigInt::from(self.as_i64()?)),
            ValueType::F32 => Value::F32(self.as_f64()? as f32),
            ValueType::F64 => Value::F64(self.as_f64()?),
            ValueType::Decimal => match self {
                Value::Str(text) => Value::Decimal(
                    text.parse()
                        .map_err(|_| Error::Conversion(format!("{text:?} is not a decimal")))?,
                ),
                other => Value::Decimal(
                    other
                        .render()
                        .parse()
                        .map_err(|_| Error::Conversion("not a decimal".to_owned()))?,
                ),
            },
            ValueType::Str => Value::Str(self.render()),
            ValueType::Bits | ValueType::Array | ValueType::Object => {
                return Err(Error::Conversion(format!(
                    "cannot coerce {self:?} into {want:?}"
                )));
            }
        };
        Ok(coerced)
    }
}

/// A decoded message: a type name plus named field values. Built
/// field-by-field during decode, read through `get` on encode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name)?;
        for (i, (name, value)) in self.fields().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {}", value.render())?;
        }
        write!(f, "}}")
    }
}
