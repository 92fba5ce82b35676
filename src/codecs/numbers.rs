use bigdecimal::BigDecimal;
use num_bigint::{BigInt, BigUint, Sign};

use crate::bits::{BitReader, BitWriter, ByteOrder};
use crate::codecs::Codec;
use crate::descriptor::{BoundField, FieldKind};
use crate::parser::TemplateParser;
use crate::result::{Error, Result};
use crate::utils::sign_extend;
use crate::value::{Record, Value};

#[derive(Debug)]
pub(crate) struct BitsCodec;

impl Codec for BitsCodec {
    fn decode(
        &self,
        parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        record: &Record,
    ) -> Result<Value> {
        let FieldKind::Bits { size } = &field.kind else {
            unreachable!()
        };
        let bits = parser.evaluate_size(size, record)?;
        let seq = reader.get_bits(bits)?;
        Ok(Value::Bits(match field.byte_order {
            ByteOrder::Little => seq,
            ByteOrder::Big => seq.reversed(),
        }))
    }

    fn encode(
        &self,
        parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::Bits { size } = &field.kind else {
            unreachable!()
        };
        let bits = parser.evaluate_size(size, record)?;
        let Value::Bits(seq) = value else {
            return Err(Error::Conversion(format!(
                "{value:?} is not a bit sequence"
            )));
        };
        let seq = seq.resized(bits);
        match field.byte_order {
            ByteOrder::Little => writer.put_bits(&seq),
            ByteOrder::Big => writer.put_bits(&seq.reversed()),
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct IntCodec;

impl Codec for IntCodec {
    fn decode(
        &self,
        _parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        _record: &Record,
    ) -> Result<Value> {
        let FieldKind::Int { width } = field.kind else {
            unreachable!()
        };
        decode_fixed(reader, width, field.byte_order, field.unsigned)
    }

    fn encode(
        &self,
        _parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        _record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::Int { width } = field.kind else {
            unreachable!()
        };
        encode_fixed(writer, width, field.byte_order, value)
    }
}

/// The checksum field on the wire is a plain unsigned integer; the value
/// comparison happens in the template parser after the whole message is
/// read.
#[derive(Debug)]
pub(crate) struct ChecksumCodec;

impl Codec for ChecksumCodec {
    fn decode(
        &self,
        _parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        _record: &Record,
    ) -> Result<Value> {
        let FieldKind::Checksum { width, byte_order } = field.kind else {
            unreachable!()
        };
        decode_fixed(reader, width, byte_order, true)
    }

    fn encode(
        &self,
        _parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        _record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::Checksum { width, byte_order } = field.kind else {
            unreachable!()
        };
        encode_fixed(writer, width, byte_order, value)
    }
}

pub(crate) fn decode_fixed(
    reader: &mut BitReader,
    width: usize,
    order: ByteOrder,
    unsigned: bool,
) -> Result<Value> {
    Ok(match (width, unsigned) {
        (8, false) => Value::I8(reader.get_u8()? as i8),
        (8, true) => Value::U8(reader.get_u8()?),
        (16, false) => Value::I16(reader.get_u16(order)? as i16),
        (16, true) => Value::U16(reader.get_u16(order)?),
        (32, false) => Value::I32(reader.get_u32(order)? as i32),
        (32, true) => Value::U32(reader.get_u32(order)?),
        (64, false) => Value::I64(reader.get_u64(order)? as i64),
        (64, true) => Value::U64(reader.get_u64(order)?),
        _ => unreachable!(),
    })
}

pub(crate) fn encode_fixed(
    writer: &mut BitWriter,
    width: usize,
    order: ByteOrder,
    value: &Value,
) -> Result<()> {
    let raw = value.as_u64()?;
    match width {
        8 => writer.put_u8(raw as u8),
        16 => writer.put_u16(raw as u16, order),
        32 => writer.put_u32(raw as u32, order),
        64 => writer.put_u64(raw, order),
        _ => unreachable!(),
    }
}

#[derive(Debug)]
pub(crate) struct IntegerCodec;

impl Codec for IntegerCodec {
    fn decode(
        &self,
        parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        record: &Record,
    ) -> Result<Value> {
        let FieldKind::Integer {
            size,
            allow_primitive,
        } = &field.kind
        else {
            unreachable!()
        };
        let bits = parser.evaluate_size(size, record)?;
        if *allow_primitive && bits < 64 {
            let raw = reader.get_uint(bits, field.byte_order)?;
            Ok(if field.unsigned {
                Value::U64(raw)
            } else {
                Value::I64(sign_extend(raw, bits))
            })
        } else {
            let magnitude = reader.get_big_uint(bits, field.byte_order)?;
            Ok(Value::BigInt(BigInt::from(magnitude)))
        }
    }

    fn encode(
        &self,
        parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::Integer {
            size,
            allow_primitive,
        } = &field.kind
        else {
            unreachable!()
        };
        let bits = parser.evaluate_size(size, record)?;
        if *allow_primitive && bits < 64 {
            writer.put_uint(value.as_u64()?, bits, field.byte_order);
            return Ok(());
        }
        let big = match value {
            Value::BigInt(v) => v.clone(),
            other => BigInt::from(other.as_i64()?),
        };
        let mut magnitude = big.magnitude().clone();
        if big.sign() == Sign::Minus && bits <= 64 {
            // the sign marker sits one past the field, outside the emitted
            // window; the wire carries the magnitude
            magnitude |= BigUint::from(1u8) << bits;
        }
        writer.put_big_uint(&magnitude, bits, field.byte_order);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct FloatCodec;

impl Codec for FloatCodec {
    fn decode(
        &self,
        _parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        _record: &Record,
    ) -> Result<Value> {
        match field.kind {
            FieldKind::Float32 => Ok(Value::F32(reader.get_f32(field.byte_order)?)),
            FieldKind::Float64 => Ok(Value::F64(reader.get_f64(field.byte_order)?)),
            _ => unreachable!(),
        }
    }

    fn encode(
        &self,
        _parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        _record: &Record,
        value: &Value,
    ) -> Result<()> {
        match (&field.kind, value) {
            (FieldKind::Float32, Value::F32(v)) => writer.put_f32(*v, field.byte_order),
            (FieldKind::Float32, other) => {
                writer.put_f32(other.as_f64()? as f32, field.byte_order)
            }
            (FieldKind::Float64, Value::F64(v)) => writer.put_f64(*v, field.byte_order),
            (FieldKind::Float64, other) => writer.put_f64(other.as_f64()?, field.byte_order),
            _ => unreachable!(),
        }
    }
}

/// Decimals travel as IEEE-754 floats and widen through the float's
/// textual rendering.
#[derive(Debug)]
pub(crate) struct DecimalCodec;

impl Codec for DecimalCodec {
    fn decode(
        &self,
        _parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        _record: &Record,
    ) -> Result<Value> {
        let FieldKind::Decimal { bits } = field.kind else {
            unreachable!()
        };
        let text = match bits {
            32 => reader.get_f32(field.byte_order)?.to_string(),
            _ => reader.get_f64(field.byte_order)?.to_string(),
        };
        let decimal: BigDecimal = text
            .parse()
            .map_err(|_| Error::Conversion(format!("{text} does not widen to a decimal")))?;
        Ok(Value::Decimal(decimal))
    }

    fn encode(
        &self,
        _parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        _record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::Decimal { bits } = field.kind else {
            unreachable!()
        };
        let text = match value {
            Value::Decimal(d) => d.to_string(),
            other => other.render(),
        };
        let float: f64 = text
            .parse()
            .map_err(|_| Error::Conversion(format!("{text} does not narrow to a float")))?;
        match bits {
            32 => writer.put_f32(float as f32, field.byte_order),
            _ => writer.put_f64(float, field.byte_order),
        }
    }
}
