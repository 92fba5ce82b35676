use crate::bits::{BitReader, BitWriter};
use crate::codecs::Codec;
use crate::descriptor::{BoundField, FieldKind, PrimType};
use crate::eval::PREFIX_VAR;
use crate::parser::TemplateParser;
use crate::result::{Error, Result};
use crate::schema::Choices;
use crate::value::{Record, Value};

#[derive(Debug)]
pub(crate) struct ArrayPrimCodec;

impl Codec for ArrayPrimCodec {
    fn decode(
        &self,
        parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        record: &Record,
    ) -> Result<Value> {
        let FieldKind::ArrayPrim { component, size } = &field.kind else {
            unreachable!()
        };
        let count = parser.evaluate_size(size, record)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(decode_prim(reader, *component, field)?);
        }
        Ok(Value::Array(items))
    }

    fn encode(
        &self,
        parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::ArrayPrim { component, size } = &field.kind else {
            unreachable!()
        };
        let count = parser.evaluate_size(size, record)?;
        let items = expect_array(value, count)?;
        for item in items {
            encode_prim(writer, *component, field, item)?;
        }
        Ok(())
    }
}

fn decode_prim(reader: &mut BitReader, component: PrimType, field: &BoundField) -> Result<Value> {
    let order = field.byte_order;
    Ok(match component {
        PrimType::I8 => Value::I8(reader.get_u8()? as i8),
        PrimType::U8 => Value::U8(reader.get_u8()?),
        PrimType::I16 => Value::I16(reader.get_u16(order)? as i16),
        PrimType::U16 => Value::U16(reader.get_u16(order)?),
        PrimType::I32 => Value::I32(reader.get_u32(order)? as i32),
        PrimType::U32 => Value::U32(reader.get_u32(order)?),
        PrimType::I64 => Value::I64(reader.get_u64(order)? as i64),
        PrimType::U64 => Value::U64(reader.get_u64(order)?),
        PrimType::F32 => Value::F32(reader.get_f32(order)?),
        PrimType::F64 => Value::F64(reader.get_f64(order)?),
    })
}

fn encode_prim(
    writer: &mut BitWriter,
    component: PrimType,
    field: &BoundField,
    value: &Value,
) -> Result<()> {
    let order = field.byte_order;
    match component {
        PrimType::F32 => match value {
            Value::F32(v) => writer.put_f32(*v, order),
            other => writer.put_f32(other.as_f64()? as f32, order),
        },
        PrimType::F64 => match value {
            Value::F64(v) => writer.put_f64(*v, order),
            other => writer.put_f64(other.as_f64()?, order),
        },
        _ => {
            let raw = value.as_u64()?;
            match component.bit_width() {
                8 => writer.put_u8(raw as u8),
                16 => writer.put_u16(raw as u16, order),
                32 => writer.put_u32(raw as u32, order),
                _ => writer.put_u64(raw, order),
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct ObjectCodec;

impl Codec for ObjectCodec {
    fn decode(
        &self,
        parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        record: &Record,
    ) -> Result<Value> {
        let FieldKind::Object { element, choices } = &field.kind else {
            unreachable!()
        };
        decode_element(parser, reader, element.as_deref(), choices.as_ref(), record)
    }

    fn encode(
        &self,
        parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        _record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::Object { element, choices } = &field.kind else {
            unreachable!()
        };
        encode_element(parser, writer, element.as_deref(), choices.as_ref(), value)
    }
}

#[derive(Debug)]
pub(crate) struct ArrayObjCodec;

impl Codec for ArrayObjCodec {
    fn decode(
        &self,
        parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        record: &Record,
    ) -> Result<Value> {
        let FieldKind::ArrayObj {
            element,
            choices,
            size,
        } = &field.kind
        else {
            unreachable!()
        };
        let count = parser.evaluate_size(size, record)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(decode_element(
                parser,
                reader,
                element.as_deref(),
                choices.as_ref(),
                record,
            )?);
        }
        Ok(Value::Array(items))
    }

    fn encode(
        &self,
        parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::ArrayObj {
            element,
            choices,
            size,
        } = &field.kind
        else {
            unreachable!()
        };
        let count = parser.evaluate_size(size, record)?;
        let items = expect_array(value, count)?;
        for item in items {
            encode_element(parser, writer, element.as_deref(), choices.as_ref(), item)?;
        }
        Ok(())
    }
}

fn expect_array(value: &Value, count: usize) -> Result<&[Value]> {
    let Value::Array(items) = value else {
        return Err(Error::Conversion(format!("{value:?} is not an array")));
    };
    if items.len() != count {
        return Err(Error::Conversion(format!(
            "array holds {} elements, the size expression demands {count}",
            items.len()
        )));
    }
    Ok(items)
}

/// Decodes one object: with populated choices the discriminator prefix is
/// read first and bound to the `prefix` context variable, then the first
/// alternative whose condition holds supplies the concrete template.
fn decode_element(
    parser: &TemplateParser,
    reader: &mut BitReader,
    element: Option<&str>,
    choices: Option<&Choices>,
    record: &Record,
) -> Result<Value> {
    if let Some(choices) = choices.filter(|c| !c.alternatives.is_empty()) {
        if choices.prefix_size > 0 {
            let prefix = reader.get_uint(choices.prefix_size, choices.byte_order)?;
            parser.bind_prefix(prefix);
        }
        for alternative in &choices.alternatives {
            let selected = alternative.condition.is_empty()
                || parser.evaluate_bool(&alternative.condition, record)?;
            if selected {
                let template = parser.subtemplate(&alternative.type_name)?;
                return parser.decode(template, reader).map(Value::Object);
            }
        }
        return Err(Error::NoAlternative("decode"));
    }
    let type_name = element.ok_or(Error::NoAlternative("decode"))?;
    let template = parser.subtemplate(type_name)?;
    parser.decode(template, reader).map(Value::Object)
}

/// Encodes one object: with populated choices the alternative is the one
/// whose concrete type equals the value's runtime type, and its declared
/// prefix is emitted when its condition references the prefix variable.
fn encode_element(
    parser: &TemplateParser,
    writer: &mut BitWriter,
    element: Option<&str>,
    choices: Option<&Choices>,
    value: &Value,
) -> Result<()> {
    let Value::Object(object) = value else {
        return Err(Error::Conversion(format!("{value:?} is not an object")));
    };
    if let Some(choices) = choices.filter(|c| !c.alternatives.is_empty()) {
        let alternative = choices
            .alternatives
            .iter()
            .find(|alt| alt.type_name == object.type_name())
            .ok_or(Error::NoAlternative("encode"))?;
        if choices.prefix_size > 0 && alternative.condition.contains(PREFIX_VAR) {
            writer.put_uint(
                u64::from(alternative.prefix),
                choices.prefix_size,
                choices.byte_order,
            );
            parser.bind_prefix(u64::from(alternative.prefix));
        }
        let template = parser.subtemplate(&alternative.type_name)?;
        return parser.encode_into(template, writer, object);
    }
    let type_name = element.ok_or(Error::NoAlternative("encode"))?;
    let template = parser.subtemplate(type_name)?;
    parser.encode_into(template, writer, object)
}
