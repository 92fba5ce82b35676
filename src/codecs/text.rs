use crate::bits::{BitReader, BitWriter};
use crate::codecs::Codec;
use crate::descriptor::{BoundField, FieldKind};
use crate::parser::TemplateParser;
use crate::result::Result;
use crate::value::{Record, Value};

#[derive(Debug)]
pub(crate) struct StringCodec;

impl Codec for StringCodec {
    fn decode(
        &self,
        parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        record: &Record,
    ) -> Result<Value> {
        let FieldKind::Str { size, charset } = &field.kind else {
            unreachable!()
        };
        let count = parser.evaluate_size(size, record)?;
        Ok(Value::Str(reader.get_text(count, charset)?))
    }

    fn encode(
        &self,
        parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::Str { size, charset } = &field.kind else {
            unreachable!()
        };
        let count = parser.evaluate_size(size, record)?;
        let text = match value {
            Value::Str(text) => text.clone(),
            other => other.render(),
        };
        // truncated to the declared size, never padded
        let (bytes, ..) = charset.encode(&text);
        writer.put_bytes(&bytes[..count.min(bytes.len())])
    }
}

#[derive(Debug)]
pub(crate) struct TerminatedCodec;

impl Codec for TerminatedCodec {
    fn decode(
        &self,
        _parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        _record: &Record,
    ) -> Result<Value> {
        let FieldKind::StrTerminated {
            terminator,
            consume,
            charset,
        } = &field.kind
        else {
            unreachable!()
        };
        Ok(Value::Str(reader.get_text_until(
            *terminator,
            *consume,
            charset,
        )?))
    }

    fn encode(
        &self,
        _parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        _record: &Record,
        value: &Value,
    ) -> Result<()> {
        let FieldKind::StrTerminated {
            terminator,
            consume,
            charset,
        } = &field.kind
        else {
            unreachable!()
        };
        let text = match value {
            Value::Str(text) => text.clone(),
            other => other.render(),
        };
        writer.put_text_terminated(&text, *terminator, *consume, charset)
    }
}
