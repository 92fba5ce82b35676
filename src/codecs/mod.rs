use std::fmt;

use crate::bits::{BitReader, BitWriter};
use crate::descriptor::{BoundField, FieldKind};
use crate::parser::TemplateParser;
use crate::result::Result;
use crate::value::{Record, Value};

mod compound;
mod numbers;
mod text;

/// One bounded field kind's decode/encode pair. The raw value a codec
/// returns or receives is the wire-side value; converters, validators and
/// match patterns are applied around these calls by the template parser.
pub(crate) trait Codec: fmt::Debug + Sync {
    fn decode(
        &self,
        parser: &TemplateParser,
        reader: &mut BitReader,
        field: &BoundField,
        record: &Record,
    ) -> Result<Value>;

    fn encode(
        &self,
        parser: &TemplateParser,
        writer: &mut BitWriter,
        field: &BoundField,
        record: &Record,
        value: &Value,
    ) -> Result<()>;
}

/// The closed kind → codec table.
pub(crate) fn codec_for(kind: &FieldKind) -> &'static dyn Codec {
    match kind {
        FieldKind::Bits { .. } => &numbers::BitsCodec,
        FieldKind::Int { .. } => &numbers::IntCodec,
        FieldKind::Integer { .. } => &numbers::IntegerCodec,
        FieldKind::Float32 | FieldKind::Float64 => &numbers::FloatCodec,
        FieldKind::Decimal { .. } => &numbers::DecimalCodec,
        FieldKind::Checksum { .. } => &numbers::ChecksumCodec,
        FieldKind::Str { .. } => &text::StringCodec,
        FieldKind::StrTerminated { .. } => &text::TerminatedCodec,
        FieldKind::ArrayPrim { .. } => &compound::ArrayPrimCodec,
        FieldKind::ArrayObj { .. } => &compound::ArrayObjCodec,
        FieldKind::Object { .. } => &compound::ObjectCodec,
    }
}
