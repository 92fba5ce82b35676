use std::sync::Arc;

use encoding_rs::Encoding;

use crate::bits::ByteOrder;
use crate::checksum::Checksummer;
use crate::schema::{Choices, Converter, SkipDecl, Validator};
use crate::value::ValueType;

/// Element type of a primitive array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl PrimType {
    pub(crate) fn bit_width(self) -> usize {
        match self {
            PrimType::I8 | PrimType::U8 => 8,
            PrimType::I16 | PrimType::U16 => 16,
            PrimType::I32 | PrimType::U32 | PrimType::F32 => 32,
            PrimType::I64 | PrimType::U64 | PrimType::F64 => 64,
        }
    }
}

/// What a bounded field reads and writes, with the parameters its codec
/// needs. Size expressions stay textual; charsets and checksum algorithms
/// are resolved during template compilation.
#[derive(Debug, Clone)]
pub(crate) enum FieldKind {
    Bits {
        size: String,
    },
    Int {
        width: usize,
    },
    Integer {
        size: String,
        allow_primitive: bool,
    },
    Float32,
    Float64,
    Decimal {
        bits: usize,
    },
    Str {
        size: String,
        charset: &'static Encoding,
    },
    StrTerminated {
        terminator: u8,
        consume: bool,
        charset: &'static Encoding,
    },
    ArrayPrim {
        component: PrimType,
        size: String,
    },
    ArrayObj {
        element: Option<String>,
        choices: Option<Choices>,
        size: String,
    },
    Object {
        element: Option<String>,
        choices: Option<Choices>,
    },
    Checksum {
        width: usize,
        byte_order: ByteOrder,
    },
}

/// A compiled bounded field: the codec parameters plus the common
/// modifiers every field carries.
#[derive(Debug, Clone)]
pub struct BoundField {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) byte_order: ByteOrder,
    pub(crate) unsigned: bool,
    pub(crate) condition: Option<String>,
    pub(crate) match_expr: Option<String>,
    pub(crate) converter: Option<Arc<dyn Converter>>,
    pub(crate) converter_choices: Vec<(String, Arc<dyn Converter>)>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
    pub(crate) skips: Vec<SkipDecl>,
}

impl BoundField {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A field computed from an expression after the record is fully decoded.
#[derive(Debug, Clone)]
pub struct EvaluatedField {
    pub(crate) name: String,
    pub(crate) expr: String,
    pub(crate) want: ValueType,
}

/// The single per-template checksum: which record field holds it and how
/// the expected value is computed over the message bytes.
#[derive(Debug, Clone)]
pub struct ChecksumField {
    pub(crate) name: String,
    pub(crate) width: usize,
    pub(crate) algorithm: Arc<dyn Checksummer>,
    pub(crate) skip_start: usize,
    pub(crate) skip_end: usize,
    pub(crate) start_value: u64,
}

/// Header metadata with its byte sequences pre-encoded under the header
/// charset.
#[derive(Debug, Clone)]
pub struct CompiledHeader {
    pub(crate) starts: Vec<Vec<u8>>,
    pub(crate) end: Vec<u8>,
    pub(crate) charset: &'static Encoding,
}
