use std::fmt;
use std::sync::Arc;

use crate::bits::ByteOrder;
use crate::descriptor::PrimType;
use crate::result::Result;
use crate::value::{Value, ValueType};

/// Transforms between the raw wire-level value and the field value.
/// `decode` runs after the bits are read, `encode` before they are written.
pub trait Converter: fmt::Debug + Send + Sync {
    fn decode(&self, raw: Value) -> Result<Value>;
    fn encode(&self, value: Value) -> Result<Value>;
}

#[derive(Debug)]
pub struct IdentityConverter;

impl Converter for IdentityConverter {
    fn decode(&self, raw: Value) -> Result<Value> {
        Ok(raw)
    }

    fn encode(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

pub trait Validator: fmt::Debug + Send + Sync {
    fn validate(&self, value: &Value) -> bool;
}

/// Identifies messages of one template: the byte sequences a message may
/// start with, an optional closing sequence, and the charset both are
/// encoded under.
#[derive(Debug, Clone)]
pub struct Header {
    pub(crate) starts: Vec<String>,
    pub(crate) end: String,
    pub(crate) charset: String,
}

impl Header {
    pub fn new<I, S>(starts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            starts: starts.into_iter().map(Into::into).collect(),
            end: String::new(),
            charset: "UTF-8".to_owned(),
        }
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = end.into();
        self
    }

    pub fn charset(mut self, label: impl Into<String>) -> Self {
        self.charset = label.into();
        self
    }
}

/// Bits discarded ahead of a field: either a fixed amount (`size`
/// expression evaluating above zero) or everything up to a terminator byte.
#[derive(Debug, Clone)]
pub struct SkipDecl {
    pub(crate) size: String,
    pub(crate) terminator: u8,
    pub(crate) consume: bool,
}

impl SkipDecl {
    pub fn bits(size: impl Into<String>) -> Self {
        Self {
            size: size.into(),
            terminator: 0,
            consume: true,
        }
    }

    pub fn until(terminator: u8) -> Self {
        Self {
            size: String::new(),
            terminator,
            consume: true,
        }
    }

    pub fn consume(mut self, consume: bool) -> Self {
        self.consume = consume;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChecksumDecl {
    pub(crate) width: usize,
    pub(crate) algorithm: String,
    pub(crate) skip_start: usize,
    pub(crate) skip_end: usize,
    pub(crate) start_value: u64,
    pub(crate) byte_order: ByteOrder,
}

impl ChecksumDecl {
    pub fn new(width: usize, algorithm: impl Into<String>) -> Self {
        Self {
            width,
            algorithm: algorithm.into(),
            skip_start: 0,
            skip_end: 0,
            start_value: 0,
            byte_order: ByteOrder::default(),
        }
    }

    pub fn skip_start(mut self, bytes: usize) -> Self {
        self.skip_start = bytes;
        self
    }

    pub fn skip_end(mut self, bytes: usize) -> Self {
        self.skip_end = bytes;
        self
    }

    pub fn start_value(mut self, value: u64) -> Self {
        self.start_value = value;
        self
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }
}

/// One polymorphic alternative: picked on decode by evaluating `condition`
/// with the `prefix` context variable bound, picked on encode by the
/// value's runtime type.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub(crate) condition: String,
    pub(crate) prefix: u32,
    pub(crate) type_name: String,
}

#[derive(Debug, Clone)]
pub struct Choices {
    pub(crate) prefix_size: usize,
    pub(crate) byte_order: ByteOrder,
    pub(crate) alternatives: Vec<Alternative>,
}

impl Choices {
    pub fn new(prefix_size: usize) -> Self {
        Self {
            prefix_size,
            byte_order: ByteOrder::default(),
            alternatives: Vec::new(),
        }
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn alternative(
        mut self,
        condition: impl Into<String>,
        prefix: u32,
        type_name: impl Into<String>,
    ) -> Self {
        self.alternatives.push(Alternative {
            condition: condition.into(),
            prefix,
            type_name: type_name.into(),
        });
        self
    }
}

/// The recognized annotation set. A field carries any number of these; the
/// template compiler admits at most one binding per field and ignores
/// `Custom` entirely.
#[derive(Debug, Clone)]
pub enum Annotation {
    Bits { size: String },
    Byte,
    Short,
    Int,
    Long,
    Integer { size: String, allow_primitive: bool },
    Float,
    Double,
    Decimal { bits: usize },
    String { size: String, charset: String },
    StringTerminated { terminator: u8, consume: bool, charset: String },
    ArrayPrimitive { component: PrimType, size: String },
    Array { element: Option<String>, choices: Option<Choices>, size: String },
    Object { type_name: Option<String>, choices: Option<Choices> },
    Checksum(ChecksumDecl),
    Evaluate { expr: String, want: ValueType },
    Custom(String),
}

impl Annotation {
    pub fn string(size: impl Into<String>) -> Self {
        Annotation::String {
            size: size.into(),
            charset: "UTF-8".to_owned(),
        }
    }

    pub fn string_in(size: impl Into<String>, charset: impl Into<String>) -> Self {
        Annotation::String {
            size: size.into(),
            charset: charset.into(),
        }
    }

    pub fn object(type_name: impl Into<String>) -> Self {
        Annotation::Object {
            type_name: Some(type_name.into()),
            choices: None,
        }
    }

    pub fn object_choices(choices: Choices) -> Self {
        Annotation::Object {
            type_name: None,
            choices: Some(choices),
        }
    }

    pub fn array(element: impl Into<String>, size: impl Into<String>) -> Self {
        Annotation::Array {
            element: Some(element.into()),
            choices: None,
            size: size.into(),
        }
    }

    pub fn array_choices(choices: Choices, size: impl Into<String>) -> Self {
        Annotation::Array {
            element: None,
            choices: Some(choices),
            size: size.into(),
        }
    }
}

/// One declared record field with its annotations and common modifiers.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub(crate) name: String,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) condition: Option<String>,
    pub(crate) match_expr: Option<String>,
    pub(crate) byte_order: ByteOrder,
    pub(crate) unsigned: bool,
    pub(crate) converter: Option<Arc<dyn Converter>>,
    pub(crate) converter_choices: Vec<(String, Arc<dyn Converter>)>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
    pub(crate) skips: Vec<SkipDecl>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
            condition: None,
            match_expr: None,
            byte_order: ByteOrder::default(),
            unsigned: false,
            converter: None,
            converter_choices: Vec::new(),
            validator: None,
            skips: Vec::new(),
        }
    }

    pub fn with(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = Some(expr.into());
        self
    }

    pub fn matches(mut self, pattern: impl Into<String>) -> Self {
        self.match_expr = Some(pattern.into());
        self
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Adds a condition/converter pair; on both directions the first pair
    /// whose condition holds supplies the converter.
    pub fn converter_when(
        mut self,
        condition: impl Into<String>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        self.converter_choices.push((condition.into(), converter));
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn skip(mut self, skip: SkipDecl) -> Self {
        self.skips.push(skip);
        self
    }
}

/// The declared layout of one record type. Parent fields come first, in
/// the parent's own order, exactly as the compiler walks them.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) name: String,
    pub(crate) parent: Option<Arc<Schema>>,
    pub(crate) header: Option<Header>,
    pub(crate) fields: Vec<FieldDecl>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            header: None,
            fields: Vec::new(),
        }
    }

    pub fn header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lineage(&self) -> Vec<&FieldDecl> {
        let mut decls = Vec::new();
        if let Some(parent) = &self.parent {
            decls.extend(parent.lineage());
        }
        decls.extend(self.fields.iter());
        decls
    }
}
