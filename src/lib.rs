//! Declarative binary-message codec engine: schemas describe the typed,
//! sized, conditional and polymorphic fields of a message; compiled
//! templates drive a bit-level reader/writer that decodes byte streams
//! into records and encodes records back bit-identically.

use derive_getters::Getters;

pub mod bits;
pub mod checksum;
mod codecs;
pub mod describe;
pub mod descriptor;
pub mod eval;
pub mod loader;
pub mod parser;
pub mod result;
pub mod schema;
pub mod template;
mod utils;
pub mod value;

pub use bits::{BitReader, BitWriter, Bits, ByteOrder};
pub use describe::TemplateDescription;
pub use eval::{EvaluationContext, Evaluator};
pub use loader::TemplateLoader;
pub use result::{Error, Result};
pub use schema::{
    Annotation, ChecksumDecl, Choices, Converter, FieldDecl, Header, Schema, SkipDecl, Validator,
};
pub use template::Template;
pub use value::{Record, Value, ValueType};

use parser::TemplateParser;

/// Top-level façade: walks a buffer that may concatenate any number of
/// messages, dispatching each to the template whose header matches and
/// re-syncing on the next recognizable header after a failure.
#[derive(Debug)]
pub struct Parser {
    loader: TemplateLoader,
    evaluator: Box<dyn Evaluator>,
}

impl Parser {
    pub fn new(loader: TemplateLoader, evaluator: Box<dyn Evaluator>) -> Self {
        Self { loader, evaluator }
    }

    pub fn loader(&self) -> &TemplateLoader {
        &self.loader
    }

    pub fn parse(&self, buf: &[u8]) -> ParseResponse {
        self.parse_with(buf, EvaluationContext::new())
    }

    pub fn parse_with(&self, buf: &[u8], context: EvaluationContext) -> ParseResponse {
        let template_parser = TemplateParser::new(&self.loader, self.evaluator.as_ref(), context);
        let mut reader = BitReader::new(buf);
        let mut records = Vec::new();
        let mut errors = Vec::new();

        while reader.has_remaining() {
            reader.fallback();
            let before = reader.position_bits();
            let result = self
                .loader
                .pick(&reader)
                .and_then(|template| template_parser.decode(template, &mut reader));
            match result {
                Ok(record) => {
                    records.push(record);
                    if reader.position_bits() == before {
                        break;
                    }
                }
                Err(error) => {
                    errors.push(ParseError {
                        error,
                        byte_index: reader.position_bytes(),
                    });
                    reader.restore();
                    match self.loader.next_message_index(&reader) {
                        Some(next) => reader.set_position_bytes(next),
                        None => break,
                    }
                }
            }
        }

        if errors.is_empty() && reader.has_remaining() {
            let left = buf.len() - reader.position_bytes();
            errors.push(ParseError {
                error: Error::TrailingBytes(left),
                byte_index: reader.position_bytes(),
            });
        }

        ParseResponse { records, errors }
    }

    pub fn compose(&self, records: &[Record]) -> ComposeResponse {
        self.compose_with(records, EvaluationContext::new())
    }

    /// The encode mirror of `parse`: each record is encoded through the
    /// template registered under its type name; records without a codable
    /// template are collected as errors and skipped.
    pub fn compose_with(&self, records: &[Record], context: EvaluationContext) -> ComposeResponse {
        let template_parser = TemplateParser::new(&self.loader, self.evaluator.as_ref(), context);
        let mut bytes = Vec::new();
        let mut errors = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let result = self
                .loader
                .get(record.type_name())
                .and_then(|template| {
                    if template.can_be_coded() {
                        Ok(template)
                    } else {
                        Err(Error::NotCodable(record.type_name().to_owned()))
                    }
                })
                .and_then(|template| {
                    let mut writer = BitWriter::new();
                    template_parser.encode(template, &mut writer, record)?;
                    Ok(writer.into_bytes())
                });
            match result {
                Ok(encoded) => bytes.extend(encoded),
                Err(error) => errors.push(ComposeError {
                    error,
                    record_index: index,
                }),
            }
        }

        ComposeResponse { bytes, errors }
    }
}

#[derive(Debug)]
pub struct ParseError {
    pub error: Error,
    pub byte_index: usize,
}

#[derive(Debug, Getters)]
pub struct ParseResponse {
    records: Vec<Record>,
    errors: Vec<ParseError>,
}

impl ParseResponse {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

#[derive(Debug)]
pub struct ComposeError {
    pub error: Error,
    pub record_index: usize,
}

#[derive(Debug, Getters)]
pub struct ComposeResponse {
    bytes: Vec<u8>,
    errors: Vec<ComposeError>,
}

impl ComposeResponse {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
