use std::cell::RefCell;

use regex::Regex;

use crate::bits::{BitReader, BitWriter};
use crate::codecs;
use crate::descriptor::BoundField;
use crate::eval::{EvaluationContext, Evaluator, PREFIX_VAR};
use crate::loader::TemplateLoader;
use crate::result::{Error, Result};
use crate::schema::SkipDecl;
use crate::template::Template;
use crate::utils::mask;
use crate::value::{Record, Value, ValueType};

/// Drives one template over a reader or writer. One instance exists per
/// parse/compose invocation and owns that invocation's evaluation context.
pub struct TemplateParser<'a> {
    loader: &'a TemplateLoader,
    evaluator: &'a dyn Evaluator,
    context: RefCell<EvaluationContext>,
}

impl<'a> TemplateParser<'a> {
    pub fn new(
        loader: &'a TemplateLoader,
        evaluator: &'a dyn Evaluator,
        context: EvaluationContext,
    ) -> Self {
        Self {
            loader,
            evaluator,
            context: RefCell::new(context),
        }
    }

    pub fn decode(&self, template: &Template, reader: &mut BitReader) -> Result<Record> {
        let start = reader.position_bytes();
        let mut record = Record::new(template.name().as_str());

        for field in template.bounded() {
            self.decode_field(field, reader, &mut record)
                .map_err(|err| err.in_field(template.name(), &field.name))?;
        }

        for field in template.evaluated() {
            let value = self
                .evaluate(&field.expr, Some(&record), field.want)
                .and_then(|value| value.coerce(field.want))
                .map_err(|err| err.in_field(template.name(), &field.name))?;
            record.set(field.name.clone(), value);
        }

        if let Some(header) = template.header() {
            if !header.end.is_empty() {
                let bytes = reader.get_bytes(header.end.len())?;
                if bytes != header.end {
                    return Err(Error::TerminatorMismatch);
                }
            }
        }

        if let Some(checksum) = template.checksum() {
            let from = start + checksum.skip_start;
            let until = reader
                .position_bytes()
                .saturating_sub(checksum.skip_end)
                .max(from);
            let expected = checksum
                .algorithm
                .calculate(reader.buffer(), from, until, checksum.start_value)
                & mask(checksum.width);
            let actual = record
                .get(&checksum.name)
                .ok_or_else(|| {
                    Error::Conversion(format!("field '{}' was not decoded", checksum.name))
                })?
                .as_u64()?
                & mask(checksum.width);
            if actual != expected {
                return Err(Error::ChecksumMismatch { expected, actual });
            }
        }

        Ok(record)
    }

    pub fn encode(&self, template: &Template, writer: &mut BitWriter, record: &Record) -> Result<()> {
        self.encode_into(template, writer, record)?;
        writer.flush();
        Ok(())
    }

    /// Encode without the trailing flush, so nested objects keep the bit
    /// stream continuous.
    pub(crate) fn encode_into(
        &self,
        template: &Template,
        writer: &mut BitWriter,
        record: &Record,
    ) -> Result<()> {
        for field in template.bounded() {
            self.encode_field(field, writer, record)
                .map_err(|err| err.in_field(template.name(), &field.name))?;
        }

        if let Some(header) = template.header() {
            if !header.end.is_empty() {
                writer.put_bytes(&header.end)?;
            }
        }
        Ok(())
    }

    fn decode_field(
        &self,
        field: &BoundField,
        reader: &mut BitReader,
        record: &mut Record,
    ) -> Result<()> {
        for skip in &field.skips {
            self.skip_on_decode(skip, reader, record)?;
        }
        if !self.condition_holds(field, record)? {
            return Ok(());
        }

        let codec = codecs::codec_for(&field.kind);
        let raw = codec.decode(self, reader, field, record)?;
        let value = match self.converter_for(field, record)? {
            Some(converter) => converter.decode(raw)?,
            None => raw,
        };
        self.validate(field, &value)?;
        self.check_match(field, record, &value)?;
        record.set(field.name.clone(), value);
        Ok(())
    }

    fn encode_field(
        &self,
        field: &BoundField,
        writer: &mut BitWriter,
        record: &Record,
    ) -> Result<()> {
        for skip in &field.skips {
            self.skip_on_encode(skip, writer, record)?;
        }
        if !self.condition_holds(field, record)? {
            return Ok(());
        }

        let value = record
            .get(&field.name)
            .ok_or_else(|| Error::Conversion(format!("record has no value for '{}'", field.name)))?
            .clone();
        self.validate(field, &value)?;
        self.check_match(field, record, &value)?;
        let raw = match self.converter_for(field, record)? {
            Some(converter) => converter.encode(value)?,
            None => value,
        };

        let codec = codecs::codec_for(&field.kind);
        codec.encode(self, writer, field, record, &raw)
    }

    fn skip_on_decode(
        &self,
        skip: &SkipDecl,
        reader: &mut BitReader,
        record: &Record,
    ) -> Result<()> {
        match self.skip_bits(skip, record)? {
            Some(bits) => reader.skip(bits),
            None => reader.skip_until(skip.terminator, skip.consume),
        }
    }

    fn skip_on_encode(
        &self,
        skip: &SkipDecl,
        writer: &mut BitWriter,
        record: &Record,
    ) -> Result<()> {
        match self.skip_bits(skip, record)? {
            Some(bits) => {
                writer.pad(bits);
                Ok(())
            }
            None if skip.consume => writer.put_u8(skip.terminator),
            None => Ok(()),
        }
    }

    fn skip_bits(&self, skip: &SkipDecl, record: &Record) -> Result<Option<usize>> {
        if skip.size.is_empty() {
            return Ok(None);
        }
        let bits = self.evaluate_size(&skip.size, record)?;
        Ok((bits > 0).then_some(bits))
    }

    fn condition_holds(&self, field: &BoundField, record: &Record) -> Result<bool> {
        match &field.condition {
            None => Ok(true),
            Some(expr) => self.evaluate_bool(expr, record),
        }
    }

    fn validate(&self, field: &BoundField, value: &Value) -> Result<()> {
        if let Some(validator) = &field.validator {
            if !validator.validate(value) {
                return Err(Error::Validation(value.render()));
            }
        }
        Ok(())
    }

    /// Resolves a field's converter: the first `converter_when` pair whose
    /// condition holds wins, then the unconditional converter, then none.
    fn converter_for<'b>(
        &self,
        field: &'b BoundField,
        record: &Record,
    ) -> Result<Option<&'b dyn crate::schema::Converter>> {
        for (condition, converter) in &field.converter_choices {
            if self.evaluate_bool(condition, record)? {
                return Ok(Some(converter.as_ref()));
            }
        }
        Ok(field.converter.as_deref())
    }

    /// `match` resolution: the pattern text is the expression's string
    /// result when it evaluates, the raw text otherwise; the text compiles
    /// as a regex, or failing that as an anchored literal. An empty
    /// pattern matches vacuously.
    fn check_match(&self, field: &BoundField, record: &Record, value: &Value) -> Result<()> {
        let Some(expr) = &field.match_expr else {
            return Ok(());
        };
        let pattern = match self.evaluate(expr, Some(record), ValueType::Str) {
            Ok(Value::Str(text)) => text,
            _ => expr.clone(),
        };
        if pattern.is_empty() {
            return Ok(());
        }
        let regex =
            Regex::new(&pattern).or_else(|_| Regex::new(&format!("^{}$", regex::escape(&pattern))));
        let Ok(regex) = regex else {
            return Ok(());
        };
        let rendered = value.render();
        if regex.is_match(&rendered) {
            Ok(())
        } else {
            Err(Error::MatchFailure {
                pattern,
                value: rendered,
            })
        }
    }

    pub(crate) fn subtemplate(&self, type_name: &str) -> Result<&'a Template> {
        self.loader.get(type_name).map(|arc| arc.as_ref())
    }

    pub(crate) fn bind_prefix(&self, value: u64) {
        self.context.borrow_mut().set(PREFIX_VAR, Value::U64(value));
    }

    pub(crate) fn evaluate(
        &self,
        expr: &str,
        record: Option<&Record>,
        want: ValueType,
    ) -> Result<Value> {
        let context = self.context.borrow();
        self.evaluator.evaluate(expr, record, &context, want)
    }

    pub(crate) fn evaluate_bool(&self, expr: &str, record: &Record) -> Result<bool> {
        self.evaluate(expr, Some(record), ValueType::Bool)?.as_bool()
    }

    pub(crate) fn evaluate_size(&self, expr: &str, record: &Record) -> Result<usize> {
        self.evaluate(expr, Some(record), ValueType::I64)?.as_usize()
    }
}
