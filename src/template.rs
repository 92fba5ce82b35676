use std::collections::HashMap;
use std::sync::Arc;

use derive_getters::Getters;
use encoding_rs::Encoding;

use crate::checksum::Checksummer;
use crate::descriptor::{BoundField, ChecksumField, CompiledHeader, EvaluatedField, FieldKind};
use crate::result::{Error, Result};
use crate::schema::{Annotation, Choices, FieldDecl, Schema};

/// Compiled, immutable description of how one record type maps to a byte
/// sequence: the ordered field plan plus header and checksum metadata.
#[derive(Debug, Getters)]
pub struct Template {
    name: String,
    bounded: Vec<BoundField>,
    evaluated: Vec<EvaluatedField>,
    checksum: Option<ChecksumField>,
    header: Option<CompiledHeader>,
}

impl Template {
    pub fn compile(
        schema: &Schema,
        checksummers: &HashMap<String, Arc<dyn Checksummer>>,
    ) -> Result<Template> {
        let mut bounded = Vec::new();
        let mut evaluated = Vec::new();
        let mut checksum: Option<ChecksumField> = None;

        for decl in schema.lineage() {
            compile_field(decl, checksummers, &mut bounded, &mut evaluated, &mut checksum)?;
        }

        let header = schema.header.as_ref().map(compile_header).transpose()?;

        Ok(Template {
            name: schema.name.clone(),
            bounded,
            evaluated,
            checksum,
            header,
        })
    }

    /// A template is decodable as a top-level message only when it has a
    /// header to dispatch on and at least one bounded field.
    pub fn can_be_coded(&self) -> bool {
        self.header.is_some() && !self.bounded.is_empty()
    }
}

fn compile_field(
    decl: &FieldDecl,
    checksummers: &HashMap<String, Arc<dyn Checksummer>>,
    bounded: &mut Vec<BoundField>,
    evaluated: &mut Vec<EvaluatedField>,
    checksum: &mut Option<ChecksumField>,
) -> Result<()> {
    let mut kind: Option<(FieldKind, &'static str)> = None;
    let mut evaluate: Option<EvaluatedField> = None;

    let reject = |reason: String| Error::Annotation {
        field: decl.name.clone(),
        reason,
    };

    for annotation in &decl.annotations {
        if let Annotation::Custom(_) = annotation {
            continue;
        }
        if let Annotation::Evaluate { expr, want } = annotation {
            if evaluate.is_some() {
                return Err(reject("more than one evaluate annotation".to_owned()));
            }
            evaluate = Some(EvaluatedField {
                name: decl.name.clone(),
                expr: expr.clone(),
                want: *want,
            });
            continue;
        }

        let compiled = compile_binding(decl, annotation, checksummers, checksum)?;
        if let Some((_, seen)) = &kind {
            return Err(reject(format!(
                "conflicting binding annotations {seen} and {}",
                annotation_name(annotation)
            )));
        }
        kind = Some((compiled, annotation_name(annotation)));
    }

    match (kind, evaluate) {
        (Some(_), Some(_)) => Err(reject(
            "an evaluated field may not also be bounded".to_owned(),
        )),
        (Some((kind, _)), None) => {
            bounded.push(BoundField {
                name: decl.name.clone(),
                kind,
                byte_order: decl.byte_order,
                unsigned: decl.unsigned,
                condition: decl.condition.clone(),
                match_expr: decl.match_expr.clone(),
                converter: decl.converter.clone(),
                converter_choices: decl.converter_choices.clone(),
                validator: decl.validator.clone(),
                skips: decl.skips.clone(),
            });
            Ok(())
        }
        (None, Some(field)) => {
            evaluated.push(field);
            Ok(())
        }
        // a field with only skips/conditions/custom annotations binds nothing
        (None, None) => Ok(()),
    }
}

fn compile_binding(
    decl: &FieldDecl,
    annotation: &Annotation,
    checksummers: &HashMap<String, Arc<dyn Checksummer>>,
    checksum: &mut Option<ChecksumField>,
) -> Result<FieldKind> {
    let reject = |reason: String| Error::Annotation {
        field: decl.name.clone(),
        reason,
    };

    let kind = match annotation {
        Annotation::Bits { size } => {
            require_size(decl, size)?;
            FieldKind::Bits { size: size.clone() }
        }
        Annotation::Byte => FieldKind::Int { width: 8 },
        Annotation::Short => FieldKind::Int { width: 16 },
        Annotation::Int => FieldKind::Int { width: 32 },
        Annotation::Long => FieldKind::Int { width: 64 },
        Annotation::Integer {
            size,
            allow_primitive,
        } => {
            require_size(decl, size)?;
            FieldKind::Integer {
                size: size.clone(),
                allow_primitive: *allow_primitive,
            }
        }
        Annotation::Float => FieldKind::Float32,
        Annotation::Double => FieldKind::Float64,
        Annotation::Decimal { bits } => {
            if *bits != 32 && *bits != 64 {
                return Err(reject(format!("decimal width {bits} is not 32 or 64")));
            }
            FieldKind::Decimal { bits: *bits }
        }
        Annotation::String { size, charset } => {
            require_size(decl, size)?;
            FieldKind::Str {
                size: size.clone(),
                charset: resolve_charset(charset)?,
            }
        }
        Annotation::StringTerminated {
            terminator,
            consume,
            charset,
        } => FieldKind::StrTerminated {
            terminator: *terminator,
            consume: *consume,
            charset: resolve_charset(charset)?,
        },
        Annotation::ArrayPrimitive { component, size } => {
            require_size(decl, size)?;
            FieldKind::ArrayPrim {
                component: *component,
                size: size.clone(),
            }
        }
        Annotation::Array {
            element,
            choices,
            size,
        } => {
            require_size(decl, size)?;
            validate_choices(decl, element.as_deref(), choices.as_ref())?;
            FieldKind::ArrayObj {
                element: element.clone(),
                choices: choices.clone(),
                size: size.clone(),
            }
        }
        Annotation::Object { type_name, choices } => {
            validate_choices(decl, type_name.as_deref(), choices.as_ref())?;
            FieldKind::Object {
                element: type_name.clone(),
                choices: choices.clone(),
            }
        }
        Annotation::Checksum(params) => {
            if checksum.is_some() {
                return Err(reject("more than one checksum field".to_owned()));
            }
            if !matches!(params.width, 8 | 16 | 32 | 64) {
                return Err(reject(format!("checksum width {} is invalid", params.width)));
            }
            let algorithm = checksummers
                .get(&params.algorithm)
                .ok_or_else(|| Error::UnknownChecksummer(params.algorithm.clone()))?
                .clone();
            *checksum = Some(ChecksumField {
                name: decl.name.clone(),
                width: params.width,
                algorithm,
                skip_start: params.skip_start,
                skip_end: params.skip_end,
                start_value: params.start_value,
            });
            FieldKind::Checksum {
                width: params.width,
                byte_order: params.byte_order,
            }
        }
        Annotation::Evaluate { .. } | Annotation::Custom(_) => unreachable!(),
    };
    Ok(kind)
}

fn require_size(decl: &FieldDecl, size: &str) -> Result<()> {
    if size.is_empty() {
        return Err(Error::Annotation {
            field: decl.name.clone(),
            reason: "missing size expression".to_owned(),
        });
    }
    Ok(())
}

fn validate_choices(
    decl: &FieldDecl,
    static_type: Option<&str>,
    choices: Option<&Choices>,
) -> Result<()> {
    let reject = |reason: String| Error::Annotation {
        field: decl.name.clone(),
        reason,
    };
    match choices {
        Some(choices) => {
            if choices.prefix_size > 32 {
                return Err(reject(format!(
                    "choices prefix of {} bits exceeds 32",
                    choices.prefix_size
                )));
            }
            if choices.alternatives.is_empty() && static_type.is_none() {
                return Err(reject("choices without alternatives or a type".to_owned()));
            }
            Ok(())
        }
        None if static_type.is_none() => Err(reject("object field without a type".to_owned())),
        None => Ok(()),
    }
}

fn annotation_name(annotation: &Annotation) -> &'static str {
    match annotation {
        Annotation::Bits { .. } => "bits",
        Annotation::Byte => "byte",
        Annotation::Short => "short",
        Annotation::Int => "int",
        Annotation::Long => "long",
        Annotation::Integer { .. } => "integer",
        Annotation::Float => "float",
        Annotation::Double => "double",
        Annotation::Decimal { .. } => "decimal",
        Annotation::String { .. } => "string",
        Annotation::StringTerminated { .. } => "string-terminated",
        Annotation::ArrayPrimitive { .. } => "array-primitive",
        Annotation::Array { .. } => "array",
        Annotation::Object { .. } => "object",
        Annotation::Checksum(_) => "checksum",
        Annotation::Evaluate { .. } => "evaluate",
        Annotation::Custom(_) => "custom",
    }
}

fn resolve_charset(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.as_bytes()).ok_or_else(|| Error::UnknownCharset(label.to_owned()))
}

fn compile_header(header: &crate::schema::Header) -> Result<CompiledHeader> {
    let charset = resolve_charset(&header.charset)?;
    let starts = header
        .starts
        .iter()
        .map(|s| charset.encode(s).0.into_owned())
        .collect();
    let end = charset.encode(&header.end).0.into_owned();
    Ok(CompiledHeader {
        starts,
        end,
        charset,
    })
}
