use derive_getters::Getters;

use crate::descriptor::{BoundField, FieldKind};
use crate::template::Template;

/// A human-readable account of one compiled template, for diagnostics and
/// schema documentation.
#[derive(Debug, Clone, Getters)]
pub struct TemplateDescription {
    name: String,
    header_starts: Vec<String>,
    codable: bool,
    has_checksum: bool,
    fields: Vec<FieldDescription>,
}

#[derive(Debug, Clone, Getters)]
pub struct FieldDescription {
    name: String,
    kind: String,
    conditional: bool,
    evaluated: bool,
}

impl TemplateDescription {
    pub(crate) fn of(template: &Template) -> Self {
        let header_starts = template
            .header()
            .as_ref()
            .map(|header| {
                header
                    .starts
                    .iter()
                    .map(|key| {
                        header
                            .charset
                            .decode_without_bom_handling(key)
                            .0
                            .into_owned()
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut fields: Vec<FieldDescription> =
            template.bounded().iter().map(describe_bound).collect();
        fields.extend(template.evaluated().iter().map(|field| FieldDescription {
            name: field.name.clone(),
            kind: format!("evaluate({})", field.expr),
            conditional: false,
            evaluated: true,
        }));

        TemplateDescription {
            name: template.name().clone(),
            header_starts,
            codable: template.can_be_coded(),
            has_checksum: template.checksum().is_some(),
            fields,
        }
    }
}

fn describe_bound(field: &BoundField) -> FieldDescription {
    let kind = match &field.kind {
        FieldKind::Bits { size } => format!("bits[{size}]"),
        FieldKind::Int { width } if field.unsigned => format!("uint{width}"),
        FieldKind::Int { width } => format!("int{width}"),
        FieldKind::Integer { size, .. } => format!("integer[{size}]"),
        FieldKind::Float32 => "float32".to_owned(),
        FieldKind::Float64 => "float64".to_owned(),
        FieldKind::Decimal { bits } => format!("decimal{bits}"),
        FieldKind::Str { size, charset } => format!("string[{size}, {}]", charset.name()),
        FieldKind::StrTerminated { terminator, .. } => {
            format!("string-until[{terminator:#04x}]")
        }
        FieldKind::ArrayPrim { component, size } => format!("array[{component:?}; {size}]"),
        FieldKind::ArrayObj { element, choices, size } => match (element, choices) {
            (Some(element), _) => format!("array[{element}; {size}]"),
            (None, Some(choices)) => {
                format!("array[choices/{}; {size}]", choices.alternatives.len())
            }
            (None, None) => format!("array[?; {size}]"),
        },
        FieldKind::Object { element, choices } => match (element, choices) {
            (Some(element), _) => format!("object[{element}]"),
            (None, Some(choices)) => format!("object[choices/{}]", choices.alternatives.len()),
            (None, None) => "object[?]".to_owned(),
        },
        FieldKind::Checksum { width, .. } => format!("checksum{width}"),
    };
    FieldDescription {
        name: field.name.clone(),
        kind,
        conditional: field.condition.is_some(),
        evaluated: false,
    }
}
