use thiserror::Error;

pub type Result<A, E = Error> = std::result::Result<A, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer underflow: {requested} bits requested, {available} available")]
    Underflow { requested: usize, available: usize },
    #[error("byte-granular operation at unaligned bit position {position}")]
    Misaligned { position: usize },
    #[error("field '{field}' of '{template}': {source}")]
    Field {
        template: String,
        field: String,
        #[source]
        source: Box<Error>,
    },
    #[error("invalid annotations on field '{field}': {reason}")]
    Annotation { field: String, reason: String },
    #[error("duplicate header start sequence {0:?}")]
    DuplicateHeader(String),
    #[error("no template matches the buffer at byte {0}")]
    TemplateNotFound(usize),
    #[error("unknown template type '{0}'")]
    UnknownTemplate(String),
    #[error("template '{0}' cannot be coded standalone")]
    NotCodable(String),
    #[error("message end sequence mismatch")]
    TerminatorMismatch,
    #[error("checksum mismatch: expected {expected:#x}, found {actual:#x}")]
    ChecksumMismatch { expected: u64, actual: u64 },
    #[error("buffer holds {0} unparsed trailing bytes")]
    TrailingBytes(usize),
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error("validation rejected value: {0}")]
    Validation(String),
    #[error("value {value:?} does not match pattern {pattern:?}")]
    MatchFailure { pattern: String, value: String },
    #[error("expression '{expr}' failed to evaluate: {reason}")]
    Evaluation { expr: String, reason: String },
    #[error("unknown charset label '{0}'")]
    UnknownCharset(String),
    #[error("unknown checksum algorithm '{0}'")]
    UnknownChecksummer(String),
    #[error("no matching alternative for {0}")]
    NoAlternative(&'static str),
}

impl Error {
    pub(crate) fn in_field(self, template: &str, field: &str) -> Error {
        match self {
            err @ Error::Field { .. } => err,
            other => Error::Field {
                template: template.to_owned(),
                field: field.to_owned(),
                source: Box::new(other),
            },
        }
    }
}
