//! Error types for schema declaration and for parse/build passes.

/// Errors raised while declaring or compiling a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A type description mentions a field that is not declared before it.
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("Duplicate field: {0}")]
    DuplicateField(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Invalid field name: {0:?}")]
    InvalidName(String),
    #[error("Invalid default for {field}: {reason}")]
    InvalidDefault { field: String, reason: String },
}

/// Errors raised by a parse pass, a build pass, or record construction.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),
    /// The stream ended before `field` was complete.
    #[error("Truncated input in field {field}")]
    TruncatedInput { field: String },
    #[error("Decode: {0}")]
    Decode(String),
    #[error("Encode: {0}")]
    Encode(String),
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
    /// A type-specific failure, tagged with the field it happened in.
    #[error("field {field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Attach a field name, leaving already-located errors untouched.
    pub(crate) fn in_field(self, field: &str) -> Self {
        match self {
            CodecError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                CodecError::TruncatedInput { field: field.to_string() }
            }
            e @ (CodecError::TruncatedInput { .. } | CodecError::Field { .. }) => e,
            e => CodecError::Field { field: field.to_string(), source: Box::new(e) },
        }
    }

    /// Innermost error, looking through [`CodecError::Field`] wrappers.
    pub fn root(&self) -> &CodecError {
        match self {
            CodecError::Field { source, .. } => source.root(),
            e => e,
        }
    }
}
