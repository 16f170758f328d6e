use crate::functions::Syntax;
use crate::types::DataType;
use mdx_cache::SegmentLoadError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("no function matches signature {name:?} ({syntax}) with the given arguments")]
    NoApplicableFunction { name: String, syntax: Syntax },

    #[error("argument {position} of {function} must be a {expected}, got a {actual}")]
    InvalidArgument {
        function: String,
        position: usize,
        expected: DataType,
        actual: DataType,
    },

    #[error("result ({attempted}) exceeded limit ({limit})")]
    ResultLimitExceeded { attempted: usize, limit: usize },

    #[error("hierarchy {hierarchy} has {members} members in the slicer context; current member is ambiguous")]
    AmbiguousCurrentMember { hierarchy: String, members: usize },

    #[error("hierarchy {hierarchy} has no default member")]
    NoDefaultMember { hierarchy: String },

    #[error(transparent)]
    SegmentLoad(#[from] SegmentLoadError),

    #[error("type error: {0}")]
    Type(String),
}
