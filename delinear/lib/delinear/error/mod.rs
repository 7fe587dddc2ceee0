use std::fmt::{Display, Formatter};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Format error: {0}")]
    FormatError(#[from] FormatError),
    #[error("Analysis error: {0}")]
    AnalysisError(#[from] AnalysisError),
}

/**
 * Problems in the serialized module handed to the analyzer.
 **/
#[derive(Debug)]
pub enum FormatError {
    InvalidJson(String),
    MissingField(&'static str),
    UnknownOpcode(String),
    UnknownType(String),
    UnknownFunction(String),
    InvalidValue(String),
}

/**
 * Conditions under which the analysis refuses to produce a formula rather
 * than fabricating one.
 **/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    UnsupportedExpression {
        kind: &'static str,
        detail: String,
    },
    InconsistentDimensionCount {
        array: String,
        site_a: usize,
        dims_a: usize,
        site_b: usize,
        dims_b: usize,
    },
    MissingLoopLatch {
        depth: usize,
    },
    MissingLoopExit {
        depth: usize,
    },
    UnmappedArray {
        array: String,
    },
}

impl AnalysisError {
    pub(crate) fn unsupported(kind: &'static str, detail: impl Into<String>) -> AnalysisError {
        AnalysisError::UnsupportedExpression {
            kind,
            detail: detail.into(),
        }
    }
}

impl std::error::Error for FormatError {}

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::InvalidJson(msg) => write!(f, "invalid JSON: {}", msg),
            FormatError::MissingField(field) => write!(f, "missing field `{}`", field),
            FormatError::UnknownOpcode(op) => write!(f, "unknown opcode `{}`", op),
            FormatError::UnknownType(ty) => write!(f, "unknown type `{}`", ty),
            FormatError::UnknownFunction(name) => write!(f, "unknown function `{}`", name),
            FormatError::InvalidValue(v) => write!(f, "invalid value reference {}", v),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::UnsupportedExpression { kind, detail } => {
                write!(f, "unsupported {} expression: {}", kind, detail)
            }
            AnalysisError::InconsistentDimensionCount {
                array,
                site_a,
                dims_a,
                site_b,
                dims_b,
            } => write!(
                f,
                "array {} accessed with {} dimensions at site {} but {} dimensions at site {}",
                array, dims_a, site_a, dims_b, site_b
            ),
            AnalysisError::MissingLoopLatch { depth } => {
                write!(f, "loop at depth {} has no latch", depth)
            }
            AnalysisError::MissingLoopExit { depth } => {
                write!(f, "loop at depth {} has no conditional exit at its latch", depth)
            }
            AnalysisError::UnmappedArray { array } => {
                write!(f, "array {} is not initialized from a kernel argument", array)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
