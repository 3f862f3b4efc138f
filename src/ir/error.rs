//! Error type shared by the expression tree, the concatenation layer and the
//! discretisation.
//!
//! All errors are raised synchronously at construction, evaluation or
//! differentiation time and are never retried: they indicate an authoring
//! problem (inconsistent domains, meshes or symbol metadata).

use thiserror::Error;

/// Coarse classification of an [`IrError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Domain disjointness or compatibility violation
    Domain,
    /// Construction-time invariant violation or bad numeric input
    Value,
    /// A node of the wrong kind was supplied
    Type,
    /// The operation has no rule for this node
    NotImplemented,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("domain error: {0}")]
    Domain(String),

    #[error("{0}")]
    Value(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("mesh has no domain '{0}'")]
    UnknownDomain(String),

    #[error("shape mismatch: {0}")]
    Shape(String),
}

impl IrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IrError::Domain(_) => ErrorKind::Domain,
            IrError::Value(_) | IrError::UnknownDomain(_) | IrError::Shape(_) => ErrorKind::Value,
            IrError::Type(_) => ErrorKind::Type,
            IrError::NotImplemented(_) => ErrorKind::NotImplemented,
        }
    }
}

pub type Result<T> = std::result::Result<T, IrError>;
