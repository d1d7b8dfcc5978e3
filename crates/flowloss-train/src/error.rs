//! Error types for combining per-replica gradients.

use thiserror::Error;

/// Error type for gradient averaging across replicas.
///
/// Replicas must report the same parameters in the same order with gradients
/// of the same shape. Any disagreement is reported instead of silently
/// truncating or broadcasting.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplicaError {
    /// No replica gradients were provided.
    #[error("No replica gradients to average")]
    NoReplicas,

    /// A replica reports a different number of parameters than the first.
    #[error("Replica {replica} has {actual} parameters, expected {expected}")]
    ParameterCountMismatch {
        /// Index of the offending replica.
        replica: usize,
        /// Parameter count of the first replica.
        expected: usize,
        /// Parameter count of the offending replica.
        actual: usize,
    },

    /// Replicas disagree on which parameter sits at a position.
    #[error("Replica {replica} has parameter {actual} at position {position}, expected {expected}")]
    ParameterMismatch {
        /// Index of the offending replica.
        replica: usize,
        /// Position in the gradient list.
        position: usize,
        /// Handle of the first replica, debug formatted.
        expected: String,
        /// Handle of the offending replica, debug formatted.
        actual: String,
    },

    /// Replicas disagree on the shape of a gradient.
    #[error("Replica {replica} has gradient of shape {actual:?} at position {position}, expected {expected:?}")]
    ShapeMismatch {
        /// Index of the offending replica.
        replica: usize,
        /// Position in the gradient list.
        position: usize,
        /// Gradient shape of the first replica.
        expected: Vec<usize>,
        /// Gradient shape of the offending replica.
        actual: Vec<usize>,
    },
}

/// A specialized `Result` type for replica operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;
