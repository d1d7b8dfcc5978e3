//! Data-parallel training helpers.
//!
//! [`average_gradients`] combines the gradients computed by several model
//! replicas into the single update applied to the shared parameters.

pub mod error;
pub mod replica;

pub use error::{ReplicaError, ReplicaResult};
pub use replica::average_gradients;
