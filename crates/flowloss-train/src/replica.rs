//! Gradient averaging across data-parallel replicas.
//!
//! Each replica (tower) computes gradients on its shard of the batch. The
//! shared update uses the arithmetic mean of those gradients, paired with the
//! parameter handle reported by the first replica.

use std::fmt::Debug;

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{ReplicaError, ReplicaResult};

/// Average per-replica `(gradient, handle)` lists position by position.
///
/// All replicas must be fully computed before calling; this is the
/// synchronization point of a data-parallel step.
///
/// # Errors
///
/// - [`ReplicaError::NoReplicas`] for an empty slice
/// - [`ReplicaError::ParameterCountMismatch`] when list lengths differ
/// - [`ReplicaError::ParameterMismatch`] when handles differ at a position
/// - [`ReplicaError::ShapeMismatch`] when gradient shapes differ at a position
pub fn average_gradients<B, const D: usize, H>(
    tower_grads: &[Vec<(Tensor<B, D>, H)>],
) -> ReplicaResult<Vec<(Tensor<B, D>, H)>>
where
    B: Backend,
    H: Clone + PartialEq + Debug,
{
    let (first, rest) = tower_grads.split_first().ok_or(ReplicaError::NoReplicas)?;

    for (offset, replica) in rest.iter().enumerate() {
        if replica.len() != first.len() {
            return Err(ReplicaError::ParameterCountMismatch {
                replica: offset + 1,
                expected: first.len(),
                actual: replica.len(),
            });
        }
    }

    tracing::debug!(
        replicas = tower_grads.len(),
        parameters = first.len(),
        "averaging replica gradients"
    );

    let replica_count = tower_grads.len() as f64;
    first
        .iter()
        .enumerate()
        .map(|(position, (gradient, handle))| {
            let dims = gradient.dims();
            let mut sum = gradient.clone();

            for (offset, replica) in rest.iter().enumerate() {
                let (other, other_handle) = &replica[position];
                if other_handle != handle {
                    return Err(ReplicaError::ParameterMismatch {
                        replica: offset + 1,
                        position,
                        expected: format!("{handle:?}"),
                        actual: format!("{other_handle:?}"),
                    });
                }

                let other_dims = other.dims();
                if other_dims != dims {
                    return Err(ReplicaError::ShapeMismatch {
                        replica: offset + 1,
                        position,
                        expected: dims.to_vec(),
                        actual: other_dims.to_vec(),
                    });
                }

                sum = sum + other.clone();
            }

            Ok((sum.div_scalar(replica_count), handle.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use burn::{
        module::ParamId,
        tensor::{TensorData, Tolerance, Transaction},
    };

    use super::*;
    use crate::tests::TestBackend;

    type Grads = Vec<(Tensor<TestBackend, 2>, ParamId)>;

    fn gradient(values: [[f32; 2]; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::from(values), &Default::default())
    }

    #[test]
    fn averages_two_replicas() {
        let device = Default::default();
        let id = ParamId::new();
        let towers = vec![
            vec![(Tensor::<TestBackend, 2>::from_data(TensorData::from([[2.0]]), &device), id)],
            vec![(Tensor::<TestBackend, 2>::from_data(TensorData::from([[4.0]]), &device), id)],
        ];

        let averaged = average_gradients(&towers).expect("aligned replicas");

        assert_eq!(averaged.len(), 1);
        let (mean, handle) = averaged.into_iter().next().expect("one parameter");
        assert_eq!(handle, id);
        mean.into_data()
            .assert_approx_eq::<f32>(&TensorData::from([[3.0]]), Tolerance::default());
    }

    #[test]
    fn averages_each_position_over_three_replicas() {
        let weight = ParamId::new();
        let bias = ParamId::new();
        let towers: Vec<Grads> = vec![
            vec![(gradient([[1.0, 2.0], [3.0, 4.0]]), weight), (gradient([[0.0; 2]; 2]), bias)],
            vec![(gradient([[2.0, 2.0], [2.0, 2.0]]), weight), (gradient([[3.0; 2]; 2]), bias)],
            vec![(gradient([[3.0, 2.0], [1.0, 0.0]]), weight), (gradient([[6.0; 2]; 2]), bias)],
        ];

        let averaged = average_gradients(&towers).expect("aligned replicas");

        assert_eq!(averaged[0].1, weight);
        assert_eq!(averaged[1].1, bias);
        let [weight_data, bias_data]: [TensorData; 2] = Transaction::default()
            .register(averaged[0].0.clone())
            .register(averaged[1].0.clone())
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");
        weight_data.assert_approx_eq::<f32>(
            &TensorData::from([[2.0, 2.0], [2.0, 2.0]]),
            Tolerance::default(),
        );
        bias_data.assert_approx_eq::<f32>(
            &TensorData::from([[3.0, 3.0], [3.0, 3.0]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn single_replica_is_returned_unchanged() {
        let id = ParamId::new();
        let towers: Vec<Grads> = vec![vec![(gradient([[1.5, -2.0], [0.0, 7.0]]), id)]];

        let averaged = average_gradients(&towers).expect("one replica");

        averaged[0].0.clone().into_data().assert_approx_eq::<f32>(
            &TensorData::from([[1.5, -2.0], [0.0, 7.0]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn replicas_without_parameters_average_to_nothing() {
        let towers: Vec<Grads> = vec![Vec::new(), Vec::new()];

        let averaged = average_gradients(&towers).expect("aligned replicas");

        assert!(averaged.is_empty());
    }

    #[test]
    fn no_replicas_is_an_error() {
        let towers: Vec<Grads> = Vec::new();

        assert_eq!(average_gradients(&towers).err(), Some(ReplicaError::NoReplicas));
    }

    #[test]
    fn different_parameter_counts_are_an_error() {
        let id = ParamId::new();
        let towers: Vec<Grads> = vec![
            vec![(gradient([[1.0; 2]; 2]), id)],
            vec![(gradient([[1.0; 2]; 2]), id), (gradient([[1.0; 2]; 2]), ParamId::new())],
        ];

        assert_eq!(
            average_gradients(&towers).err(),
            Some(ReplicaError::ParameterCountMismatch {
                replica: 1,
                expected: 1,
                actual: 2,
            })
        );
    }

    #[test]
    fn different_handles_are_an_error() {
        let towers: Vec<Grads> = vec![
            vec![(gradient([[1.0; 2]; 2]), ParamId::new())],
            vec![(gradient([[1.0; 2]; 2]), ParamId::new())],
        ];

        assert!(matches!(
            average_gradients(&towers),
            Err(ReplicaError::ParameterMismatch {
                replica: 1,
                position: 0,
                ..
            })
        ));
    }

    #[test]
    fn different_shapes_are_an_error() {
        let device = Default::default();
        let id = ParamId::new();
        let towers: Vec<Grads> = vec![
            vec![(gradient([[1.0; 2]; 2]), id)],
            vec![(Tensor::zeros([2, 3], &device), id)],
        ];

        assert_eq!(
            average_gradients(&towers).err(),
            Some(ReplicaError::ShapeMismatch {
                replica: 1,
                position: 0,
                expected: vec![2, 2],
                actual: vec![2, 3],
            })
        );
    }

    #[test]
    fn errors_name_the_offending_replica() {
        let error = ReplicaError::ParameterCountMismatch {
            replica: 3,
            expected: 10,
            actual: 9,
        };

        assert_eq!(error.to_string(), "Replica 3 has 9 parameters, expected 10");
    }
}
