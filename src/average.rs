// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layer/head attention averaging.
//!
//! The reduction at the heart of the service: a list of per-layer
//! attention tensors collapses into a single token-to-token matrix via an
//! unweighted arithmetic mean over the layer and head axes. Pure tensor
//! math with no model dependency, so it is testable against small
//! synthetic inputs with known expected averages.

use candle_core::{DType, Tensor};

use crate::error::{Result, ServiceError};

/// Average attention patterns across all layers and heads.
///
/// Layers and heads contribute equally; each input pattern's rows are
/// softmax distributions, so every averaged value stays in `[0, 1]` and
/// each averaged row still sums to 1.
///
/// # Shapes
/// - `attentions`: one tensor per layer, each `[batch, heads, seq, seq]`
///   with `batch == 1`
/// - returns: `[seq, seq]`
///
/// # Errors
///
/// Returns [`ServiceError::Model`] if `attentions` is empty, if shapes
/// disagree across layers, or if `batch != 1`.
pub fn average_attention(attentions: &[Tensor]) -> Result<Tensor> {
    if attentions.is_empty() {
        return Err(ServiceError::Model(candle_core::Error::Msg(
            "no attention tensors to average".into(),
        )));
    }

    // [layers, batch, heads, seq, seq]
    let stacked = Tensor::stack(attentions, 0)?;
    // mean over layers -> [batch, heads, seq, seq], then heads -> [batch, seq, seq]
    let averaged = stacked.mean(0)?.mean(1)?;
    // batch is always 1 for this service; squeeze errors otherwise
    Ok(averaged.squeeze(0)?)
}

/// Convert an averaged `[seq, seq]` matrix to row vectors for serialization.
///
/// # Errors
///
/// Returns [`ServiceError::Model`] if the tensor is not 2-D.
pub fn to_rows(matrix: &Tensor) -> Result<Vec<Vec<f32>>> {
    Ok(matrix.to_dtype(DType::F32)?.to_vec2()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use candle_core::Device;

    use super::*;

    /// Build a `[1, heads, 2, 2]` pattern tensor from per-head 2x2 rows.
    fn pattern(heads: &[[[f32; 2]; 2]]) -> Tensor {
        let device = Device::Cpu;
        let flat: Vec<f32> = heads
            .iter()
            .flat_map(|h| h.iter().flat_map(|row| row.iter().copied()))
            .collect();
        Tensor::from_vec(flat, (1, heads.len(), 2, 2), &device).unwrap()
    }

    #[test]
    fn known_average_two_layers_two_heads() {
        // Four 2x2 matrices; their element-wise mean is computed by hand.
        let layer0 = pattern(&[[[1.0, 0.0], [0.0, 1.0]], [[0.0, 1.0], [1.0, 0.0]]]);
        let layer1 = pattern(&[[[0.5, 0.5], [0.5, 0.5]], [[1.0, 0.0], [0.5, 0.5]]]);

        let averaged = average_attention(&[layer0, layer1]).unwrap();
        assert_eq!(averaged.dims(), &[2, 2]);

        let rows = to_rows(&averaged).unwrap();
        let expected = [[0.625, 0.375], [0.5, 0.5]];
        for i in 0..2 {
            for j in 0..2 {
                assert!(
                    (rows[i][j] - expected[i][j]).abs() < 1e-6,
                    "({i},{j}): {} != {}",
                    rows[i][j],
                    expected[i][j]
                );
            }
        }
    }

    #[test]
    fn single_layer_single_head_is_identity() {
        let layer = pattern(&[[[0.7, 0.3], [0.2, 0.8]]]);
        let rows = to_rows(&average_attention(&[layer]).unwrap()).unwrap();
        assert!((rows[0][0] - 0.7).abs() < 1e-6);
        assert!((rows[1][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn averaged_values_stay_in_unit_interval() {
        // Row-normalized inputs (softmax-like) must average into [0, 1].
        let layer0 = pattern(&[[[1.0, 0.0], [0.5, 0.5]], [[0.9, 0.1], [0.0, 1.0]]]);
        let layer1 = pattern(&[[[0.6, 0.4], [0.3, 0.7]], [[1.0, 0.0], [1.0, 0.0]]]);

        let rows = to_rows(&average_attention(&[layer0, layer1]).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.len(), 2);
            for &val in row {
                assert!((0.0..=1.0).contains(&val), "value {val} out of [0, 1]");
            }
        }
    }

    #[test]
    fn empty_input_errors() {
        assert!(average_attention(&[]).is_err());
    }

    #[test]
    fn matrix_is_square_for_any_seq_len() {
        let device = Device::Cpu;
        for seq in 1..=5_usize {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let uniform = 1.0_f32 / seq as f32;
            let t = Tensor::full(uniform, (1, 3, seq, seq), &device).unwrap();
            let rows = to_rows(&average_attention(&[t]).unwrap()).unwrap();
            assert_eq!(rows.len(), seq);
            for row in &rows {
                assert_eq!(row.len(), seq);
            }
        }
    }
}
