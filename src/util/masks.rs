// SPDX-License-Identifier: MIT OR Apache-2.0

//! Causal attention mask construction.

use candle_core::{DType, Device, Tensor};

use crate::error::Result;

/// Create a causal attention mask.
///
/// # Shapes
/// - returns: `[1, 1, seq_len, seq_len]`
///
/// Future positions (`j > i`) are set to `-inf`; everything on or below
/// the diagonal is `0.0`. Added to attention scores before softmax.
///
/// # Errors
///
/// Returns [`ServiceError::Model`](crate::ServiceError::Model) if tensor
/// construction fails.
pub fn create_causal_mask(seq_len: usize, device: &Device, dtype: DType) -> Result<Tensor> {
    let mut mask_data = vec![0.0_f32; seq_len * seq_len];
    for i in 0..seq_len {
        for j in (i + 1)..seq_len {
            // idx is always < seq_len * seq_len by construction
            if let Some(cell) = mask_data.get_mut(i * seq_len + j) {
                *cell = f32::NEG_INFINITY;
            }
        }
    }
    Ok(Tensor::from_vec(mask_data, (1, 1, seq_len, seq_len), device)?.to_dtype(dtype)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn causal_mask_shape_and_values() {
        let device = Device::Cpu;
        let mask = create_causal_mask(3, &device, DType::F32).unwrap();
        assert_eq!(mask.dims(), &[1, 1, 3, 3]);

        let rows: Vec<Vec<f32>> = mask.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        for (i, row) in rows.iter().enumerate() {
            for (j, &val) in row.iter().enumerate() {
                if j > i {
                    assert_eq!(val, f32::NEG_INFINITY, "future position ({i},{j}) not masked");
                } else {
                    assert_eq!(val, 0.0, "visible position ({i},{j}) altered");
                }
            }
        }
    }

    #[test]
    fn causal_mask_single_token() {
        let mask = create_causal_mask(1, &Device::Cpu, DType::F32).unwrap();
        let rows: Vec<Vec<f32>> = mask.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        assert_eq!(rows, vec![vec![0.0]]);
    }
}
