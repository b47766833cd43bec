//! Constant padding and stacking for CHW image tensors.

use burn::tensor::{backend::Backend, Tensor};

use crate::types::{CollateError, CollateResult};

/// Pads the bottom and right of a `[C, H, W]` tensor up to `[C, height, width]`.
pub fn pad_chw<B: Backend>(
    tensor: Tensor<B, 3>,
    height: usize,
    width: usize,
    value: f64,
) -> CollateResult<Tensor<B, 3>> {
    let [channels, h, w] = tensor.dims();
    if h > height || w > width {
        return Err(CollateError::ShapeMismatch {
            index: 0,
            expected: vec![channels, height, width],
            actual: vec![channels, h, w],
        });
    }
    if h == height && w == width {
        return Ok(tensor);
    }
    let device = tensor.device();
    let canvas = Tensor::<B, 3>::full([channels, height, width], value, &device);
    Ok(canvas.slice_assign([0..channels, 0..h, 0..w], tensor))
}

/// Pads each tensor to the group's max height/width with its own fill value and
/// stacks them into `[N, C, Hmax, Wmax]`.
///
/// Every tensor must have `channels` channels. `first_index` offsets the
/// sample index reported in errors.
pub fn stack_padded<B: Backend>(
    items: Vec<(Tensor<B, 3>, f64)>,
    channels: usize,
    first_index: usize,
) -> CollateResult<Tensor<B, 4>> {
    if items.is_empty() {
        return Err(CollateError::EmptyBatch);
    }
    let (mut height, mut width) = (0, 0);
    for (offset, (tensor, _)) in items.iter().enumerate() {
        let [c, h, w] = tensor.dims();
        if c != channels {
            return Err(CollateError::ChannelMismatch {
                index: first_index + offset,
                expected: channels,
                actual: c,
            });
        }
        height = height.max(h);
        width = width.max(w);
    }

    let padded = items
        .into_iter()
        .map(|(tensor, value)| pad_chw(tensor, height, width, value))
        .collect::<CollateResult<Vec<_>>>()?;
    Ok(Tensor::stack(padded, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn chw(values: Vec<f32>, shape: [usize; 3]) -> Tensor<B, 3> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn pad_fills_bottom_and_right() {
        let t = chw(vec![1.0, 2.0, 3.0, 4.0], [1, 2, 2]);
        let padded = pad_chw(t, 3, 3, -1.0).unwrap();
        assert_eq!(padded.dims(), [1, 3, 3]);
        let values = padded.into_data().to_vec::<f32>().unwrap();
        assert_eq!(
            values,
            vec![1.0, 2.0, -1.0, 3.0, 4.0, -1.0, -1.0, -1.0, -1.0]
        );
    }

    #[test]
    fn pad_is_identity_at_target_size() {
        let t = chw(vec![5.0; 6], [2, 1, 3]);
        let padded = pad_chw(t, 1, 3, 0.0).unwrap();
        assert_eq!(padded.into_data().to_vec::<f32>().unwrap(), vec![5.0; 6]);
    }

    #[test]
    fn pad_rejects_shrinking() {
        let t = chw(vec![0.0; 4], [1, 2, 2]);
        assert!(pad_chw(t, 1, 2, 0.0).is_err());
    }

    #[test]
    fn stack_padded_uses_group_max() {
        let items = vec![
            (chw(vec![1.0; 2], [1, 1, 2]), 0.0),
            (chw(vec![2.0; 3], [1, 3, 1]), 9.0),
        ];
        let stacked = stack_padded(items, 1, 0).unwrap();
        assert_eq!(stacked.dims(), [2, 1, 3, 2]);
        let values = stacked.into_data().to_vec::<f32>().unwrap();
        assert_eq!(
            values,
            vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 2.0, 9.0, 2.0, 9.0, 2.0, 9.0]
        );
    }

    #[test]
    fn stack_padded_reports_channel_mismatch_with_offset() {
        let items = vec![
            (chw(vec![0.0; 4], [1, 2, 2]), 0.0),
            (chw(vec![0.0; 8], [2, 2, 2]), 0.0),
        ];
        let err = stack_padded(items, 1, 4).unwrap_err();
        assert!(matches!(
            err,
            CollateError::ChannelMismatch {
                index: 5,
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn stack_padded_checks_first_item_against_expected_channels() {
        let items = vec![(chw(vec![0.0; 4], [1, 2, 2]), 0.0)];
        let err = stack_padded(items, 3, 2).unwrap_err();
        assert!(matches!(
            err,
            CollateError::ChannelMismatch {
                index: 2,
                expected: 3,
                actual: 1
            }
        ));
    }
}
