use burn::prelude::*;

/// Nearest-neighbor upsample by integer factors using reshape + repeat.
/// [B, C, H, W] -> [B, C, H*sh, W*sw]
pub fn upsample_nearest<B: Backend>(
    x: Tensor<B, 4>,
    scale_h: usize,
    scale_w: usize,
) -> Tensor<B, 4> {
    if scale_h == 1 && scale_w == 1 {
        return x;
    }
    let [batch, channels, height, width] = x.dims();

    let x = x.reshape([batch, channels, height, 1, width, 1]);
    let x = x.repeat_dim(3, scale_h);
    let x = x.repeat_dim(5, scale_w);
    x.reshape([batch, channels, height * scale_h, width * scale_w])
}

/// Nearest resize to an explicit target size. The target must be an integer
/// multiple of the source, which holds for pyramid features.
pub fn resize_nearest<B: Backend>(
    x: Tensor<B, 4>,
    target_height: usize,
    target_width: usize,
) -> Tensor<B, 4> {
    let [_, _, height, width] = x.dims();
    assert!(
        target_height % height == 0 && target_width % width == 0,
        "nearest resize needs integer scale factors: {}x{} -> {}x{}",
        height,
        width,
        target_height,
        target_width
    );
    upsample_nearest(x, target_height / height, target_width / width)
}

#[derive(Module, Debug, Clone)]
pub struct Upsample2d {
    scale_factor: usize,
}

impl Upsample2d {
    pub fn new(scale_factor: usize) -> Self {
        Self { scale_factor }
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        upsample_nearest(x, self.scale_factor, self.scale_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn doubles_spatial_size() {
        let device = NdArrayDevice::default();
        let up = Upsample2d::new(2);
        let x = Tensor::<NdArray, 4>::zeros([1, 4, 8, 8], &device);
        assert_eq!(up.forward(x).dims(), [1, 4, 16, 16]);
    }

    #[test]
    fn repeats_nearest_values() {
        let device = NdArrayDevice::default();
        let x = Tensor::<NdArray, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device)
            .reshape([1, 1, 2, 2]);
        let y = upsample_nearest(x, 2, 2);
        let data: Vec<f32> = y.into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(
            data,
            vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 3.0, 3.0, 4.0, 4.0]
        );
    }

    #[test]
    fn resize_targets_exact_size() {
        let device = NdArrayDevice::default();
        let x = Tensor::<NdArray, 4>::zeros([1, 2, 4, 4], &device);
        assert_eq!(resize_nearest(x, 16, 16).dims(), [1, 2, 16, 16]);
    }
}
