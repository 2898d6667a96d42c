use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Distribution focal decode: softmax over `reg_max` bins projected onto an
/// arange, turning per-side bin distributions into expected distances.
#[derive(Module, Debug, Clone)]
pub struct DFL {
    reg_max: usize,
}

impl DFL {
    pub fn new(reg_max: usize) -> Self {
        Self { reg_max }
    }

    /// [B, 4*reg_max, A] -> [B, 4, A]
    pub fn forward<B: Backend>(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, _, anchors] = x.dims();
        let device = x.device();

        let x = x.reshape([batch, 4, self.reg_max, anchors]);
        let prob = softmax(x, 2);

        let proj_vec: Vec<f32> = (0..self.reg_max).map(|i| i as f32).collect();
        let proj: Tensor<B, 4> = Tensor::<B, 1>::from_floats(proj_vec.as_slice(), &device)
            .reshape([1, 1, self.reg_max, 1]);

        (prob * proj)
            .sum_dim(2)
            .reshape([batch, 4, anchors])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn uniform_bins_decode_to_mean_distance() {
        let device = NdArrayDevice::default();
        let dfl = DFL::new(4);
        // Equal logits -> uniform distribution -> expected value (0+1+2+3)/4.
        let x = Tensor::<NdArray, 3>::zeros([1, 16, 2], &device);
        let out = dfl.forward(x);
        assert_eq!(out.dims(), [1, 4, 2]);
        let data: Vec<f32> = out.into_data().convert::<f32>().to_vec().unwrap();
        for v in data {
            assert!((v - 1.5).abs() < 1e-5);
        }
    }

    #[test]
    fn confident_bin_decodes_to_its_index() {
        let device = NdArrayDevice::default();
        let dfl = DFL::new(4);
        // One strongly dominant bin (index 2) for every side and anchor.
        let mut raw = vec![0.0f32; 16];
        for side in 0..4 {
            raw[side * 4 + 2] = 50.0;
        }
        let x = Tensor::<NdArray, 1>::from_floats(raw.as_slice(), &device).reshape([1, 16, 1]);
        let out = dfl.forward(x);
        let data: Vec<f32> = out.into_data().convert::<f32>().to_vec().unwrap();
        for v in data {
            assert!((v - 2.0).abs() < 1e-4);
        }
    }
}
