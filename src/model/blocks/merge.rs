use burn::prelude::*;

/// Channel-axis concatenation of fan-in sources.
#[derive(Module, Debug, Clone)]
pub struct Concat;

impl Concat {
    pub fn new() -> Self {
        Self
    }

    pub fn forward<B: Backend>(&self, tensors: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
        Tensor::cat(tensors, 1)
    }
}

impl Default for Concat {
    fn default() -> Self {
        Self::new()
    }
}

/// Elementwise sum of fan-in sources of identical shape.
#[derive(Module, Debug, Clone)]
pub struct Shortcut;

impl Shortcut {
    pub fn new() -> Self {
        Self
    }

    pub fn forward<B: Backend>(&self, tensors: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
        let mut iter = tensors.into_iter();
        let first = match iter.next() {
            Some(t) => t,
            None => panic!("shortcut requires at least one input"),
        };
        iter.fold(first, |acc, t| acc + t)
    }
}

impl Default for Shortcut {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity placeholder occupying a graph slot, used as the entry layer of
/// auxiliary-branch configurations.
#[derive(Module, Debug, Clone)]
pub struct Silence;

impl Silence {
    pub fn new() -> Self {
        Self
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        x
    }
}

impl Default for Silence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn concat_sums_channel_widths() {
        let device = NdArrayDevice::default();
        let a = Tensor::<NdArray, 4>::zeros([1, 8, 4, 4], &device);
        let b = Tensor::<NdArray, 4>::zeros([1, 24, 4, 4], &device);
        assert_eq!(Concat::new().forward(vec![a, b]).dims(), [1, 32, 4, 4]);
    }

    #[test]
    fn shortcut_adds_sources() {
        let device = NdArrayDevice::default();
        let a = Tensor::<NdArray, 1>::from_floats([1.0, 2.0], &device).reshape([1, 2, 1, 1]);
        let b = Tensor::<NdArray, 1>::from_floats([3.0, 4.0], &device).reshape([1, 2, 1, 1]);
        let out = Shortcut::new().forward(vec![a, b]);
        let data: Vec<f32> = out.into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(data, vec![4.0, 6.0]);
    }
}
