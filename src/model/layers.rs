// Layer kernels for channels-last inference
// Each layer maps an owned activation tensor to the next one; no state is kept between calls

use ndarray::{s, Array1, Array2, Array3, Array4, ArrayD, Axis, Ix1, Ix3, Zip};
use serde::Deserialize;

use crate::model::InferenceError;

/// Element-wise (or last-axis, for softmax) activation functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Elu,
}

impl Activation {
    pub fn apply(self, x: &mut ArrayD<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => x.mapv_inplace(f32::tanh),
            Activation::Elu => x.mapv_inplace(|v| if v > 0.0 { v } else { v.exp_m1() }),
            Activation::Softmax => {
                if x.ndim() == 0 {
                    return;
                }
                let last = Axis(x.ndim() - 1);
                for mut lane in x.lanes_mut(last) {
                    let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    lane.mapv_inplace(|v| (v - max).exp());
                    let sum = lane.sum();
                    lane.mapv_inplace(|v| v / sum);
                }
            }
        }
    }
}

/// Spatial padding mode, Keras semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

impl Padding {
    /// Output length and leading pad for one spatial axis
    pub fn resolve(self, input: usize, window: usize, stride: usize) -> Option<(usize, usize)> {
        if input == 0 || window == 0 || stride == 0 {
            return None;
        }
        match self {
            Padding::Valid => {
                if input < window {
                    None
                } else {
                    Some(((input - window) / stride + 1, 0))
                }
            }
            Padding::Same => {
                let out = input.div_ceil(stride);
                let total = ((out - 1) * stride + window).saturating_sub(input);
                Some((out, total / 2))
            }
        }
    }
}

/// 2-D convolution, kernel laid out `(kh, kw, in, out)`
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub kernel: Array4<f32>,
    pub bias: Option<Array1<f32>>,
    pub strides: (usize, usize),
    pub padding: Padding,
    pub activation: Activation,
}

impl Conv2d {
    fn output_shape(&self, input: &[usize]) -> Option<Vec<usize>> {
        let &[h, w, c] = input else { return None };
        let (kh, kw, kc, filters) = self.kernel.dim();
        if c != kc {
            return None;
        }
        let (oh, _) = self.padding.resolve(h, kh, self.strides.0)?;
        let (ow, _) = self.padding.resolve(w, kw, self.strides.1)?;
        Some(vec![oh, ow, filters])
    }

    fn forward(&self, x: &Array3<f32>) -> Option<Array3<f32>> {
        let (h, w, c) = x.dim();
        let (kh, kw, kc, filters) = self.kernel.dim();
        if c != kc {
            return None;
        }
        let (sh, sw) = self.strides;
        let (oh, pad_top) = self.padding.resolve(h, kh, sh)?;
        let (ow, pad_left) = self.padding.resolve(w, kw, sw)?;

        let mut out = Array3::<f32>::zeros((oh, ow, filters));
        for oy in 0..oh {
            for ox in 0..ow {
                let mut acc = out.slice_mut(s![oy, ox, ..]);
                for ky in 0..kh {
                    let Some(iy) = (oy * sh + ky).checked_sub(pad_top).filter(|&iy| iy < h) else {
                        continue;
                    };
                    for kx in 0..kw {
                        let Some(ix) = (ox * sw + kx).checked_sub(pad_left).filter(|&ix| ix < w)
                        else {
                            continue;
                        };
                        for ci in 0..c {
                            acc.scaled_add(x[[iy, ix, ci]], &self.kernel.slice(s![ky, kx, ci, ..]));
                        }
                    }
                }
                if let Some(bias) = &self.bias {
                    acc += bias;
                }
            }
        }

        Some(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Max,
    Average,
}

/// 2-D pooling; padded cells never contribute (Keras/TF semantics)
#[derive(Debug, Clone, Copy)]
pub struct Pool2d {
    pub mode: PoolMode,
    pub pool: (usize, usize),
    pub strides: (usize, usize),
    pub padding: Padding,
}

impl Pool2d {
    fn output_shape(&self, input: &[usize]) -> Option<Vec<usize>> {
        let &[h, w, c] = input else { return None };
        let (oh, _) = self.padding.resolve(h, self.pool.0, self.strides.0)?;
        let (ow, _) = self.padding.resolve(w, self.pool.1, self.strides.1)?;
        Some(vec![oh, ow, c])
    }

    fn forward(&self, x: &Array3<f32>) -> Option<Array3<f32>> {
        let (h, w, c) = x.dim();
        let (ph, pw) = self.pool;
        let (sh, sw) = self.strides;
        let (oh, pad_top) = self.padding.resolve(h, ph, sh)?;
        let (ow, pad_left) = self.padding.resolve(w, pw, sw)?;

        let mut out = Array3::<f32>::zeros((oh, ow, c));
        for oy in 0..oh {
            let y0 = (oy * sh).saturating_sub(pad_top);
            let y1 = (oy * sh + ph).saturating_sub(pad_top).min(h);
            for ox in 0..ow {
                let x0 = (ox * sw).saturating_sub(pad_left);
                let x1 = (ox * sw + pw).saturating_sub(pad_left).min(w);
                let window = x.slice(s![y0..y1, x0..x1, ..]);
                let cells = ((y1 - y0) * (x1 - x0)) as f32;

                for ch in 0..c {
                    let lane = window.slice(s![.., .., ch]);
                    out[[oy, ox, ch]] = match self.mode {
                        PoolMode::Max => lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v)),
                        PoolMode::Average => lane.sum() / cells,
                    };
                }
            }
        }

        Some(out)
    }
}

/// Inference-mode batch normalization folded into `x * scale + shift` on the last axis
#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub scale: Array1<f32>,
    pub shift: Array1<f32>,
}

impl BatchNorm {
    pub fn fold(
        gamma: &Array1<f32>,
        beta: &Array1<f32>,
        mean: &Array1<f32>,
        variance: &Array1<f32>,
        epsilon: f32,
    ) -> Self {
        let scale = Zip::from(gamma)
            .and(variance)
            .map_collect(|&g, &v| g / (v + epsilon).sqrt());
        let shift = Zip::from(beta)
            .and(mean)
            .and(&scale)
            .map_collect(|&b, &m, &s| b - m * s);
        BatchNorm { scale, shift }
    }

    fn forward(&self, mut x: ArrayD<f32>) -> Option<ArrayD<f32>> {
        if x.ndim() == 0 || x.shape()[x.ndim() - 1] != self.scale.len() {
            return None;
        }
        let last = Axis(x.ndim() - 1);
        for mut lane in x.lanes_mut(last) {
            Zip::from(&mut lane)
                .and(&self.scale)
                .and(&self.shift)
                .for_each(|v, &a, &b| *v = *v * a + b);
        }
        Some(x)
    }
}

/// Fully connected layer, kernel laid out `(in, out)`
#[derive(Debug, Clone)]
pub struct Dense {
    pub kernel: Array2<f32>,
    pub bias: Option<Array1<f32>>,
    pub activation: Activation,
}

impl Dense {
    fn forward(&self, x: ArrayD<f32>) -> Option<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix1>().ok()?;
        if x.len() != self.kernel.nrows() {
            return None;
        }
        let mut y = x.dot(&self.kernel);
        if let Some(bias) = &self.bias {
            y += bias;
        }
        let mut y = y.into_dyn();
        self.activation.apply(&mut y);
        Some(y)
    }
}

#[derive(Debug, Clone)]
pub enum LayerKind {
    Conv2d(Conv2d),
    Pool2d(Pool2d),
    BatchNorm(BatchNorm),
    Dense(Dense),
    Flatten,
    GlobalAveragePool2d,
    /// Dropout and friends are identity at inference time
    Identity,
    Activation(Activation),
}

/// One named layer of a loaded model
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Layer {
            name: name.into(),
            kind,
        }
    }

    /// Shape this layer produces for `input`, or `None` if it can't accept it
    pub fn output_shape(&self, input: &[usize]) -> Option<Vec<usize>> {
        match &self.kind {
            LayerKind::Conv2d(conv) => conv.output_shape(input),
            LayerKind::Pool2d(pool) => pool.output_shape(input),
            LayerKind::BatchNorm(bn) => (input.last() == Some(&bn.scale.len())).then(|| input.to_vec()),
            LayerKind::Dense(dense) => match input {
                &[n] if n == dense.kernel.nrows() => Some(vec![dense.kernel.ncols()]),
                _ => None,
            },
            LayerKind::Flatten => Some(vec![input.iter().product()]),
            LayerKind::GlobalAveragePool2d => match input {
                &[h, w, c] if h > 0 && w > 0 => Some(vec![c]),
                _ => None,
            },
            LayerKind::Identity | LayerKind::Activation(_) => Some(input.to_vec()),
        }
    }

    /// Number of trainable/statistics values held by the layer
    pub fn parameter_count(&self) -> usize {
        match &self.kind {
            LayerKind::Conv2d(conv) => conv.kernel.len() + conv.bias.as_ref().map_or(0, |b| b.len()),
            LayerKind::Dense(dense) => dense.kernel.len() + dense.bias.as_ref().map_or(0, |b| b.len()),
            LayerKind::BatchNorm(bn) => bn.scale.len() + bn.shift.len(),
            _ => 0,
        }
    }

    pub fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>, InferenceError> {
        let shape = x.shape().to_vec();
        let result = match &self.kind {
            LayerKind::Conv2d(conv) => x
                .into_dimensionality::<Ix3>()
                .ok()
                .and_then(|x| conv.forward(&x))
                .map(|y| {
                    let mut y = y.into_dyn();
                    conv.activation.apply(&mut y);
                    y
                }),
            LayerKind::Pool2d(pool) => x
                .into_dimensionality::<Ix3>()
                .ok()
                .and_then(|x| pool.forward(&x))
                .map(|y| y.into_dyn()),
            LayerKind::BatchNorm(bn) => bn.forward(x),
            LayerKind::Dense(dense) => dense.forward(x),
            LayerKind::Flatten => Some(Array1::from_iter(x.iter().copied()).into_dyn()),
            LayerKind::GlobalAveragePool2d => x
                .into_dimensionality::<Ix3>()
                .ok()
                .and_then(|x| x.mean_axis(Axis(0)))
                .and_then(|x| x.mean_axis(Axis(0)))
                .map(|y| y.into_dyn()),
            LayerKind::Identity => Some(x),
            LayerKind::Activation(activation) => {
                let mut x = x;
                activation.apply(&mut x);
                Some(x)
            }
        };

        result.ok_or_else(|| InferenceError::LayerShape {
            layer: self.name.clone(),
            shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array};

    fn dyn3(h: usize, w: usize, c: usize, values: Vec<f32>) -> ArrayD<f32> {
        Array::from_shape_vec((h, w, c), values).unwrap().into_dyn()
    }

    #[test]
    fn test_padding_resolve() {
        assert_eq!(Padding::Valid.resolve(5, 3, 1), Some((3, 0)));
        assert_eq!(Padding::Valid.resolve(2, 3, 1), None);
        assert_eq!(Padding::Same.resolve(5, 3, 1), Some((5, 1)));
        assert_eq!(Padding::Same.resolve(5, 2, 2), Some((3, 0)));
        assert_eq!(Padding::Same.resolve(13, 3, 2), Some((7, 1)));
        assert_eq!(Padding::Same.resolve(0, 3, 1), None);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut x = arr1(&[1.0f32, 2.0, 3.0]).into_dyn();
        Activation::Softmax.apply(&mut x);

        assert!((x.sum() - 1.0).abs() < 1e-6);
        assert!(x[[2]] > x[[1]] && x[[1]] > x[[0]]);
    }

    #[test]
    fn test_softmax_is_stable_for_large_inputs() {
        let mut x = arr1(&[1000.0f32, 1000.0]).into_dyn();
        Activation::Softmax.apply(&mut x);
        assert!((x[[0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_activation_deserialize() {
        let activation: Activation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(activation, Activation::Relu);
        assert!(serde_json::from_str::<Activation>("\"swishy\"").is_err());
    }

    #[test]
    fn test_conv_same_padding_sums_neighbourhood() {
        // 3x3 all-ones kernel over a 3x3 all-ones image
        let conv = Conv2d {
            kernel: Array4::ones((3, 3, 1, 1)),
            bias: Some(arr1(&[0.5])),
            strides: (1, 1),
            padding: Padding::Same,
            activation: Activation::Linear,
        };
        let layer = Layer::new("conv", LayerKind::Conv2d(conv));

        let y = layer.forward(dyn3(3, 3, 1, vec![1.0; 9])).unwrap();
        assert_eq!(y.shape(), &[3, 3, 1]);
        assert_eq!(y[[1, 1, 0]], 9.5);
        assert_eq!(y[[0, 0, 0]], 4.5);
        assert_eq!(y[[0, 1, 0]], 6.5);
    }

    #[test]
    fn test_conv_valid_multi_channel() {
        // Two input channels, two filters: filter 0 reads channel 0, filter 1 reads channel 1
        let mut kernel = Array4::<f32>::zeros((1, 1, 2, 2));
        kernel[[0, 0, 0, 0]] = 2.0;
        kernel[[0, 0, 1, 1]] = -1.0;
        let conv = Conv2d {
            kernel,
            bias: None,
            strides: (1, 1),
            padding: Padding::Valid,
            activation: Activation::Relu,
        };
        let layer = Layer::new("conv", LayerKind::Conv2d(conv));

        let y = layer.forward(dyn3(1, 2, 2, vec![1.0, 3.0, -2.0, -4.0])).unwrap();
        assert_eq!(y.shape(), &[1, 2, 2]);
        assert_eq!(y[[0, 0, 0]], 2.0);
        assert_eq!(y[[0, 0, 1]], 0.0);
        assert_eq!(y[[0, 1, 0]], 0.0);
        assert_eq!(y[[0, 1, 1]], 4.0);
    }

    #[test]
    fn test_conv_rejects_wrong_channel_count() {
        let conv = Conv2d {
            kernel: Array4::ones((1, 1, 3, 1)),
            bias: None,
            strides: (1, 1),
            padding: Padding::Valid,
            activation: Activation::Linear,
        };
        let layer = Layer::new("conv", LayerKind::Conv2d(conv));

        let err = layer.forward(dyn3(2, 2, 1, vec![0.0; 4])).unwrap_err();
        assert!(matches!(err, InferenceError::LayerShape { .. }));
        assert_eq!(layer.output_shape(&[2, 2, 1]), None);
    }

    #[test]
    fn test_max_pool() {
        let pool = Pool2d {
            mode: PoolMode::Max,
            pool: (2, 2),
            strides: (2, 2),
            padding: Padding::Valid,
        };
        let layer = Layer::new("pool", LayerKind::Pool2d(pool));

        let x = dyn3(2, 4, 1, vec![1.0, 5.0, 2.0, 0.0, 3.0, 4.0, -1.0, 7.0]);
        let y = layer.forward(x).unwrap();
        assert_eq!(y.shape(), &[1, 2, 1]);
        assert_eq!(y[[0, 0, 0]], 5.0);
        assert_eq!(y[[0, 1, 0]], 7.0);
    }

    #[test]
    fn test_average_pool_same_ignores_padding() {
        let pool = Pool2d {
            mode: PoolMode::Average,
            pool: (2, 2),
            strides: (2, 2),
            padding: Padding::Same,
        };
        let layer = Layer::new("pool", LayerKind::Pool2d(pool));

        // 1x3 input -> 1x2 output, last window covers a single real cell
        let y = layer.forward(dyn3(1, 3, 1, vec![2.0, 4.0, 9.0])).unwrap();
        assert_eq!(y.shape(), &[1, 2, 1]);
        assert_eq!(y[[0, 0, 0]], 3.0);
        assert_eq!(y[[0, 1, 0]], 9.0);
    }

    #[test]
    fn test_batch_norm_fold() {
        let bn = BatchNorm::fold(
            &arr1(&[2.0, 1.0]),
            &arr1(&[0.5, 0.0]),
            &arr1(&[1.0, -1.0]),
            &arr1(&[4.0, 1.0]),
            0.0,
        );
        let layer = Layer::new("bn", LayerKind::BatchNorm(bn));

        let y = layer.forward(dyn3(1, 1, 2, vec![3.0, 1.0])).unwrap();
        // (3 - 1) / 2 * 2 + 0.5 = 2.5 ; (1 + 1) / 1 * 1 + 0 = 2
        assert!((y[[0, 0, 0]] - 2.5).abs() < 1e-6);
        assert!((y[[0, 0, 1]] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_dense_with_bias_and_activation() {
        let dense = Dense {
            kernel: arr2(&[[1.0, -1.0], [2.0, 0.5]]),
            bias: Some(arr1(&[0.0, -10.0])),
            activation: Activation::Relu,
        };
        let layer = Layer::new("dense", LayerKind::Dense(dense));

        let y = layer.forward(arr1(&[1.0, 2.0]).into_dyn()).unwrap();
        assert_eq!(y.shape(), &[2]);
        assert_eq!(y[[0]], 5.0);
        assert_eq!(y[[1]], 0.0);
    }

    #[test]
    fn test_dense_requires_flat_input() {
        let dense = Dense {
            kernel: Array2::ones((4, 2)),
            bias: None,
            activation: Activation::Linear,
        };
        let layer = Layer::new("dense", LayerKind::Dense(dense));

        assert!(layer.forward(dyn3(2, 2, 1, vec![1.0; 4])).is_err());
        assert_eq!(layer.output_shape(&[4]), Some(vec![2]));
        assert_eq!(layer.output_shape(&[2, 2, 1]), None);
    }

    #[test]
    fn test_flatten_is_row_major() {
        let layer = Layer::new("flatten", LayerKind::Flatten);
        let y = layer.forward(dyn3(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(y.as_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(layer.output_shape(&[13, 180, 4]), Some(vec![9360]));
    }

    #[test]
    fn test_global_average_pool() {
        let layer = Layer::new("gap", LayerKind::GlobalAveragePool2d);
        let y = layer.forward(dyn3(2, 1, 2, vec![1.0, 10.0, 3.0, 20.0])).unwrap();
        assert_eq!(y.shape(), &[2]);
        assert_eq!(y[[0]], 2.0);
        assert_eq!(y[[1]], 15.0);
    }
}
