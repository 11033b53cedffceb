use std::path::Path;

use rand::Rng;
use rayon::prelude::*;

use crate::activation::ActivationFunction;
use crate::backbone::conv::{fold_batch_norm, Conv2d};
use crate::backbone::weights::TensorStore;
use crate::error::ModelError;
use crate::math::{FeatureMap, ImageBatch, Matrix};

const BN_EPS: f32 = 1e-5;
const LAST_CHANNEL: usize = 1280;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// (expansion t, output channels c, repeats n, first stride s)
const INVERTED_RESIDUAL_SETTING: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

/// Rounds a scaled channel count to a multiple of `divisor`, never dropping
/// more than 10% below the requested value.
pub fn make_divisible(value: f32, divisor: usize) -> usize {
    let rounded = ((value + divisor as f32 / 2.0) as usize / divisor * divisor).max(divisor);
    if (rounded as f32) < 0.9 * value {
        rounded + divisor
    } else {
        rounded
    }
}

/// Shape of one convolution in the network, with the names it goes by in
/// torchvision checkpoints and in our own artifacts.
struct ConvSpec {
    name: String,
    torch_conv: String,
    torch_bn: String,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    groups: usize,
    activation: ActivationFunction,
}

impl ConvSpec {
    fn weight_shape(&self) -> [usize; 4] {
        Conv2d::weight_shape(self.out_channels, self.in_channels, self.kernel, self.groups)
    }

    fn with_parameters(&self, weight: Vec<f32>, bias: Vec<f32>) -> Conv2d {
        Conv2d {
            in_channels: self.in_channels,
            out_channels: self.out_channels,
            kernel: self.kernel,
            stride: self.stride,
            groups: self.groups,
            weight,
            bias,
            activation: self.activation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct InvertedResidual {
    expand: Option<Conv2d>,
    depthwise: Conv2d,
    project: Conv2d,
    use_residual: bool,
}

impl InvertedResidual {
    fn forward(&self, input: &FeatureMap) -> FeatureMap {
        let expanded;
        let hidden = match &self.expand {
            Some(conv) => {
                expanded = conv.forward(input);
                &expanded
            }
            None => input,
        };
        let mut out = self.project.forward(&self.depthwise.forward(hidden));
        if self.use_residual {
            for (o, i) in out.data.iter_mut().zip(&input.data) {
                *o += i;
            }
        }
        out
    }
}

/// MobileNetV2 feature extractor with the ImageNet classifier removed.
///
/// The network is frozen: it only has a forward pass. Inputs are RGB images
/// in [0, 1]; ImageNet standardization happens inside `extract`. The output
/// of `extract` is the globally average-pooled last feature map.
#[derive(Debug, Clone, PartialEq)]
pub struct MobileNetV2 {
    width_mult: f32,
    stem: Conv2d,
    blocks: Vec<InvertedResidual>,
    last: Conv2d,
}

impl MobileNetV2 {
    /// Builds every convolution of the network, asking `source` for its parameters.
    fn build<F>(width_mult: f32, mut source: F) -> Result<MobileNetV2, ModelError>
    where
        F: FnMut(&ConvSpec) -> Result<Conv2d, ModelError>,
    {
        let stem_channels = make_divisible(32.0 * width_mult, 8);
        let last_channels = make_divisible(LAST_CHANNEL as f32 * width_mult.max(1.0), 8);

        let stem = source(&ConvSpec {
            name: "stem".into(),
            torch_conv: "features.0.0".into(),
            torch_bn: "features.0.1".into(),
            in_channels: 3,
            out_channels: stem_channels,
            kernel: 3,
            stride: 2,
            groups: 1,
            activation: ActivationFunction::Relu6,
        })?;

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for &(t, c, n, s) in INVERTED_RESIDUAL_SETTING.iter() {
            let out_channels = make_divisible(c as f32 * width_mult, 8);
            for repeat in 0..n {
                let index = blocks.len();
                let feature = format!("features.{}.conv", index + 1);
                let stride = if repeat == 0 { s } else { 1 };
                let hidden = in_channels * t;

                // torchvision numbers the sub-layers differently when there is no expansion.
                let (expand, dw_prefix, project_conv, project_bn) = if t == 1 {
                    (None, format!("{feature}.0"), format!("{feature}.1"), format!("{feature}.2"))
                } else {
                    let expand = source(&ConvSpec {
                        name: format!("blocks.{index}.expand"),
                        torch_conv: format!("{feature}.0.0"),
                        torch_bn: format!("{feature}.0.1"),
                        in_channels,
                        out_channels: hidden,
                        kernel: 1,
                        stride: 1,
                        groups: 1,
                        activation: ActivationFunction::Relu6,
                    })?;
                    (Some(expand), format!("{feature}.1"), format!("{feature}.2"), format!("{feature}.3"))
                };

                let depthwise = source(&ConvSpec {
                    name: format!("blocks.{index}.depthwise"),
                    torch_conv: format!("{dw_prefix}.0"),
                    torch_bn: format!("{dw_prefix}.1"),
                    in_channels: hidden,
                    out_channels: hidden,
                    kernel: 3,
                    stride,
                    groups: hidden,
                    activation: ActivationFunction::Relu6,
                })?;
                let project = source(&ConvSpec {
                    name: format!("blocks.{index}.project"),
                    torch_conv: project_conv,
                    torch_bn: project_bn,
                    in_channels: hidden,
                    out_channels,
                    kernel: 1,
                    stride: 1,
                    groups: 1,
                    activation: ActivationFunction::Identity,
                })?;

                blocks.push(InvertedResidual {
                    expand,
                    depthwise,
                    project,
                    use_residual: stride == 1 && in_channels == out_channels,
                });
                in_channels = out_channels;
            }
        }

        let last = source(&ConvSpec {
            name: "last".into(),
            torch_conv: format!("features.{}.0", blocks.len() + 1),
            torch_bn: format!("features.{}.1", blocks.len() + 1),
            in_channels,
            out_channels: last_channels,
            kernel: 1,
            stride: 1,
            groups: 1,
            activation: ActivationFunction::Relu6,
        })?;

        Ok(MobileNetV2 { width_mult, stem, blocks, last })
    }

    /// Randomly initialized network. Only useful for exercising the pipeline
    /// without pretrained weights; its features carry no ImageNet knowledge.
    pub fn random<R: Rng + ?Sized>(width_mult: f32, rng: &mut R) -> MobileNetV2 {
        let built = MobileNetV2::build(width_mult, |spec| {
            Ok(Conv2d::random(
                spec.in_channels,
                spec.out_channels,
                spec.kernel,
                spec.stride,
                spec.groups,
                spec.activation,
                &mut *rng,
            ))
        });
        match built {
            Ok(net) => net,
            Err(_) => unreachable!("random initialization has no failure path"),
        }
    }

    /// Reads an ImageNet-pretrained checkpoint in torchvision `features.*`
    /// naming and folds every batch norm into its convolution.
    pub fn load_pretrained(path: &Path, width_mult: f32) -> Result<MobileNetV2, ModelError> {
        let mut store = TensorStore::read(path)?;
        MobileNetV2::from_torchvision(&mut store, width_mult)
    }

    pub fn from_torchvision(store: &mut TensorStore, width_mult: f32) -> Result<MobileNetV2, ModelError> {
        MobileNetV2::build(width_mult, |spec| {
            let out = spec.out_channels;
            let mut weight = store.take(&format!("{}.weight", spec.torch_conv), &spec.weight_shape())?;
            let gamma = store.take(&format!("{}.weight", spec.torch_bn), &[out])?;
            let beta = store.take(&format!("{}.bias", spec.torch_bn), &[out])?;
            let mean = store.take(&format!("{}.running_mean", spec.torch_bn), &[out])?;
            let var = store.take(&format!("{}.running_var", spec.torch_bn), &[out])?;
            let bias = fold_batch_norm(&mut weight, out, &gamma, &beta, &mean, &var, BN_EPS);
            Ok(spec.with_parameters(weight, bias))
        })
    }

    /// Reads parameters previously written by `export_folded` under `prefix`.
    pub fn from_folded(store: &mut TensorStore, prefix: &str, width_mult: f32) -> Result<MobileNetV2, ModelError> {
        MobileNetV2::build(width_mult, |spec| {
            let weight = store.take(&format!("{prefix}.{}.weight", spec.name), &spec.weight_shape())?;
            let bias = store.take(&format!("{prefix}.{}.bias", spec.name), &[spec.out_channels])?;
            Ok(spec.with_parameters(weight, bias))
        })
    }

    /// Writes the (already folded) parameters into `store` under `prefix`.
    pub fn export_folded(&self, store: &mut TensorStore, prefix: &str) {
        for (name, conv) in self.named_convs() {
            let shape = Conv2d::weight_shape(conv.out_channels, conv.in_channels, conv.kernel, conv.groups);
            store.insert(format!("{prefix}.{name}.weight"), shape.to_vec(), conv.weight.clone());
            store.insert(format!("{prefix}.{name}.bias"), vec![conv.out_channels], conv.bias.clone());
        }
    }

    fn named_convs(&self) -> Vec<(String, &Conv2d)> {
        let mut convs = vec![("stem".to_owned(), &self.stem)];
        for (i, block) in self.blocks.iter().enumerate() {
            if let Some(expand) = &block.expand {
                convs.push((format!("blocks.{i}.expand"), expand));
            }
            convs.push((format!("blocks.{i}.depthwise"), &block.depthwise));
            convs.push((format!("blocks.{i}.project"), &block.project));
        }
        convs.push(("last".to_owned(), &self.last));
        convs
    }

    pub fn width_mult(&self) -> f32 {
        self.width_mult
    }

    pub fn feature_dim(&self) -> usize {
        self.last.out_channels
    }

    /// Pooled features for one interleaved `height × width × 3` image in [0, 1].
    pub fn extract(&self, image: &[f32], height: usize, width: usize) -> Vec<f32> {
        let mut x = FeatureMap::from_hwc(height, width, 3, image);
        for c in 0..3 {
            let (mean, std) = (IMAGENET_MEAN[c], IMAGENET_STD[c]);
            x.plane_mut(c).iter_mut().for_each(|v| *v = (*v - mean) / std);
        }
        let mut x = self.stem.forward(&x);
        for block in &self.blocks {
            x = block.forward(&x);
        }
        self.last.forward(&x).global_average_pool()
    }

    /// Features for every image of a batch (`batch.len × feature_dim`), images in parallel.
    pub fn extract_batch(&self, batch: &ImageBatch) -> Matrix {
        let rows: Vec<Vec<f32>> = (0..batch.len)
            .into_par_iter()
            .map(|i| self.extract(batch.image(i), batch.height, batch.width))
            .collect();
        let data = rows.into_iter().flatten().collect();
        Matrix::from_vec(batch.len, self.feature_dim(), data)
    }
}
