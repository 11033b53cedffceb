use rand::Rng;

use crate::activation::ActivationFunction;
use crate::math::FeatureMap;

/// 2-D convolution with "same"-style padding `(k - 1) / 2`, a bias term and
/// a fused activation. Weight layout is `[out, in / groups, k, k]`.
///
/// Batch norm never appears on its own: it is folded into `weight` and
/// `bias` when pretrained parameters are loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    pub groups: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub activation: ActivationFunction,
}

impl Conv2d {
    pub fn weight_shape(out_channels: usize, in_channels: usize, kernel: usize, groups: usize) -> [usize; 4] {
        [out_channels, in_channels / groups, kernel, kernel]
    }

    /// He-uniform weights and zero bias.
    pub fn random<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = (in_channels / groups) * kernel * kernel;
        let limit = (6.0 / fan_in as f32).sqrt();
        let len = out_channels * fan_in;
        Conv2d {
            in_channels,
            out_channels,
            kernel,
            stride,
            groups,
            weight: (0..len).map(|_| rng.gen_range(-limit..=limit)).collect(),
            bias: vec![0.0; out_channels],
            activation,
        }
    }

    #[inline]
    fn padding(&self) -> usize {
        (self.kernel - 1) / 2
    }

    pub fn output_size(&self, input: usize) -> usize {
        (input + 2 * self.padding() - self.kernel) / self.stride + 1
    }

    pub fn forward(&self, input: &FeatureMap) -> FeatureMap {
        assert_eq!(input.channels, self.in_channels, "channel mismatch");
        let mut out = if self.kernel == 1 && self.groups == 1 && self.stride == 1 {
            self.forward_pointwise(input)
        } else if self.groups == self.in_channels && self.groups == self.out_channels {
            self.forward_depthwise(input)
        } else {
            self.forward_dense(input)
        };
        self.activation.apply(&mut out.data);
        out
    }

    /// 1×1 convolution: every output plane is a weighted sum of input planes.
    fn forward_pointwise(&self, input: &FeatureMap) -> FeatureMap {
        let mut out = FeatureMap::zeros(self.out_channels, input.height, input.width);
        for oc in 0..self.out_channels {
            let weights = &self.weight[oc * self.in_channels..(oc + 1) * self.in_channels];
            let dst = out.plane_mut(oc);
            dst.fill(self.bias[oc]);
            for (ic, &w) in weights.iter().enumerate() {
                if w == 0.0 {
                    continue;
                }
                for (d, &s) in dst.iter_mut().zip(input.plane(ic)) {
                    *d += w * s;
                }
            }
        }
        out
    }

    /// One k×k filter per channel.
    fn forward_depthwise(&self, input: &FeatureMap) -> FeatureMap {
        let (oh, ow) = (self.output_size(input.height), self.output_size(input.width));
        let mut out = FeatureMap::zeros(self.out_channels, oh, ow);
        let k2 = self.kernel * self.kernel;
        for c in 0..self.out_channels {
            let filter = &self.weight[c * k2..(c + 1) * k2];
            let src = input.plane(c);
            let dst = out.plane_mut(c);
            dst.fill(self.bias[c]);
            self.accumulate_plane(src, input.height, input.width, filter, dst, oh, ow);
        }
        out
    }

    /// General grouped convolution (used by the stem).
    fn forward_dense(&self, input: &FeatureMap) -> FeatureMap {
        let (oh, ow) = (self.output_size(input.height), self.output_size(input.width));
        let mut out = FeatureMap::zeros(self.out_channels, oh, ow);
        let in_per_group = self.in_channels / self.groups;
        let out_per_group = self.out_channels / self.groups;
        let k2 = self.kernel * self.kernel;
        for oc in 0..self.out_channels {
            let group = oc / out_per_group;
            let dst = out.plane_mut(oc);
            dst.fill(self.bias[oc]);
            for i in 0..in_per_group {
                let ic = group * in_per_group + i;
                let offset = (oc * in_per_group + i) * k2;
                let filter = &self.weight[offset..offset + k2];
                self.accumulate_plane(input.plane(ic), input.height, input.width, filter, dst, oh, ow);
            }
        }
        out
    }

    /// Adds the correlation of one input plane with one k×k filter into `dst`.
    #[allow(clippy::too_many_arguments)]
    fn accumulate_plane(
        &self,
        src: &[f32],
        height: usize,
        width: usize,
        filter: &[f32],
        dst: &mut [f32],
        oh: usize,
        ow: usize,
    ) {
        let pad = self.padding() as isize;
        let stride = self.stride as isize;
        for ky in 0..self.kernel {
            for kx in 0..self.kernel {
                let w = filter[ky * self.kernel + kx];
                if w == 0.0 {
                    continue;
                }
                for oy in 0..oh {
                    let iy = oy as isize * stride + ky as isize - pad;
                    if iy < 0 || iy >= height as isize {
                        continue;
                    }
                    let src_row = &src[iy as usize * width..(iy as usize + 1) * width];
                    let dst_row = &mut dst[oy * ow..(oy + 1) * ow];
                    for (ox, d) in dst_row.iter_mut().enumerate() {
                        let ix = ox as isize * stride + kx as isize - pad;
                        if ix >= 0 && ix < width as isize {
                            *d += w * src_row[ix as usize];
                        }
                    }
                }
            }
        }
    }
}

/// Folds inference-mode batch norm into the preceding bias-free convolution.
///
/// `y = gamma * (conv(x) - mean) / sqrt(var + eps) + beta`, rewritten as a
/// per-output-channel scale on the weights plus a bias.
pub fn fold_batch_norm(
    weight: &mut [f32],
    out_channels: usize,
    gamma: &[f32],
    beta: &[f32],
    mean: &[f32],
    var: &[f32],
    eps: f32,
) -> Vec<f32> {
    let per_channel = weight.len() / out_channels;
    (0..out_channels)
        .map(|oc| {
            let scale = gamma[oc] / (var[oc] + eps).sqrt();
            for w in &mut weight[oc * per_channel..(oc + 1) * per_channel] {
                *w *= scale;
            }
            beta[oc] - mean[oc] * scale
        })
        .collect()
}
