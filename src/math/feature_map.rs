/// Channel-major (C × H × W) activation buffer for a single image.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl FeatureMap {
    pub fn zeros(channels: usize, height: usize, width: usize) -> FeatureMap {
        FeatureMap { channels, height, width, data: vec![0.0; channels * height * width] }
    }

    /// Converts an interleaved H × W × C buffer (the layout images come in) to C × H × W.
    pub fn from_hwc(height: usize, width: usize, channels: usize, hwc: &[f32]) -> FeatureMap {
        assert_eq!(hwc.len(), height * width * channels);
        let plane = height * width;
        let mut data = vec![0.0; hwc.len()];
        for (p, pixel) in hwc.chunks_exact(channels).enumerate() {
            for (c, &v) in pixel.iter().enumerate() {
                data[c * plane + p] = v;
            }
        }
        FeatureMap { channels, height, width, data }
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    pub fn plane(&self, channel: usize) -> &[f32] {
        let n = self.plane_len();
        &self.data[channel * n..(channel + 1) * n]
    }

    pub fn plane_mut(&mut self, channel: usize) -> &mut [f32] {
        let n = self.plane_len();
        &mut self.data[channel * n..(channel + 1) * n]
    }

    /// Mean of every channel plane.
    pub fn global_average_pool(&self) -> Vec<f32> {
        let n = self.plane_len() as f32;
        (0..self.channels)
            .map(|c| self.plane(c).iter().sum::<f32>() / n)
            .collect()
    }
}
