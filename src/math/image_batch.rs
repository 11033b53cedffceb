/// A batch of RGB images stored NHWC with values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub len: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl ImageBatch {
    pub const CHANNELS: usize = 3;

    pub fn new(height: usize, width: usize) -> ImageBatch {
        ImageBatch { len: 0, height, width, data: Vec::new() }
    }

    #[inline]
    pub fn image_len(&self) -> usize {
        self.height * self.width * Self::CHANNELS
    }

    /// Appends one interleaved `height × width × 3` image.
    pub fn push(&mut self, image: &[f32]) {
        assert_eq!(image.len(), self.image_len(), "image does not match batch dimensions");
        self.data.extend_from_slice(image);
        self.len += 1;
    }

    pub fn image(&self, index: usize) -> &[f32] {
        let n = self.image_len();
        &self.data[index * n..(index + 1) * n]
    }

    pub fn image_mut(&mut self, index: usize) -> &mut [f32] {
        let n = self.image_len();
        &mut self.data[index * n..(index + 1) * n]
    }

    /// `[batch, height, width, channels]`.
    pub fn shape(&self) -> [usize; 4] {
        [self.len, self.height, self.width, Self::CHANNELS]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
