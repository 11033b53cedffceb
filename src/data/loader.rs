use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::math::ImageBatch;

/// File extensions picked up when indexing a class directory.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["bmp", "gif", "jpeg", "jpg", "png"];

/// One labeled image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// Lists the class subdirectories of `root`, sorted by name.
///
/// Non-directory entries are ignored, as are names that are not valid UTF-8.
pub fn list_class_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, DatasetError> {
    if !root.is_dir() {
        return Err(DatasetError::MissingDirectory(root.to_path_buf()));
    }
    let entries = std::fs::read_dir(root).map_err(|e| DatasetError::io(root, e))?;
    let mut classes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            debug!(path = %path.display(), "skipping non-directory entry");
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => classes.push((name, path)),
            Err(name) => warn!(?name, "skipping class directory with a non UTF-8 name"),
        }
    }
    classes.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(classes)
}

/// Lists the regular files directly inside `dir`, sorted by file name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DatasetError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| DatasetError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes an image file, converts it to RGB, resizes it to `size × size`
/// (bilinear, aspect ratio not preserved) and scales it to [0, 1].
pub fn load_image(path: &Path, size: u32) -> Result<Vec<f32>, DatasetError> {
    let img = image::open(path).map_err(|e| DatasetError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);
    Ok(resized.into_raw().into_iter().map(|c| c as f32 / 255.0).collect())
}

/// A directory of class subdirectories, indexed as `(path, label)` samples.
///
/// Label `i` is the `i`-th class name in lexicographic order, so the mapping
/// does not depend on the order the filesystem lists directories in.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    class_names: Vec<String>,
    samples: Vec<Sample>,
    image_size: u32,
}

impl ImageFolder {
    /// Indexes `root`, discovering the class names from its subdirectories.
    pub fn open(root: &Path, image_size: u32) -> Result<ImageFolder, DatasetError> {
        let classes = list_class_dirs(root)?;
        if classes.is_empty() {
            return Err(DatasetError::NoClasses(root.to_path_buf()));
        }
        let class_names: Vec<String> = classes.iter().map(|(name, _)| name.clone()).collect();
        ImageFolder::index(root, class_names, classes, image_size)
    }

    /// Indexes `root` against an existing class list (e.g. the training
    /// split's), so labels line up across splits. A subdirectory that is not
    /// in `class_names` is an error; a class without a subdirectory simply
    /// has no samples.
    pub fn open_with_classes(root: &Path, class_names: &[String], image_size: u32) -> Result<ImageFolder, DatasetError> {
        let classes = list_class_dirs(root)?;
        if let Some((name, _)) = classes.iter().find(|(name, _)| !class_names.contains(name)) {
            return Err(DatasetError::UnknownClass { class: name.clone(), dir: root.to_path_buf() });
        }
        ImageFolder::index(root, class_names.to_vec(), classes, image_size)
    }

    fn index(
        root: &Path,
        class_names: Vec<String>,
        classes: Vec<(String, PathBuf)>,
        image_size: u32,
    ) -> Result<ImageFolder, DatasetError> {
        let mut samples = Vec::new();
        for (name, dir) in classes {
            let Some(label) = class_names.iter().position(|c| *c == name) else {
                continue;
            };
            for path in list_files(&dir)? {
                if has_image_extension(&path) {
                    samples.push(Sample { path, label });
                } else {
                    debug!(path = %path.display(), "skipping file without an image extension");
                }
            }
        }
        Ok(ImageFolder { root: root.to_path_buf(), class_names, samples, image_size })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Sample indices in order, chunked into batches of at most `batch_size`.
    pub fn batches(&self, batch_size: usize) -> Vec<Vec<usize>> {
        let order: Vec<usize> = (0..self.samples.len()).collect();
        order.chunks(batch_size.max(1)).map(<[usize]>::to_vec).collect()
    }

    /// Like `batches`, over a fresh random permutation of the samples.
    pub fn shuffled_batches<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        order.shuffle(rng);
        order.chunks(batch_size.max(1)).map(<[usize]>::to_vec).collect()
    }

    /// Decodes the samples at `indices` (in parallel) into a batch plus labels.
    pub fn load_batch(&self, indices: &[usize]) -> Result<(ImageBatch, Vec<usize>), DatasetError> {
        let decoded: Vec<Vec<f32>> = indices
            .par_iter()
            .map(|&i| load_image(&self.samples[i].path, self.image_size))
            .collect::<Result<_, _>>()?;
        let size = self.image_size as usize;
        let mut batch = ImageBatch::new(size, size);
        for image in &decoded {
            batch.push(image);
        }
        let labels = indices.iter().map(|&i| self.samples[i].label).collect();
        Ok((batch, labels))
    }
}
