use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::config::SplitConfig;
use crate::data::loader::{list_class_dirs, list_files};
use crate::error::DatasetError;

/// File names assigned to each split for one class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassSplit {
    pub class: String,
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

impl ClassSplit {
    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }
}

/// Outcome of a splitter run, one entry per class in name order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitReport {
    pub classes: Vec<ClassSplit>,
}

/// Seeded shuffle-then-cut: returns `(kept, held_out)` where `held_out` has
/// `ceil(n * fraction)` items.
fn holdout<T: Clone>(items: &[T], fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let n_holdout = ((items.len() as f64) * fraction).ceil() as usize;
    let n_holdout = n_holdout.min(items.len());
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let held = order[..n_holdout].iter().map(|&i| items[i].clone()).collect();
    let kept = order[n_holdout..].iter().map(|&i| items[i].clone()).collect();
    (kept, held)
}

/// Partitions `files` into `(train, val, test)`.
///
/// Two seeded cuts: first `test_size + val_size` of the files are held out,
/// then `test_size / (test_size + val_size)` of the holdout becomes the test
/// set and the rest validation. The result depends only on the input order,
/// the fractions and the seed.
pub fn partition<T: Clone>(files: &[T], test_size: f64, val_size: f64, seed: u64) -> (Vec<T>, Vec<T>, Vec<T>) {
    let holdout_fraction = test_size + val_size;
    let (train, held) = holdout(files, holdout_fraction, seed);
    let (val, test) = holdout(&held, test_size / holdout_fraction, seed);
    (train, val, test)
}

fn validate_fractions(test_size: f64, val_size: f64) -> Result<(), DatasetError> {
    let sum = test_size + val_size;
    let ok = test_size >= 0.0 && val_size >= 0.0 && sum > 0.0 && sum < 1.0;
    if ok {
        Ok(())
    } else {
        Err(DatasetError::InvalidFractions { test_size, val_size })
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn copy_into(files: &[String], src_dir: &Path, dst_dir: &Path) -> Result<(), DatasetError> {
    std::fs::create_dir_all(dst_dir).map_err(|e| DatasetError::io(dst_dir, e))?;
    for name in files {
        let from = src_dir.join(name);
        std::fs::copy(&from, dst_dir.join(name)).map_err(|e| DatasetError::io(&from, e))?;
    }
    Ok(())
}

/// Copies every class subdirectory of `config.dataset_dir` into the train,
/// validation and test roots, each image landing in exactly one of them.
///
/// Split roots nested inside the dataset directory are not mistaken for
/// classes. Existing destination files with the same name are overwritten.
/// Any IO failure aborts the run.
pub fn split_dataset(config: &SplitConfig) -> Result<SplitReport, DatasetError> {
    validate_fractions(config.test_size, config.val_size)?;
    let destinations: [&PathBuf; 3] = [&config.train_dir, &config.val_dir, &config.test_dir];

    let classes = list_class_dirs(&config.dataset_dir)?;
    for dir in destinations {
        std::fs::create_dir_all(dir).map_err(|e| DatasetError::io(dir, e))?;
    }

    let mut report = SplitReport::default();
    for (class, class_dir) in classes {
        if destinations.iter().any(|d| same_dir(&class_dir, d)) {
            info!(dir = %class_dir.display(), "skipping split output directory");
            continue;
        }

        let files: Vec<String> = list_files(&class_dir)?
            .into_iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
            .collect();
        if files.is_empty() {
            warn!(class = %class, "class directory has no files");
        }

        let (train, val, test) = partition(&files, config.test_size, config.val_size, config.seed);
        if train.is_empty() && !files.is_empty() {
            warn!(class = %class, files = files.len(), "too few images: training split is empty");
        }
        copy_into(&train, &class_dir, &config.train_dir.join(&class))?;
        copy_into(&val, &class_dir, &config.val_dir.join(&class))?;
        copy_into(&test, &class_dir, &config.test_dir.join(&class))?;

        info!(class = %class, train = train.len(), val = val.len(), test = test.len(), "split class");
        report.classes.push(ClassSplit { class, train, val, test });
    }
    Ok(report)
}
