//! Fixed job configuration.
//!
//! Every job runs with the constants below; there are no flags and no
//! environment variables. Paths are relative to the working directory.

use std::path::PathBuf;

use crate::data::augment::AugmentationConfig;
use crate::train::callbacks::{EarlyStopping, ReduceLrOnPlateau};
use crate::train::FitConfig;

pub const IMAGE_SIZE: u32 = 224;
pub const MODEL_FILE: &str = "model/model.safetensors";
pub const LABEL_MAP_FILE: &str = "model/label_map.json";

/// Parameters of the dataset splitter.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub dataset_dir: PathBuf,
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    pub test_dir: PathBuf,
    pub test_size: f64,
    pub val_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            dataset_dir: PathBuf::from("dataset"),
            train_dir: PathBuf::from("dataset/train"),
            val_dir: PathBuf::from("dataset/val"),
            test_dir: PathBuf::from("dataset/test"),
            test_size: 0.2,
            val_size: 0.2,
            seed: 42,
        }
    }
}

/// Parameters of the trainer.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    /// Evaluated once after training when present.
    pub test_dir: PathBuf,
    pub model_path: PathBuf,
    pub label_map_path: PathBuf,
    /// Pretrained MobileNetV2 weights in torchvision `features.*` naming.
    pub backbone_weights: PathBuf,
    pub width_mult: f32,
    pub image_size: u32,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub dropout: f32,
    pub seed: u64,
    pub augmentation: AugmentationConfig,
    pub early_stopping: EarlyStopping,
    pub reduce_lr: ReduceLrOnPlateau,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            train_dir: PathBuf::from("dataset/train"),
            val_dir: PathBuf::from("dataset/val"),
            test_dir: PathBuf::from("dataset/test"),
            model_path: PathBuf::from(MODEL_FILE),
            label_map_path: PathBuf::from(LABEL_MAP_FILE),
            backbone_weights: PathBuf::from("weights/mobilenet_v2.safetensors"),
            width_mult: 1.0,
            image_size: IMAGE_SIZE,
            batch_size: 32,
            epochs: 20,
            learning_rate: 0.001,
            dropout: 0.2,
            seed: 42,
            augmentation: AugmentationConfig::default(),
            early_stopping: EarlyStopping::default(),
            reduce_lr: ReduceLrOnPlateau::default(),
        }
    }
}

impl TrainingConfig {
    /// The fit-loop part of the configuration, with both callbacks enabled.
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            seed: self.seed,
            augmentation: self.augmentation,
            early_stopping: Some(self.early_stopping),
            reduce_lr: Some(self.reduce_lr),
            ..FitConfig::new(self.epochs, self.batch_size, self.learning_rate)
        }
    }
}

/// Parameters of the inference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub model_path: PathBuf,
    pub label_map_path: PathBuf,
    /// The single origin allowed to make credentialed cross-origin requests.
    pub allowed_origin: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8000".to_owned(),
            model_path: PathBuf::from(MODEL_FILE),
            label_map_path: PathBuf::from(LABEL_MAP_FILE),
            allowed_origin: "http://localhost:3000".to_owned(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_defaults_leave_sixty_percent_for_training() {
        let cfg = SplitConfig::default();
        let train = 1.0 - cfg.test_size - cfg.val_size;
        assert!((train - 0.6).abs() < 1e-9);
        assert!(cfg.train_dir.starts_with(&cfg.dataset_dir));
    }

    #[test]
    fn training_defaults_match_the_published_hyperparameters() {
        let cfg = TrainingConfig::default();
        assert_eq!(cfg.image_size, 224);
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.epochs, 20);
        assert_eq!(cfg.learning_rate, 0.001);
        assert_eq!(cfg.early_stopping.patience, 5);
        assert_eq!(cfg.reduce_lr.patience, 3);

        let fit = cfg.fit_config();
        assert_eq!(fit.epochs, 20);
        assert!(fit.early_stopping.is_some() && fit.reduce_lr.is_some());
        assert!(!fit.augmentation.is_identity());
    }

    #[test]
    fn server_listens_on_all_interfaces_port_8000() {
        assert_eq!(ServerConfig::default().bind, "0.0.0.0:8000");
    }
}
