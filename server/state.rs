use std::path::Path;
use std::sync::Arc;

use ferrite_leaf::{load_model, Classifier, LabelMap, ServerConfig};
use tracing::{error, info};

/// The model the server answers with, loaded once before the first request
/// and never mutated afterwards.
pub enum ModelState {
    Ready { classifier: Classifier, labels: LabelMap },
    /// Startup load failed; the server keeps running and reports 503.
    LoadFailed { reason: String },
}

impl ModelState {
    pub fn load(model_path: &Path, labels_path: &Path) -> ModelState {
        match load_model(model_path, labels_path) {
            Ok((classifier, labels)) => {
                info!(classes = labels.len(), model = %model_path.display(), "model loaded successfully");
                ModelState::Ready { classifier, labels }
            }
            Err(e) => {
                error!(error = %e, model = %model_path.display(), "error loading model");
                ModelState::LoadFailed { reason: e.to_string() }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready { .. })
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub model: ModelState,
}

impl AppState {
    pub fn load(config: ServerConfig) -> AppState {
        let model = ModelState::load(&config.model_path, &config.label_map_path);
        AppState { config, model }
    }
}

/// Shared read-only across request threads.
pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use ferrite_leaf::MobileNetV2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub const CLASSES: [&str; 4] = ["Apple___scab", "Corn___rust", "Grape___healthy", "Tomato___blight"];

    /// A ready state with a small random model taking 32×32 inputs.
    pub fn ready() -> AppState {
        let mut rng = StdRng::seed_from_u64(17);
        let backbone = MobileNetV2::random(0.1, &mut rng);
        let classifier = Classifier::new(backbone, CLASSES.len(), 0.2, 32, &mut rng);
        let labels = LabelMap::new(CLASSES.iter().map(|c| c.to_string()).collect());
        AppState { config: ServerConfig::default(), model: ModelState::Ready { classifier, labels } }
    }

    pub fn not_loaded() -> AppState {
        AppState {
            config: ServerConfig::default(),
            model: ModelState::LoadFailed { reason: "no model".into() },
        }
    }
}
