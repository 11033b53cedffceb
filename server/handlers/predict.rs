use std::io::Read;

use thiserror::Error;
use tiny_http::Request;
use tracing::warn;

use ferrite_leaf::{preprocess_image, top_k, Classifier, LabelMap, PredictionResponse, PreprocessError, TOP_K};

use crate::routes::{request_header, ApiResponse};
use crate::state::{AppState, ModelState};
use crate::util::multipart::{extract_boundary, extract_file};

/// Multipart field expected to carry the image.
pub const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no image file in upload")]
    MissingFile,
    #[error("upload exceeds the {limit}-byte limit")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(#[from] std::io::Error),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("model produced no predictions")]
    NoPredictions,
}

fn not_loaded() -> ApiResponse {
    ApiResponse::error(503, "Model not loaded")
}

fn failed(err: UploadError) -> ApiResponse {
    warn!(error = %err, "prediction failed");
    ApiResponse::error(400, format!("Prediction failed: {err}"))
}

// ---------------------------------------------------------------------------
// POST /predict
// ---------------------------------------------------------------------------

/// Reads the upload (bounded by the configured limit) and classifies it.
/// Without a model the body is never read.
pub fn handle(request: &mut Request, state: &AppState) -> ApiResponse {
    if !state.model.is_ready() {
        return not_loaded();
    }
    let content_type = request_header(request, "Content-Type").unwrap_or_default();
    let declared = request.body_length();
    match read_body(request.as_reader(), declared, state.config.max_upload_bytes) {
        Ok(body) => predict_upload(state, &content_type, &body),
        Err(err) => failed(err),
    }
}

/// Reads at most `limit` bytes, refusing larger bodies up front when the
/// client declared its length.
pub fn read_body<R: Read>(reader: R, declared: Option<usize>, limit: usize) -> Result<Vec<u8>, UploadError> {
    if declared.is_some_and(|n| n > limit) {
        return Err(UploadError::TooLarge { limit });
    }
    let mut body = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut body)?;
    if body.len() > limit {
        return Err(UploadError::TooLarge { limit });
    }
    Ok(body)
}

/// Classifies the image carried by a multipart body.
pub fn predict_upload(state: &AppState, content_type: &str, body: &[u8]) -> ApiResponse {
    let ModelState::Ready { classifier, labels } = &state.model else {
        return not_loaded();
    };
    let response = match classify(classifier, labels, content_type, body) {
        Ok(response) => response,
        Err(err) => return failed(err),
    };
    match serde_json::to_value(&response) {
        Ok(body) => ApiResponse::ok(body),
        Err(e) => ApiResponse::error(500, format!("Prediction failed: {e}")),
    }
}

fn classify(
    classifier: &Classifier,
    labels: &LabelMap,
    content_type: &str,
    body: &[u8],
) -> Result<PredictionResponse, UploadError> {
    let boundary = extract_boundary(content_type).ok_or(UploadError::MissingFile)?;
    let image = extract_file(body, &boundary, FILE_FIELD).ok_or(UploadError::MissingFile)?;
    let batch = preprocess_image(&image, classifier.image_size)?;
    let probabilities = classifier.predict_proba(&batch);
    PredictionResponse::new(top_k(probabilities.row(0), labels, TOP_K)).ok_or(UploadError::NoPredictions)
}
