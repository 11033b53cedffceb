use serde_json::json;

use crate::routes::ApiResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Always 200; reports whether the model is available.
pub fn handle(state: &AppState) -> ApiResponse {
    ApiResponse::ok(json!({
        "status": "healthy",
        "model_loaded": state.model.is_ready(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures;

    #[test]
    fn healthy_with_or_without_a_model() {
        let up = handle(&fixtures::ready());
        assert_eq!(up.status, 200);
        assert_eq!(up.body, json!({"status": "healthy", "model_loaded": true}));

        let down = handle(&fixtures::not_loaded());
        assert_eq!(down.status, 200);
        assert_eq!(down.body["model_loaded"], false);
    }
}
