//! ferrite-leaf inference server
//!
//! Serves the trained leaf-disease classifier over HTTP. Served by a
//! synchronous tiny_http server, one thread per request.
//!
//! Run with:
//!   cargo run --bin server --release
//!
//! Routes:
//!   GET  /health  : liveness plus whether the model is loaded
//!   POST /predict : multipart image upload, returns the top 3 classes

mod handlers;
mod routes;
mod state;
mod util;

use std::sync::Arc;

use anyhow::anyhow;
use tiny_http::Server;
use tracing::{info, warn};

use ferrite_leaf::{logging, ServerConfig};
use state::{AppState, ModelState, SharedState};

fn main() -> anyhow::Result<()> {
    logging::init();

    // The model is loaded before the first request and shared read-only.
    let shared_state: SharedState = Arc::new(AppState::load(ServerConfig::default()));

    if let ModelState::LoadFailed { reason } = &shared_state.model {
        warn!(reason = %reason, "serving without a model; /predict will answer 503");
    }

    let addr = shared_state.config.bind.as_str();
    let server = Server::http(addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
    info!(addr, model_loaded = shared_state.model.is_ready(), "listening");

    for request in server.incoming_requests() {
        let state_clone = Arc::clone(&shared_state);
        std::thread::spawn(move || {
            routes::dispatch(request, state_clone);
        });
    }
    Ok(())
}
