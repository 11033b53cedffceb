use std::io::Cursor;

use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::info;

use crate::handlers;
use crate::state::SharedState;

pub type HttpResponse = Response<Cursor<Vec<u8>>>;

/// Status code plus JSON body, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> ApiResponse {
        ApiResponse { status: 200, body }
    }

    /// `{"detail": ...}` error body.
    pub fn error(status: u16, detail: impl Into<String>) -> ApiResponse {
        ApiResponse { status, body: json!({ "detail": detail.into() }) }
    }
}

/// Method and headers a browser announced in a CORS preflight.
#[derive(Debug, Default)]
pub struct Preflight {
    pub method: Option<String>,
    pub headers: Option<String>,
}

const ALL_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

pub fn request_header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_owned())
}

/// Headers granting the configured origin credentialed access. Nothing is
/// granted to any other origin. A preflight gets the requested method and
/// headers echoed back, since every method and header is allowed.
pub fn cors_headers(allowed_origin: &str, origin: Option<&str>, preflight: Option<&Preflight>) -> Vec<Header> {
    let mut pairs: Vec<(&str, String)> = vec![("Vary", "Origin".to_owned())];
    if origin == Some(allowed_origin) {
        pairs.push(("Access-Control-Allow-Origin", allowed_origin.to_owned()));
        pairs.push(("Access-Control-Allow-Credentials", "true".to_owned()));
        if let Some(pre) = preflight {
            let methods = pre.method.clone().unwrap_or_else(|| ALL_METHODS.to_owned());
            pairs.push(("Access-Control-Allow-Methods", methods));
            if let Some(headers) = &pre.headers {
                pairs.push(("Access-Control-Allow-Headers", headers.clone()));
            }
            pairs.push(("Access-Control-Max-Age", "600".to_owned()));
        }
    }
    pairs.into_iter().filter_map(|(name, value)| header(name, &value)).collect()
}

pub fn json_response(api: ApiResponse, mut headers: Vec<Header>) -> HttpResponse {
    let bytes = api.body.to_string().into_bytes();
    let len = bytes.len();
    headers.extend(header("Content-Type", "application/json"));
    Response::new(StatusCode(api.status), headers, Cursor::new(bytes), Some(len), None)
}

pub fn text_response(status: u16, body: &str, mut headers: Vec<Header>) -> HttpResponse {
    let bytes = body.as_bytes().to_vec();
    let len = bytes.len();
    headers.extend(header("Content-Type", "text/plain; charset=utf-8"));
    Response::new(StatusCode(status), headers, Cursor::new(bytes), Some(len), None)
}

pub fn not_found() -> ApiResponse {
    ApiResponse::error(404, "Not Found")
}

fn method_not_allowed() -> ApiResponse {
    ApiResponse::error(405, "Method Not Allowed")
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// What a (method, path) pair resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Health,
    Predict,
    MethodNotAllowed,
    NotFound,
}

pub fn route(method: &Method, path: &str) -> Route {
    match (method, path) {
        (Method::Options, _) => Route::Preflight,
        (Method::Get, "/health") => Route::Health,
        (Method::Post, "/predict") => Route::Predict,
        (_, "/health") | (_, "/predict") => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

/// Builds the response for one request. Every response carries the CORS
/// headers for the configured origin.
pub fn respond_to(request: &mut Request, state: &SharedState) -> HttpResponse {
    let path = request.url().split('?').next().unwrap_or_default().to_owned();
    let origin = request_header(request, "Origin");
    let allowed_origin = state.config.allowed_origin.as_str();

    let api = match route(request.method(), &path) {
        Route::Preflight => {
            let preflight = Preflight {
                method: request_header(request, "Access-Control-Request-Method"),
                headers: request_header(request, "Access-Control-Request-Headers"),
            };
            return text_response(200, "OK", cors_headers(allowed_origin, origin.as_deref(), Some(&preflight)));
        }
        Route::Health => handlers::health::handle(state),
        Route::Predict => handlers::predict::handle(request, state),
        Route::MethodNotAllowed => method_not_allowed(),
        Route::NotFound => not_found(),
    };
    json_response(api, cors_headers(allowed_origin, origin.as_deref(), None))
}

/// Routes one request, logs it and sends the response.
pub fn dispatch(mut request: Request, state: SharedState) {
    let response = respond_to(&mut request, &state);
    info!(
        method = %request.method(),
        path = %request.url(),
        status = response.status_code().0,
        "request"
    );
    let _ = request.respond(response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures;
    use std::io::Read;
    use std::sync::Arc;
    use tiny_http::TestRequest;

    const ORIGIN: &str = "http://localhost:3000";

    fn find<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    #[test]
    fn allowed_origin_gets_credentialed_access() {
        let headers = cors_headers(ORIGIN, Some(ORIGIN), None);
        assert_eq!(find(&headers, "Access-Control-Allow-Origin"), Some(ORIGIN));
        assert_eq!(find(&headers, "Access-Control-Allow-Credentials"), Some("true"));
        assert_eq!(find(&headers, "Access-Control-Allow-Methods"), None);
    }

    #[test]
    fn other_origins_get_nothing() {
        let headers = cors_headers(ORIGIN, Some("http://evil.example"), None);
        assert_eq!(find(&headers, "Access-Control-Allow-Origin"), None);
        assert_eq!(find(&headers, "Vary"), Some("Origin"));
    }

    #[test]
    fn preflight_echoes_the_requested_method_and_headers() {
        let pre = Preflight { method: Some("POST".into()), headers: Some("content-type, x-custom".into()) };
        let headers = cors_headers(ORIGIN, Some(ORIGIN), Some(&pre));
        assert_eq!(find(&headers, "Access-Control-Allow-Methods"), Some("POST"));
        assert_eq!(find(&headers, "Access-Control-Allow-Headers"), Some("content-type, x-custom"));
    }

    #[test]
    fn errors_use_the_detail_shape() {
        assert_eq!(not_found().body, json!({"detail": "Not Found"}));
        assert_eq!(not_found().status, 404);
        assert_eq!(method_not_allowed().body, json!({"detail": "Method Not Allowed"}));
    }

    #[test]
    fn routes_by_method_and_path() {
        assert_eq!(route(&Method::Get, "/health"), Route::Health);
        assert_eq!(route(&Method::Post, "/predict"), Route::Predict);
        assert_eq!(route(&Method::Options, "/anything"), Route::Preflight);
        assert_eq!(route(&Method::Post, "/health"), Route::MethodNotAllowed);
        assert_eq!(route(&Method::Get, "/predict"), Route::MethodNotAllowed);
        assert_eq!(route(&Method::Get, "/"), Route::NotFound);
        assert_eq!(route(&Method::Post, "/predict/extra"), Route::NotFound);
    }

    fn send(state: &SharedState, request: TestRequest) -> (u16, Vec<Header>, String) {
        let mut request: Request = request.into();
        let response = respond_to(&mut request, state);
        let status = response.status_code().0;
        let headers = response.headers().to_vec();
        let mut body = String::new();
        response.into_reader().read_to_string(&mut body).unwrap();
        (status, headers, body)
    }

    #[test]
    fn wrong_method_on_known_path_is_405() {
        let state = Arc::new(fixtures::not_loaded());
        let (status, headers, body) = send(&state, TestRequest::new().with_method(Method::Get).with_path("/predict"));
        assert_eq!(status, 405);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"detail": "Method Not Allowed"}));
        assert_eq!(find(&headers, "Vary"), Some("Origin"));
    }

    #[test]
    fn unknown_path_is_404_with_vary() {
        let state = Arc::new(fixtures::not_loaded());
        let (status, headers, body) = send(&state, TestRequest::new().with_method(Method::Get).with_path("/docs?x=1"));
        assert_eq!(status, 404);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"detail": "Not Found"}));
        assert_eq!(find(&headers, "Vary"), Some("Origin"));
        assert_eq!(find(&headers, "Access-Control-Allow-Origin"), None);
    }

    #[test]
    fn health_answers_the_allowed_origin() {
        let state = Arc::new(fixtures::not_loaded());
        let origin = Header::from_bytes(&b"Origin"[..], ORIGIN.as_bytes()).unwrap();
        let request = TestRequest::new().with_method(Method::Get).with_path("/health").with_header(origin);
        let (status, headers, body) = send(&state, request);
        assert_eq!(status, 200);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "healthy", "model_loaded": false}));
        assert_eq!(find(&headers, "Access-Control-Allow-Origin"), Some(ORIGIN));
        assert_eq!(find(&headers, "Vary"), Some("Origin"));
    }

    #[test]
    fn preflight_is_plain_ok() {
        let state = Arc::new(fixtures::not_loaded());
        let origin = Header::from_bytes(&b"Origin"[..], ORIGIN.as_bytes()).unwrap();
        let asked = Header::from_bytes(&b"Access-Control-Request-Method"[..], &b"POST"[..]).unwrap();
        let request = TestRequest::new()
            .with_method(Method::Options)
            .with_path("/predict")
            .with_header(origin)
            .with_header(asked);
        let (status, headers, body) = send(&state, request);
        assert_eq!((status, body.as_str()), (200, "OK"));
        assert_eq!(find(&headers, "Access-Control-Allow-Methods"), Some("POST"));
        assert_eq!(find(&headers, "Access-Control-Max-Age"), Some("600"));
        assert_eq!(find(&headers, "Vary"), Some("Origin"));
    }
}
