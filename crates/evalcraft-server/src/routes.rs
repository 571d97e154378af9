use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use evalcraft_core::EvaluatorRegistry;
use tracing::debug;

use crate::auth::AuthContext;
use crate::cors::CorsPolicy;
use crate::handlers::{prepare_request, run_eval, run_eval_streaming, HandlerError, SessionFactory};
use crate::sse;

/// Frames buffered between a streaming run and the response body.
const SSE_BUFFER: usize = 128;

#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<EvaluatorRegistry>,
	pub sessions: Arc<dyn SessionFactory>,
	pub cors: Arc<CorsPolicy>,
}

pub fn router(state: AppState) -> Router {
	let cors = state.cors.clone();
	Router::new()
		.route("/", get(health))
		.route("/list", get(list))
		.route("/eval", axum::routing::post(eval))
		.fallback(fallback)
		.with_state(state)
		.layer(middleware::from_fn_with_state(cors, apply_cors))
}

/// Answers preflights directly and stamps CORS headers on every response.
async fn apply_cors(State(cors): State<Arc<CorsPolicy>>, request: Request, next: Next) -> Response {
	let origin = request.headers().get(ORIGIN).cloned();
	let mut response = if request.method() == Method::OPTIONS {
		StatusCode::NO_CONTENT.into_response()
	} else {
		next.run(request).await
	};
	cors.apply(origin.as_ref(), response.headers_mut());
	response
}

async fn health() -> &'static str {
	"Hello, world!"
}

async fn fallback() -> HandlerError {
	HandlerError::new(StatusCode::NOT_FOUND, "Not found")
}

async fn list(State(state): State<AppState>, headers: HeaderMap) -> Response {
	if !AuthContext::from_headers(&headers).is_authenticated() {
		return HandlerError::unauthorized().into_response();
	}
	Json(state.registry.describe()).into_response()
}

async fn eval(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
	let auth = AuthContext::from_headers(&headers);
	let prepared = match prepare_request(&auth, &body) {
		Ok(prepared) => prepared,
		Err(e) => return e.into_response(),
	};
	let session = state.sessions.session(&auth);

	if !prepared.stream {
		return match run_eval(&state.registry, session, prepared.request).await {
			Ok(summary) => Json(summary).into_response(),
			Err(e) => e.into_response(),
		};
	}

	let (stream, body) = sse::channel(SSE_BUFFER);
	let registry = state.registry.clone();
	tokio::spawn(async move {
		run_eval_streaming(&registry, session, prepared.request, Arc::new(stream)).await;
		debug!("Streaming run finished");
	});
	(
		[
			(CONTENT_TYPE, "text/event-stream; charset=utf-8"),
			(CACHE_CONTROL, "no-cache"),
			(CONNECTION, "keep-alive"),
		],
		Body::from_stream(body),
	)
		.into_response()
}
