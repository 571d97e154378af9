//! HTTP surface for remote evaluation runs: `GET /list`, `POST /eval`
//! (JSON or Server-Sent Events), CORS and header-based auth.

pub mod auth;
pub mod config;
pub mod cors;
pub mod demo;
pub mod handlers;
pub mod routes;
pub mod sse;

pub use auth::AuthContext;
pub use config::{init_tracing, LogFormat, ServerConfig};
pub use cors::CorsPolicy;
pub use handlers::{
	prepare_request, run_eval, run_eval_streaming, EvalRequest, HandlerError, HttpSessionFactory, PreparedRequest,
	SessionFactory,
};
pub use routes::{router, AppState};
pub use sse::{serialize_event, BufferedSse, EventSink, SseBody, SseStream};
