//! Server-Sent Events framing and the producer/consumer hand-off used by
//! streaming runs.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Formats one SSE frame.
///
/// `null`, `""`, `{}` and `[]` produce an empty data line; single-line strings
/// are sent raw; everything else, including strings with line breaks, is
/// JSON-encoded so a frame always carries exactly one `data:` line.
pub fn serialize_event(event_type: &str, data: &Value) -> String {
	format!("event: {event_type}\ndata: {}\n\n", payload(data))
}

fn payload(data: &Value) -> String {
	match data {
		Value::Null => String::new(),
		Value::String(s) if !s.contains(['\n', '\r']) => s.clone(),
		Value::Object(map) if map.is_empty() => String::new(),
		Value::Array(items) if items.is_empty() => String::new(),
		other => other.to_string(),
	}
}

/// Where a streaming run writes its events.
#[async_trait]
pub trait EventSink: Send + Sync {
	async fn push(&self, event_type: &str, data: &Value);

	/// Signals that no further events follow.
	async fn close(&self);
}

enum Frame {
	Event(String),
	Done,
}

/// Producer half of [`channel`].
pub struct SseStream {
	tx: mpsc::Sender<Frame>,
	closed: AtomicBool,
}

/// Consumer half of [`channel`]; yields frames until the producer closes.
pub struct SseBody {
	rx: mpsc::Receiver<Frame>,
	done: bool,
}

/// Bounded hand-off between a run and the response body. Pushes wait when
/// `capacity` frames are queued.
pub fn channel(capacity: usize) -> (SseStream, SseBody) {
	let (tx, rx) = mpsc::channel(capacity.max(1));
	(
		SseStream {
			tx,
			closed: AtomicBool::new(false),
		},
		SseBody { rx, done: false },
	)
}

#[async_trait]
impl EventSink for SseStream {
	async fn push(&self, event_type: &str, data: &Value) {
		if self.closed.load(Ordering::Acquire) {
			return;
		}
		if self.tx.send(Frame::Event(serialize_event(event_type, data))).await.is_err() {
			debug!(event_type, "Client went away; dropping SSE event");
		}
	}

	async fn close(&self) {
		if !self.closed.swap(true, Ordering::AcqRel) {
			if self.tx.send(Frame::Done).await.is_err() {
				debug!("Client went away before the stream closed");
			}
		}
	}
}

impl Stream for SseBody {
	type Item = Result<String, Infallible>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if self.done {
			return Poll::Ready(None);
		}
		match self.rx.poll_recv(cx) {
			Poll::Ready(Some(Frame::Event(frame))) => Poll::Ready(Some(Ok(frame))),
			Poll::Ready(Some(Frame::Done)) | Poll::Ready(None) => {
				self.done = true;
				Poll::Ready(None)
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Collects frames in memory; `into_string` returns the full body.
#[derive(Debug, Default)]
pub struct BufferedSse {
	frames: Mutex<Vec<String>>,
	closed: AtomicBool,
}

impl BufferedSse {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn frames(&self) -> Vec<String> {
		self.frames.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	pub fn into_string(self) -> String {
		self.frames.into_inner().unwrap_or_else(PoisonError::into_inner).concat()
	}
}

#[async_trait]
impl EventSink for BufferedSse {
	async fn push(&self, event_type: &str, data: &Value) {
		if self.is_closed() {
			return;
		}
		self.frames
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(serialize_event(event_type, data));
	}

	async fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}
}

/// A parsed SSE frame, for tests and clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
	pub event: String,
	pub data: String,
}

/// Splits an SSE body back into frames.
pub fn parse_events(body: &str) -> Vec<ParsedEvent> {
	body.split("\n\n")
		.filter(|chunk| !chunk.trim().is_empty())
		.map(|chunk| {
			let mut event = String::new();
			let mut data = Vec::new();
			for line in chunk.lines() {
				if let Some(rest) = line.strip_prefix("event: ") {
					event = rest.to_string();
				} else if let Some(rest) = line.strip_prefix("data: ") {
					data.push(rest);
				} else if line == "data:" {
					data.push("");
				}
			}
			ParsedEvent {
				event,
				data: data.join("\n"),
			}
		})
		.collect()
}
