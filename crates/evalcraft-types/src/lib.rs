//! Value and wire types shared by the evalcraft engine and server.

mod case;
mod progress;
mod prompt;
mod span;
mod summary;

pub use case::{json_type_name, EvalCase, InvalidRow, Row, XACT_ID_KEY};
pub use progress::{ProgressEvent, ProgressKind, ProgressObjectType};
pub use prompt::{Prompt, PromptMessage};
pub use span::{ParentDescriptor, PropagatedEvent, RowIds, SpanEvent, SpanMetrics, SpanOrigin, SpanRoute};
pub use summary::{CaseResult, ScoreRecord, ScoreSummary, Summary};
