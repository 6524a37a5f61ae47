//! Progress reporting.
//!
//! Sinks compose: a sub-operation reports against its own local range and a
//! chain of adapters maps that onto its slice of the parent's range.

pub mod composite;
pub mod event;
pub mod indicator;
pub mod logging;
pub mod reader;
pub mod scaling;
pub mod sink;
pub mod stateful;
pub mod step;

pub use composite::CompositeProgressSink;
pub use event::TaskProgressEvent;
pub use indicator::{TaskProgressAdapter, TaskProgressIndicator, TaskProgressListener};
pub use logging::TimeBasedLogSink;
pub use reader::{format_size, ProgressReader};
pub use scaling::{create_percentage_sinks_for_range, ScalingTaskProgressSink};
pub use sink::{null_sink, FnProgressSink, NullProgressSink, SharedProgressSink, TaskProgressSink};
pub use stateful::StatefulTaskProgressSink;
pub use step::StepTaskProgressSink;
