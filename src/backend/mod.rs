//! Execution/timing backends.
//!
//! Stage work is enqueued on a stream and bracketed by timing events. The
//! elapsed time between two events is only read once the later event has
//! completed. The CPU backend runs work synchronously and stamps events from
//! a [`HostClock`]; the CUDA backend (feature `cuda`) records driver events on
//! a primary and a projection stream.

mod clock;
mod cpu;
#[cfg(feature = "cuda")]
mod cuda;

pub use clock::{HostClock, ManualClock, SystemClock};
pub use cpu::{CpuBackend, HostEvent};
#[cfg(feature = "cuda")]
pub use cuda::{CudaBackend, CudaTimingEvent};

use crate::error::Result;
use serde::Serialize;

/// Streams the pipeline issues work on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    Primary,
    Projection,
}

/// Timed pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Voxelize,
    Schedule,
    Filtering,
    Backbone3d,
    Backbone2d,
    HeadPre,
    HeadPost,
    Projection,
    Fusion,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Voxelize => "voxelize",
            Stage::Schedule => "schedule",
            Stage::Filtering => "filtering",
            Stage::Backbone3d => "bb3d",
            Stage::Backbone2d => "bb2d",
            Stage::HeadPre => "head_pre",
            Stage::HeadPost => "head_post",
            Stage::Projection => "projection",
            Stage::Fusion => "fusion",
        }
    }
}

/// Start/end events of one enqueued stage.
#[derive(Debug)]
pub struct StageSpan<E> {
    pub stage: Stage,
    pub stream: Stream,
    pub start: E,
    pub end: E,
}

/// Capability interface over an asynchronous execution provider.
pub trait InferenceBackend: Sync {
    type Event: Send;

    /// Record a timing event at the current tail of `stream`.
    fn record(&self, stream: Stream) -> Result<Self::Event>;

    /// Block the host until all work on `stream` has finished.
    fn synchronize(&self, stream: Stream) -> Result<()>;

    /// Milliseconds between two completed events of the same stream.
    fn elapsed_ms(&self, start: &Self::Event, end: &Self::Event) -> Result<f64>;

    /// Host clock that deadlines refer to.
    fn now_sec(&self) -> f64;

    /// Enqueue `work` on `stream` bracketed by timing events.
    fn enqueue<T, F>(
        &self,
        stage: Stage,
        stream: Stream,
        work: F,
    ) -> Result<(T, StageSpan<Self::Event>)>
    where
        F: FnOnce() -> Result<T>,
    {
        let start = self.record(stream)?;
        let out = work()?;
        let end = self.record(stream)?;
        Ok((
            out,
            StageSpan {
                stage,
                stream,
                start,
                end,
            },
        ))
    }

    /// Elapsed milliseconds of a finished span.
    fn span_ms(&self, span: &StageSpan<Self::Event>) -> Result<f64> {
        self.elapsed_ms(&span.start, &span.end)
    }
}
