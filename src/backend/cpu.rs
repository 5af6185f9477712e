use super::{HostClock, InferenceBackend, Stream, SystemClock};
use crate::error::{AnytimeError, Result};

/// Synchronous backend: work runs inline, events are host-clock stamps.
#[derive(Clone, Debug, Default)]
pub struct CpuBackend<C = SystemClock> {
    clock: C,
}

impl<C: HostClock> CpuBackend<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Host timestamp in seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct HostEvent(pub f64);

impl<C: HostClock> InferenceBackend for CpuBackend<C> {
    type Event = HostEvent;

    fn record(&self, _stream: Stream) -> Result<HostEvent> {
        Ok(HostEvent(self.clock.now_sec()))
    }

    fn synchronize(&self, _stream: Stream) -> Result<()> {
        Ok(())
    }

    fn elapsed_ms(&self, start: &HostEvent, end: &HostEvent) -> Result<f64> {
        let ms = (end.0 - start.0) * 1000.0;
        if ms < 0.0 {
            return Err(AnytimeError::backend(format!(
                "end event precedes start by {:.3} ms",
                -ms
            )));
        }
        Ok(ms)
    }

    fn now_sec(&self) -> f64 {
        self.clock.now_sec()
    }
}
