//! cudarc-backed timing backend: the device's default stream is the primary
//! stream, a forked stream carries projection work.

use super::{HostClock, InferenceBackend, Stream, SystemClock};
use crate::error::{AnytimeError, Result};
use cudarc::driver::{result, sys, CudaDevice, CudaStream, DriverError};
use std::sync::Arc;

fn driver_err(e: DriverError) -> AnytimeError {
    AnytimeError::backend(format!("{e:?}"))
}

/// Driver event owned by the backend, destroyed on drop.
#[derive(Debug)]
pub struct CudaTimingEvent(sys::CUevent);

// Event handles may be recorded and queried from any host thread.
unsafe impl Send for CudaTimingEvent {}

impl Drop for CudaTimingEvent {
    fn drop(&mut self) {
        unsafe {
            let _ = result::event::destroy(self.0);
        }
    }
}

pub struct CudaBackend {
    device: Arc<CudaDevice>,
    projection: CudaStream,
    clock: SystemClock,
}

// The projection stream handle is only used through driver calls.
unsafe impl Sync for CudaBackend {}

impl CudaBackend {
    pub fn new(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(driver_err)?;
        let projection = device.fork_default_stream().map_err(driver_err)?;
        Ok(Self {
            device,
            projection,
            clock: SystemClock,
        })
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Make the device context current on the calling thread. Stages run on
    /// scoped worker threads that start without a current context.
    fn bind(&self) -> Result<()> {
        self.device.bind_to_thread().map_err(driver_err)
    }

    fn handle(&self, stream: Stream) -> sys::CUstream {
        match stream {
            Stream::Primary => *self.device.cu_stream(),
            Stream::Projection => self.projection.stream,
        }
    }
}

impl InferenceBackend for CudaBackend {
    type Event = CudaTimingEvent;

    fn record(&self, stream: Stream) -> Result<CudaTimingEvent> {
        self.bind()?;
        let event =
            result::event::create(sys::CUevent_flags::CU_EVENT_DEFAULT).map_err(driver_err)?;
        unsafe { result::event::record(event, self.handle(stream)) }.map_err(driver_err)?;
        Ok(CudaTimingEvent(event))
    }

    fn synchronize(&self, stream: Stream) -> Result<()> {
        self.bind()?;
        unsafe { result::stream::synchronize(self.handle(stream)) }.map_err(driver_err)
    }

    fn elapsed_ms(&self, start: &CudaTimingEvent, end: &CudaTimingEvent) -> Result<f64> {
        self.bind()?;
        unsafe {
            result::event::synchronize(end.0).map_err(driver_err)?;
            result::event::elapsed(start.0, end.0)
                .map(|ms| ms as f64)
                .map_err(driver_err)
        }
    }

    fn now_sec(&self) -> f64 {
        self.clock.now_sec()
    }
}
