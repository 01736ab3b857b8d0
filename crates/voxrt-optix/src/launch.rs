use std::time::Instant;

use tracing::{error, info, trace_span};

use crate::{
    bridge::OutputSurface,
    device::Device,
    error::{SceneError, SceneResult},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GraphState {
    /// Structure changed since the last validation
    #[default]
    Unvalidated,
    /// Validated and compiled; launches are allowed
    Ready,
}

/// Validate/compile bookkeeping and the launch itself
#[derive(Debug, Default)]
pub struct LaunchController {
    state: GraphState,
    launches: u64,
}

impl LaunchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    /// Any structural edit lands here
    pub fn invalidate(&mut self) {
        self.state = GraphState::Unvalidated;
    }

    pub fn validate<D: Device + ?Sized>(&mut self, device: &mut D) -> SceneResult<()> {
        let t = Instant::now();
        self.state = GraphState::Unvalidated;

        device.validate().map_err(|e| {
            error!("scene validation failed: {e}");
            SceneError::Validation(e)
        })?;
        device.compile().map_err(|e| {
            error!("scene compilation failed: {e}");
            SceneError::Validation(e)
        })?;

        self.state = GraphState::Ready;
        info!("validate: {:.2}s", t.elapsed().as_secs_f64());
        Ok(())
    }

    /// One dispatch over the whole output surface through entry point 0.
    /// Blocks until the device has drained.
    pub fn launch<D: Device + ?Sized>(&mut self, device: &mut D, surface: &OutputSurface) -> SceneResult<()> {
        if self.state != GraphState::Ready {
            error!("launch requested on an unvalidated scene");
            return Err(SceneError::NotValidated);
        }

        let desc = device.buffer_desc(surface.buffer()).map_err(SceneError::Launch)?;
        let span = trace_span!("launch", frame = self.launches, width = desc.width, height = desc.height);
        let _enter = span.enter();

        let launched = device
            .launch(0, desc.width, desc.height)
            .and_then(|()| device.synchronize());
        if let Err(e) = launched {
            error!("launch failed: {e}");
            return Err(SceneError::Launch(e));
        }

        self.launches += 1;
        Ok(())
    }
}
