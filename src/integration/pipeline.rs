//! TrackerPipeline for combining segmentation with tracking.

use thiserror::Error;
use tracing::warn;

use crate::tracker::{
    ConfigError, FrameError, LaneDirectionProvider, ObjectTracker, TrackedObject, TrackerConfig,
    TrackerOptions,
};

use super::DetectionSource;

/// Failure while pulling or tracking one frame.
#[derive(Debug, Error)]
pub enum PipelineError<E> {
    #[error("detection source failed: {0}")]
    Source(E),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Feeds every frame of a [`DetectionSource`] to an [`ObjectTracker`].
pub struct TrackerPipeline<'a, D: DetectionSource> {
    source: D,
    tracker: ObjectTracker,
    lane_directions: Option<&'a dyn LaneDirectionProvider>,
}

impl<'a, D: DetectionSource> TrackerPipeline<'a, D> {
    pub fn new(source: D, config: TrackerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            source,
            tracker: ObjectTracker::new(config)?,
            lane_directions: None,
        })
    }

    pub fn with_default_config(source: D) -> Result<Self, ConfigError> {
        Self::new(source, TrackerConfig::default())
    }

    /// Consult `provider` for lane directions on every frame.
    pub fn with_lane_directions(mut self, provider: &'a dyn LaneDirectionProvider) -> Self {
        self.lane_directions = Some(provider);
        self
    }

    /// Track the next frame of the source.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    pub fn process_next_frame(
        &mut self,
    ) -> Result<Option<Vec<TrackedObject>>, PipelineError<D::Error>> {
        let Some(frame) = self.source.next_frame().map_err(PipelineError::Source)? else {
            return Ok(None);
        };
        let options = TrackerOptions {
            sensor_to_world: frame.sensor_to_world,
            lane_directions: self.lane_directions,
        };
        let objects = self
            .tracker
            .track(&frame.detections, frame.timestamp, &options)?;
        Ok(Some(objects))
    }

    /// Drain the source, collecting the tracker output of every frame.
    ///
    /// Rejected frames are skipped and contribute nothing; source errors abort.
    pub fn run_to_end(&mut self) -> Result<Vec<Vec<TrackedObject>>, D::Error> {
        let mut outputs = Vec::new();
        loop {
            match self.process_next_frame() {
                Ok(Some(objects)) => outputs.push(objects),
                Ok(None) => return Ok(outputs),
                Err(PipelineError::Frame(err)) => warn!(%err, "skipping frame"),
                Err(PipelineError::Source(err)) => return Err(err),
            }
        }
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut D {
        &mut self.source
    }

    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }
}
