// SPDX-License-Identifier: GPL-3.0-only

//! Ordered record of acquired GPU resources
//!
//! Construction records each stage as it succeeds. Teardown walks the record
//! backwards and releases every stage even when an earlier release fails.

use std::fmt;
use tracing::{debug, warn};

/// Resource acquired while building a compute context, in acquisition order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Open handle on the DRM node
    Device,
    /// Instance and adapter bound to that node
    Display,
    /// Logical device and queue
    Context,
    /// Compiled conversion pipeline
    Program,
    /// Input, output and parameter buffers
    Buffers,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Device => "device",
            Stage::Display => "display",
            Stage::Context => "context",
            Stage::Program => "program",
            Stage::Buffers => "buffers",
        };
        f.write_str(name)
    }
}

/// Releases one stage's resources
pub trait StageRelease {
    fn release(&mut self, stage: Stage) -> Result<(), String>;
}

/// A release step that reported an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct AcquisitionLog {
    stages: Vec<Stage>,
}

impl AcquisitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage) {
        debug!(%stage, "Acquired");
        self.stages.push(stage);
    }

    pub fn acquired(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Release all recorded stages, newest first.
    ///
    /// Failures are logged and collected; they never stop later stages from
    /// being released. The log is empty afterwards, so a second call is a no-op.
    pub fn unwind(&mut self, releaser: &mut impl StageRelease) -> Vec<ReleaseFailure> {
        let mut failures = Vec::new();
        while let Some(stage) = self.stages.pop() {
            match releaser.release(stage) {
                Ok(()) => debug!(%stage, "Released"),
                Err(reason) => {
                    warn!(%stage, error = %reason, "Release failed, continuing teardown");
                    failures.push(ReleaseFailure { stage, reason });
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<Stage>);

    impl StageRelease for Recorder {
        fn release(&mut self, stage: Stage) -> Result<(), String> {
            self.0.push(stage);
            Ok(())
        }
    }

    #[test]
    fn test_unwind_is_reverse_and_single_shot() {
        let mut log = AcquisitionLog::new();
        log.record(Stage::Device);
        log.record(Stage::Display);
        log.record(Stage::Context);

        let mut recorder = Recorder(Vec::new());
        assert!(log.unwind(&mut recorder).is_empty());
        assert_eq!(recorder.0, [Stage::Context, Stage::Display, Stage::Device]);

        assert!(log.is_empty());
        log.unwind(&mut recorder);
        assert_eq!(recorder.0.len(), 3);
    }
}
