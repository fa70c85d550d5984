// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for ordered resource release

use gpucap::gpu::lifecycle::{AcquisitionLog, ReleaseFailure, Stage, StageRelease};

/// Records release order, failing on the configured stages
struct ScriptedRelease {
    released: Vec<Stage>,
    failing: Vec<Stage>,
}

impl ScriptedRelease {
    fn failing(stages: &[Stage]) -> Self {
        Self {
            released: Vec::new(),
            failing: stages.to_vec(),
        }
    }
}

impl StageRelease for ScriptedRelease {
    fn release(&mut self, stage: Stage) -> Result<(), String> {
        self.released.push(stage);
        if self.failing.contains(&stage) {
            Err(format!("simulated {} failure", stage))
        } else {
            Ok(())
        }
    }
}

fn full_log() -> AcquisitionLog {
    let mut log = AcquisitionLog::new();
    for stage in [
        Stage::Device,
        Stage::Display,
        Stage::Context,
        Stage::Program,
        Stage::Buffers,
    ] {
        log.record(stage);
    }
    log
}

#[test]
fn test_teardown_order() {
    let mut log = full_log();
    let mut releaser = ScriptedRelease::failing(&[]);
    assert!(log.unwind(&mut releaser).is_empty());
    assert_eq!(
        releaser.released,
        [
            Stage::Buffers,
            Stage::Program,
            Stage::Context,
            Stage::Display,
            Stage::Device
        ]
    );
}

#[test]
fn test_teardown_continues_after_failure() {
    for failing in [Stage::Program, Stage::Context, Stage::Display] {
        let mut log = full_log();
        let mut releaser = ScriptedRelease::failing(&[failing]);
        let failures = log.unwind(&mut releaser);

        assert_eq!(releaser.released.len(), 5, "stopped after {} failed", failing);
        assert_eq!(releaser.released.last(), Some(&Stage::Device));
        assert_eq!(
            failures,
            vec![ReleaseFailure {
                stage: failing,
                reason: format!("simulated {} failure", failing),
            }]
        );
        assert!(log.is_empty());
    }
}

#[test]
fn test_every_release_failing_still_visits_all() {
    let mut log = full_log();
    let all = log.acquired().to_vec();
    let mut releaser = ScriptedRelease::failing(&all);
    let failures = log.unwind(&mut releaser);
    assert_eq!(failures.len(), 5);
    assert_eq!(releaser.released.len(), 5);
}

#[test]
fn test_partial_construction_releases_only_acquired() {
    // Context creation failed: only the device and display were acquired
    let mut log = AcquisitionLog::new();
    log.record(Stage::Device);
    log.record(Stage::Display);

    let mut releaser = ScriptedRelease::failing(&[]);
    log.unwind(&mut releaser);
    assert_eq!(releaser.released, [Stage::Display, Stage::Device]);
}
