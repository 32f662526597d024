use serde::{Deserialize, Serialize};

use crate::api::{FontFormat, FontWeight};
use crate::config::ProgressConfig;

use super::job::{JobSnapshot, JobState};

/// Pipeline stages the server reports through `available_formats`, in order.
///
/// Markers the client does not recognise (for example `better-prompt`)
/// earn no credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    BaseImage,
    GridGlyphs,
    MissingGlyphs,
    FontFiles,
}

impl PipelineStage {
    pub const SEQUENCE: [PipelineStage; 4] = [
        PipelineStage::BaseImage,
        PipelineStage::GridGlyphs,
        PipelineStage::MissingGlyphs,
        PipelineStage::FontFiles,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Any `{weight}-{format}` marker counts as the font-file stage.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "base-image" => Some(PipelineStage::BaseImage),
            "grid-glyphs" => Some(PipelineStage::GridGlyphs),
            "missing-glyphs" => Some(PipelineStage::MissingGlyphs),
            other => {
                let (weight, format) = other.split_once('-')?;
                weight.parse::<FontWeight>().ok()?;
                format.parse::<FontFormat>().ok()?;
                Some(PipelineStage::FontFiles)
            }
        }
    }
}

/// Furthest stage present in `markers`, regardless of arrival order.
pub fn last_reached_stage(markers: &[String]) -> Option<PipelineStage> {
    markers
        .iter()
        .filter_map(|m| PipelineStage::from_marker(m))
        .max()
}

/// `min(cap, initial + (index_of_last_reached_stage + 1) * credit)`, or
/// `initial` when no known stage was reached.
pub fn stage_progress(markers: &[String], config: &ProgressConfig) -> u8 {
    let cap = config.in_flight_cap();
    match last_reached_stage(markers) {
        Some(stage) => {
            let credit = (stage.index() as u32 + 1) * u32::from(config.stage_credit);
            (u32::from(config.initial) + credit).min(u32::from(cap)) as u8
        }
        None => config.initial.min(cap),
    }
}

/// Raw progress estimate for one job. Never regresses while in flight and
/// reaches 100 only on completion.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    raw: u8,
    config: ProgressConfig,
}

impl ProgressEstimator {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            raw: config.initial.min(config.in_flight_cap()),
            config,
        }
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn observe(&mut self, snapshot: &JobSnapshot) -> u8 {
        if snapshot.state == JobState::Completed {
            self.raw = 100;
            return self.raw;
        }

        let cap = self.config.in_flight_cap();
        let candidate = match &snapshot.stage_markers {
            Some(markers) => stage_progress(markers, &self.config),
            None => self.raw.saturating_add(self.config.fallback_step).min(cap),
        };
        self.raw = self.raw.max(candidate);
        self.raw
    }
}

/// Displayed progress that walks toward the raw estimate one step per tick.
#[derive(Debug, Clone)]
pub struct ProgressSmoother {
    displayed: u8,
    step: u8,
}

impl ProgressSmoother {
    pub fn new(start: u8, step: u8) -> Self {
        Self {
            displayed: start.min(100),
            step: step.max(1),
        }
    }

    pub fn displayed(&self) -> u8 {
        self.displayed
    }

    pub fn tick(&mut self, target: u8) -> u8 {
        if self.displayed < target {
            self.displayed = self.displayed.saturating_add(self.step).min(target);
        }
        self.displayed
    }

    pub fn complete(&mut self) -> u8 {
        self.displayed = 100;
        self.displayed
    }
}

/// Time-based progress for the regeneration poll loop, which gets no
/// stage markers from the server.
#[derive(Debug, Clone)]
pub struct SyntheticProgress {
    value: u8,
    step: u8,
    cap: u8,
}

impl SyntheticProgress {
    pub fn new(config: &ProgressConfig) -> Self {
        let cap = config.regen_cap.min(99);
        Self {
            value: config.regen_start.min(cap),
            step: config.regen_step,
            cap,
        }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn tick(&mut self) -> u8 {
        self.value = self.value.saturating_add(self.step).min(self.cap);
        self.value
    }
}
