// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Convergence Detection
//!
//! Tracks the quality signal of an iterative-refinement (loop) run and decides
//! when to stop.
//!
//! The tracked quality is cumulative: each iteration's raw score is clamped to
//! `[0, 1]` and the running quality is `max(previous, raw)`. It therefore never
//! decreases, and `improvement_delta` is always `>= 0`.
//!
//! A run stops on the first of:
//!
//! | Condition | [`StopReason`] |
//! |-----------|----------------|
//! | `quality >= quality_target` | `QualityTarget` |
//! | `delta < improvement_threshold` on two consecutive iterations | `Plateau` |
//! | `iteration >= max_iterations` | `MaxIterations` |
//!
//! A failed iteration uses up one of the `max_iterations` attempts but adds
//! nothing to the quality history, so it can neither converge nor plateau a run.

use serde::{Deserialize, Serialize};

pub const TARGET_INITIAL_ANALYSIS: &str = "initial_comprehensive_analysis";
pub const TARGET_INCREASE_DEPTH: &str = "increase_analysis_depth";
pub const TARGET_EXPLORE_ALTERNATIVES: &str = "explore_alternative_approaches";
pub const TARGET_REFINE: &str = "refine_existing_analysis";

/// Quality below which the next iteration is asked to go deeper.
const DEPTH_QUALITY_FLOOR: f64 = 0.7;
/// Delta below which the next iteration is asked to try something else.
const STALL_DELTA: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f64,

    #[serde(default = "default_quality_target")]
    pub quality_target: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            improvement_threshold: default_improvement_threshold(),
            quality_target: default_quality_target(),
        }
    }
}

fn default_max_iterations() -> u32 {
    5
}

fn default_improvement_threshold() -> f64 {
    0.05
}

fn default_quality_target() -> f64 {
    0.95
}

/// Snapshot after one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    /// 1-based
    pub iteration: u32,
    pub quality_score: f64,
    pub improvement_delta: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    Plateau,
    QualityTarget,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::MaxIterations => "max_iterations",
            Self::Plateau => "plateau",
            Self::QualityTarget => "quality_target",
        };
        f.write_str(label)
    }
}

/// Owns the [`ConvergenceState`] history of one loop run.
#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
    history: Vec<ConvergenceState>,
    /// Iterations attempted, failed ones included
    attempts: u32,
    last_failed: bool,
    plateau_streak: u32,
    stop_reason: Option<StopReason>,
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
            attempts: 0,
            last_failed: false,
            plateau_streak: 0,
            stop_reason: None,
        }
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Record the raw quality of the next iteration and decide whether to stop.
    pub fn observe(&mut self, raw_score: f64) -> &ConvergenceState {
        let raw = if raw_score.is_nan() { 0.0 } else { raw_score.clamp(0.0, 1.0) };
        let previous = self.latest().map(|s| s.quality_score);
        self.attempts += 1;
        self.last_failed = false;
        let iteration = self.attempts;

        let quality_score = previous.map_or(raw, |p| p.max(raw));
        let improvement_delta = quality_score - previous.unwrap_or(0.0);

        // the first iteration has nothing to plateau against
        if previous.is_some() && improvement_delta < self.config.improvement_threshold {
            self.plateau_streak += 1;
        } else {
            self.plateau_streak = 0;
        }

        let stop = if quality_score >= self.config.quality_target {
            Some(StopReason::QualityTarget)
        } else if self.plateau_streak >= 2 {
            Some(StopReason::Plateau)
        } else if iteration >= self.config.max_iterations {
            Some(StopReason::MaxIterations)
        } else {
            None
        };
        self.stop_reason = stop;

        self.history.push(ConvergenceState {
            iteration,
            quality_score,
            improvement_delta,
            converged: matches!(stop, Some(StopReason::QualityTarget | StopReason::Plateau)),
        });

        tracing::debug!(
            iteration,
            quality = quality_score,
            delta = improvement_delta,
            stop = ?stop,
            "Convergence observed"
        );

        // just pushed
        &self.history[self.history.len() - 1]
    }

    /// Count a failed iteration. History is unchanged; only the iteration
    /// bound can stop the run here.
    pub fn record_failure(&mut self) {
        self.attempts += 1;
        self.last_failed = true;
        if self.attempts >= self.config.max_iterations {
            self.stop_reason = Some(StopReason::MaxIterations);
        }
        tracing::debug!(iteration = self.attempts, stop = ?self.stop_reason, "Iteration failure recorded");
    }

    /// Iterations attempted so far, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn should_stop(&self) -> bool {
        self.stop_reason.is_some() || self.attempts >= self.config.max_iterations
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_converged(&self) -> bool {
        self.latest().is_some_and(|s| s.converged)
    }

    pub fn latest(&self) -> Option<&ConvergenceState> {
        self.history.last()
    }

    pub fn history(&self) -> &[ConvergenceState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<ConvergenceState> {
        self.history
    }

    /// Targets to inject into the next iteration's payload.
    pub fn improvement_targets(&self) -> Vec<String> {
        if self.attempts == 0 {
            return vec![TARGET_INITIAL_ANALYSIS.to_string()];
        }

        // a failed attempt scores zero and shows no improvement
        let (quality, delta) = match self.latest() {
            Some(last) if !self.last_failed => (last.quality_score, last.improvement_delta),
            _ => (0.0, 0.0),
        };

        let mut targets = Vec::new();
        if quality < DEPTH_QUALITY_FLOOR {
            targets.push(TARGET_INCREASE_DEPTH.to_string());
        }
        if self.attempts >= 2 && delta < STALL_DELTA {
            targets.push(TARGET_EXPLORE_ALTERNATIVES.to_string());
        }
        targets.push(TARGET_REFINE.to_string());
        targets
    }
}

// ============================================================================
// Quality Functions
// ============================================================================

/// Scores one iteration's result. Output outside `[0, 1]` is clamped by the
/// detector.
pub trait QualityFunction: Send + Sync {
    /// `iteration` is 1-based.
    fn score(&self, result: &serde_json::Value, iteration: u32) -> f64;
}

/// Reads a numeric field from an object result (default `"quality"`).
#[derive(Debug, Clone)]
pub struct FieldQuality {
    pub field: String,
}

impl Default for FieldQuality {
    fn default() -> Self {
        Self {
            field: "quality".to_string(),
        }
    }
}

impl QualityFunction for FieldQuality {
    fn score(&self, result: &serde_json::Value, _iteration: u32) -> f64 {
        result
            .get(&self.field)
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
    }
}

/// Completeness/detail heuristic for free-form results: serialized length per
/// thousand characters, a bonus when the result mentions "analysis", and a
/// small bonus that grows with the iteration count.
#[derive(Debug, Clone, Default)]
pub struct HeuristicQuality;

impl QualityFunction for HeuristicQuality {
    fn score(&self, result: &serde_json::Value, iteration: u32) -> f64 {
        if !result.is_object() {
            return 0.5;
        }
        let text = result.to_string();
        let completeness = text.len() as f64 / 1000.0;
        let detail_bonus = if text.to_lowercase().contains("analysis") { 0.1 } else { 0.0 };
        let iteration_bonus = (f64::from(iteration.saturating_sub(1)) * 0.05).min(0.25);
        (completeness + detail_bonus + iteration_bonus).min(1.0)
    }
}
