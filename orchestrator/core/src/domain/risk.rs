// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Risk Scoring
//!
//! Deterministic rule engine over extracted document fields. An ordered list of
//! independent [`Indicator`]s is evaluated against a [`RiskInput`]; each one
//! that triggers adds its (non-negative) weight to the score, which is capped at
//! `1.0`. Because weights are never negative, triggering more indicators can
//! never lower the score.
//!
//! ```text
//! score < low_threshold   → LOW
//! score < high_threshold  → MEDIUM
//! otherwise               → HIGH
//! ```
//!
//! The default weights and thresholds are illustrative defaults, not a
//! validated statistical model. All of them are configurable through
//! [`RiskConfig`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CROSS_FIELD_INCONSISTENCY: &str = "cross_field_inconsistency";
pub const IMPLAUSIBLE_TIMING: &str = "implausible_timing";
pub const PLACEHOLDER_MARKERS: &str = "placeholder_markers";
pub const IDENTITY_MISMATCH: &str = "identity_mismatch";
pub const HIGH_VALUE_AMOUNT: &str = "high_value_amount";
pub const MISSING_CRITICAL_FIELDS: &str = "missing_critical_fields";

/// Recommendation per built-in indicator.
const RECOMMENDATIONS: &[(&str, &str)] = &[
    (
        CROSS_FIELD_INCONSISTENCY,
        "Request source documents (e.g. tax transcripts) to reconcile conflicting figures",
    ),
    (
        IMPLAUSIBLE_TIMING,
        "Obtain a written explanation for the reporting timeline",
    ),
    (
        PLACEHOLDER_MARKERS,
        "Reject the submitted documents and request originals",
    ),
    (
        IDENTITY_MISMATCH,
        "Verify identity and SSN with the issuing authority",
    ),
    (
        HIGH_VALUE_AMOUNT,
        "Route to senior review for high-value handling",
    ),
    (
        MISSING_CRITICAL_FIELDS,
        "Request the missing information before proceeding",
    ),
];

fn recommendation_for(indicator_id: &str) -> String {
    RECOMMENDATIONS
        .iter()
        .find(|(id, _)| *id == indicator_id)
        .map(|(_, text)| text.to_string())
        .unwrap_or_else(|| format!("Manually review '{indicator_id}'"))
}

// ============================================================================
// Input & Output
// ============================================================================

/// One document after extraction: a kind label plus flat string fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub kind: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl ExtractedDocument {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskInput {
    #[serde(default)]
    pub documents: Vec<ExtractedDocument>,
}

impl RiskInput {
    /// Every value of `field` across documents, in document order.
    fn values<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.documents
            .iter()
            .filter_map(move |doc| doc.fields.get(field).map(String::as_str))
    }

    fn all_text(&self) -> impl Iterator<Item = &str> {
        self.documents
            .iter()
            .flat_map(|doc| std::iter::once(doc.kind.as_str()).chain(doc.fields.values().map(String::as_str)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("LOW"),
            Self::Medium => f.write_str("MEDIUM"),
            Self::High => f.write_str("HIGH"),
        }
    }
}

/// Result of one scoring run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    /// Human-readable finding per triggered indicator, in evaluation order
    pub indicators: Vec<String>,
    pub recommendations: Vec<String>,
    /// Stable ids of the triggered indicators
    pub triggered: Vec<String>,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorWeights {
    #[serde(default = "default_core_weight")]
    pub cross_field_inconsistency: f64,
    #[serde(default = "default_core_weight")]
    pub implausible_timing: f64,
    #[serde(default = "default_core_weight")]
    pub placeholder_markers: f64,
    #[serde(default = "default_core_weight")]
    pub identity_mismatch: f64,
    #[serde(default = "default_high_value_weight")]
    pub high_value_amount: f64,
    #[serde(default = "default_missing_fields_weight")]
    pub missing_critical_fields: f64,
}

impl IndicatorWeights {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            (CROSS_FIELD_INCONSISTENCY, self.cross_field_inconsistency),
            (IMPLAUSIBLE_TIMING, self.implausible_timing),
            (PLACEHOLDER_MARKERS, self.placeholder_markers),
            (IDENTITY_MISMATCH, self.identity_mismatch),
            (HIGH_VALUE_AMOUNT, self.high_value_amount),
            (MISSING_CRITICAL_FIELDS, self.missing_critical_fields),
        ]
        .into_iter()
    }
}

impl Default for IndicatorWeights {
    fn default() -> Self {
        Self {
            cross_field_inconsistency: default_core_weight(),
            implausible_timing: default_core_weight(),
            placeholder_markers: default_core_weight(),
            identity_mismatch: default_core_weight(),
            high_value_amount: default_high_value_weight(),
            missing_critical_fields: default_missing_fields_weight(),
        }
    }
}

/// Tunables for the built-in indicators (`spec.risk` in the config manifest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub weights: IndicatorWeights,

    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,

    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,

    /// Whole-word (or whole-phrase) markers of test/demo documents
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,

    /// Relative difference above which two income figures disagree
    #[serde(default = "default_income_tolerance")]
    pub income_tolerance: f64,

    #[serde(default = "default_max_reporting_lag_days")]
    pub max_reporting_lag_days: i64,

    #[serde(default = "default_high_value_threshold")]
    pub high_value_threshold: f64,

    /// Fields every input must carry somewhere; empty disables the check
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: IndicatorWeights::default(),
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
            placeholder_markers: default_placeholder_markers(),
            income_tolerance: default_income_tolerance(),
            max_reporting_lag_days: default_max_reporting_lag_days(),
            high_value_threshold: default_high_value_threshold(),
            required_fields: Vec::new(),
        }
    }
}

fn default_core_weight() -> f64 {
    0.25
}

fn default_high_value_weight() -> f64 {
    0.2
}

fn default_missing_fields_weight() -> f64 {
    0.1
}

fn default_low_threshold() -> f64 {
    0.3
}

fn default_high_threshold() -> f64 {
    0.7
}

fn default_placeholder_markers() -> Vec<String> {
    ["test", "demo", "sample", "lorem ipsum", "testlandia", "republic of test"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_income_tolerance() -> f64 {
    0.10
}

fn default_max_reporting_lag_days() -> i64 {
    30
}

fn default_high_value_threshold() -> f64 {
    50_000.0
}

// ============================================================================
// Indicators
// ============================================================================

/// One independent predicate over the input.
pub trait Indicator: Send + Sync {
    /// Stable id, used for weights and the recommendation table.
    fn id(&self) -> &'static str;

    /// Describe the finding when the indicator triggers.
    fn detect(&self, input: &RiskInput) -> Option<String>;
}

/// Parse "$102,000.50" style amounts.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    cleaned.parse::<f64>().ok()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whole-word phrase match, case-insensitive.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    let haystack = words(text);
    let needle = words(phrase);
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Income figures that disagree across documents.
pub struct CrossFieldInconsistency {
    pub tolerance: f64,
}

impl Indicator for CrossFieldInconsistency {
    fn id(&self) -> &'static str {
        CROSS_FIELD_INCONSISTENCY
    }

    fn detect(&self, input: &RiskInput) -> Option<String> {
        let amounts: Vec<f64> = input.values("income").filter_map(parse_amount).collect();
        let max = amounts.iter().copied().fold(f64::MIN, f64::max);
        let min = amounts.iter().copied().fold(f64::MAX, f64::min);
        if amounts.len() < 2 || max <= 0.0 {
            return None;
        }
        let discrepancy = (max - min) / max;
        (discrepancy > self.tolerance).then(|| {
            format!(
                "Income figures differ by {:.0}% across documents ({min} vs {max})",
                discrepancy * 100.0
            )
        })
    }
}

/// Report filed before the incident, or long after it.
pub struct ImplausibleTiming {
    pub max_lag_days: i64,
}

impl Indicator for ImplausibleTiming {
    fn id(&self) -> &'static str {
        IMPLAUSIBLE_TIMING
    }

    fn detect(&self, input: &RiskInput) -> Option<String> {
        let incident = input.values("incident_date").find_map(parse_date)?;
        let report = input.values("report_date").find_map(parse_date)?;
        let lag = (report - incident).num_days();
        if lag < 0 {
            Some(format!("Report date {report} precedes incident date {incident}"))
        } else if lag > self.max_lag_days {
            Some(format!("Reported {lag} days after the incident"))
        } else {
            None
        }
    }
}

/// Test/demo/sample wording anywhere in the documents.
pub struct PlaceholderMarkers {
    pub markers: Vec<String>,
}

impl Indicator for PlaceholderMarkers {
    fn id(&self) -> &'static str {
        PLACEHOLDER_MARKERS
    }

    fn detect(&self, input: &RiskInput) -> Option<String> {
        let found: Vec<&str> = self
            .markers
            .iter()
            .filter(|marker| input.all_text().any(|text| contains_phrase(text, marker)))
            .map(String::as_str)
            .collect();
        (!found.is_empty()).then(|| format!("Placeholder markers found: {}", found.join(", ")))
    }
}

/// Identity fields that disagree across documents, or a masked SSN.
pub struct IdentityMismatch;

const IDENTITY_FIELDS: &[&str] = &["name", "ssn", "date_of_birth"];

impl Indicator for IdentityMismatch {
    fn id(&self) -> &'static str {
        IDENTITY_MISMATCH
    }

    fn detect(&self, input: &RiskInput) -> Option<String> {
        let mut findings = Vec::new();

        for field in IDENTITY_FIELDS {
            let mut distinct: Vec<String> = input
                .values(field)
                .map(|v| v.trim().to_lowercase())
                .collect();
            distinct.sort();
            distinct.dedup();
            if distinct.len() > 1 {
                findings.push(format!("'{field}' differs across documents"));
            }
        }

        if input.values("ssn").any(|ssn| ssn.to_lowercase().starts_with("xxx-xx-")) {
            findings.push("SSN is masked".to_string());
        }

        (!findings.is_empty()).then(|| findings.join("; "))
    }
}

pub struct HighValueAmount {
    pub threshold: f64,
}

impl Indicator for HighValueAmount {
    fn id(&self) -> &'static str {
        HIGH_VALUE_AMOUNT
    }

    fn detect(&self, input: &RiskInput) -> Option<String> {
        let max = input
            .values("amount")
            .filter_map(parse_amount)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))?;
        (max > self.threshold).then(|| format!("Amount {max} exceeds {}", self.threshold))
    }
}

pub struct MissingCriticalFields {
    pub required: Vec<String>,
}

impl Indicator for MissingCriticalFields {
    fn id(&self) -> &'static str {
        MISSING_CRITICAL_FIELDS
    }

    fn detect(&self, input: &RiskInput) -> Option<String> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|field| input.values(field).all(|v| v.trim().is_empty()))
            .map(String::as_str)
            .collect();
        (!missing.is_empty()).then(|| format!("Missing critical fields: {}", missing.join(", ")))
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Ordered, weighted indicator set.
pub struct RiskScorer {
    indicators: Vec<(Box<dyn Indicator>, f64)>,
    low_threshold: f64,
    high_threshold: f64,
}

impl RiskScorer {
    /// Built-in indicators, weighted from `config`.
    pub fn new(config: &RiskConfig) -> Self {
        let weights = &config.weights;
        let mut scorer = Self::empty(config.low_threshold, config.high_threshold)
            .with_indicator(
                CrossFieldInconsistency {
                    tolerance: config.income_tolerance,
                },
                weights.cross_field_inconsistency,
            )
            .with_indicator(
                ImplausibleTiming {
                    max_lag_days: config.max_reporting_lag_days,
                },
                weights.implausible_timing,
            )
            .with_indicator(
                PlaceholderMarkers {
                    markers: config.placeholder_markers.clone(),
                },
                weights.placeholder_markers,
            )
            .with_indicator(IdentityMismatch, weights.identity_mismatch)
            .with_indicator(
                HighValueAmount {
                    threshold: config.high_value_threshold,
                },
                weights.high_value_amount,
            );

        if !config.required_fields.is_empty() {
            scorer = scorer.with_indicator(
                MissingCriticalFields {
                    required: config.required_fields.clone(),
                },
                weights.missing_critical_fields,
            );
        }
        scorer
    }

    pub fn empty(low_threshold: f64, high_threshold: f64) -> Self {
        Self {
            indicators: Vec::new(),
            low_threshold,
            high_threshold,
        }
    }

    /// Append an indicator. Negative weights are clamped to zero so the score
    /// stays monotonic.
    pub fn with_indicator(mut self, indicator: impl Indicator + 'static, weight: f64) -> Self {
        self.indicators.push((Box::new(indicator), weight.max(0.0)));
        self
    }

    pub fn level_for(&self, score: f64) -> RiskLevel {
        if score < self.low_threshold {
            RiskLevel::Low
        } else if score < self.high_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn assess(&self, input: &RiskInput) -> RiskAssessment {
        let mut score = 0.0_f64;
        let mut indicators = Vec::new();
        let mut recommendations = Vec::new();
        let mut triggered = Vec::new();

        for (indicator, weight) in &self.indicators {
            if let Some(finding) = indicator.detect(input) {
                score += weight;
                indicators.push(finding);
                recommendations.push(recommendation_for(indicator.id()));
                triggered.push(indicator.id().to_string());
            }
        }

        let score = score.min(1.0);
        let level = self.level_for(score);
        tracing::debug!(score, %level, triggered = triggered.len(), "Risk assessed");

        RiskAssessment {
            score,
            level,
            indicators,
            recommendations,
            triggered,
        }
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(&RiskConfig::default())
    }
}
