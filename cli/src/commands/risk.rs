// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `taskweave risk`: score a document set with the configured indicators.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use taskweave_core::domain::config::OrchestratorConfigManifest;
use taskweave_core::domain::risk::{RiskAssessment, RiskInput, RiskLevel, RiskScorer};

pub fn execute(file: PathBuf, json: bool, config_override: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let input = read_input(&file)?;
    let assessment = RiskScorer::new(&config.spec.risk).assess(&input);

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        print_assessment(&assessment);
    }
    Ok(())
}

/// `.yaml`/`.yml` are read as YAML, anything else as JSON.
pub fn read_input(file: &Path) -> Result<RiskInput> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let input: RiskInput = match file.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    Ok(input)
}

fn print_assessment(assessment: &RiskAssessment) {
    let level = match assessment.level {
        RiskLevel::Low => assessment.level.to_string().green(),
        RiskLevel::Medium => assessment.level.to_string().yellow(),
        RiskLevel::High => assessment.level.to_string().red(),
    };
    println!("{} {} (score {:.2})", "Risk level:".bold(), level.bold(), assessment.score);

    if assessment.indicators.is_empty() {
        println!("  No indicators triggered");
        return;
    }

    println!();
    println!("{}", "Indicators:".bold());
    for (id, finding) in assessment.triggered.iter().zip(&assessment.indicators) {
        println!("  - {} {}", format!("[{id}]").dimmed(), finding);
    }
    println!();
    println!("{}", "Recommendations:".bold());
    for recommendation in &assessment.recommendations {
        println!("  - {}", recommendation);
    }
}
