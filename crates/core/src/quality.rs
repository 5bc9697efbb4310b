// SPDX-License-Identifier: MIT

//! Quality analysis value object (§3, §4.F "run quality analysis"). Shape
//! ported from `original_source/backend/services/
//! quality_analysis_service.py`'s `QualityAnalysis`/`ImprovementSuggestion`
//! dataclasses; the scoring logic itself lives in
//! `peft_engine::quality`, which produces these from a completed job's
//! recorded metrics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCategory {
    Convergence,
    Overfitting,
    Underfitting,
    Efficiency,
    Stability,
}

crate::simple_display! {
    SuggestionCategory {
        Convergence => "convergence",
        Overfitting => "overfitting",
        Underfitting => "underfitting",
        Efficiency => "efficiency",
        Stability => "stability",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    pub category: SuggestionCategory,
    pub description: String,
    pub priority: SuggestionPriority,
    pub action: Option<String>,
}

/// Quality score and improvement suggestions for one completed run (§3
/// Job attribute `quality_analysis`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    /// 0-100.
    pub quality_score: f64,
    pub improvement_suggestions: Vec<ImprovementSuggestion>,
    pub metrics_summary: BTreeMap<String, String>,
    pub overall_assessment: String,
}

#[cfg(test)]
#[path = "quality_tests.rs"]
mod tests;
