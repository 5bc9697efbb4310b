// SPDX-License-Identifier: MIT

//! Training configuration value object (§3) and submit-time validation
//! (§4.F). Grounded on `original_source/backend/connectors/base.py::TrainingConfig`.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// PEFT algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Lora,
    Qlora,
    Dora,
    Pissa,
    Rslora,
}

crate::simple_display! {
    Algorithm {
        Lora => "lora",
        Qlora => "qlora",
        Dora => "dora",
        Pissa => "pissa",
        Rslora => "rslora",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantization {
    Int8,
    Int4,
    Nf4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimizer {
    AdamW,
    Adam8Bit,
    PagedAdamW,
    Sgd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduler {
    Linear,
    Cosine,
    Constant,
    CosineWithRestarts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Fp32,
    Fp16,
    Bf16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentTracker {
    Wandb,
    Cometml,
    Phoenix,
}

/// Execution backend selector (§2 data flow: "local or one of several
/// cloud GPU platforms").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    Local,
    Provider(String),
}

impl ExecutionBackend {
    pub fn is_local(&self) -> bool {
        matches!(self, ExecutionBackend::Local)
    }

    pub fn provider_name(&self) -> Option<&str> {
        match self {
            ExecutionBackend::Provider(name) => Some(name.as_str()),
            ExecutionBackend::Local => None,
        }
    }
}

/// Immutable training configuration captured on a [`crate::job::Job`] (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub base_model: String,
    pub model_source: String,
    pub dataset_path: String,
    pub validation_split: f64,

    pub algorithm: Algorithm,
    pub rank: i32,
    pub alpha: i32,
    pub dropout: f64,
    pub target_modules: Vec<String>,
    pub quantization: Option<Quantization>,

    pub optimizer: Optimizer,
    pub scheduler: Scheduler,
    pub precision: Precision,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub num_epochs: Option<u32>,
    pub max_steps: Option<u32>,

    pub checkpoint_steps: u32,
    pub save_total_limit: u32,

    pub experiment_tracker: Option<ExperimentTracker>,
    pub project_name: String,

    pub backend: ExecutionBackend,
    pub resource_id: Option<String>,

    #[serde(default)]
    pub vars: HashMap<String, String>,
}

impl Config {
    /// Submit-time validation rules (§4.F).
    ///
    /// Raised synchronously; never mutates job state.
    pub fn validate(&self) -> CoreResult<()> {
        if self.base_model.is_empty() {
            return Err(CoreError::validation("base_model must not be empty"));
        }
        if self.dataset_path.is_empty() {
            return Err(CoreError::validation("dataset_path must not be empty"));
        }
        if self.rank <= 0 {
            return Err(CoreError::validation("rank must be positive"));
        }
        if self.alpha <= 0 {
            return Err(CoreError::validation("alpha must be positive"));
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(CoreError::validation("dropout must be between 0 and 1"));
        }
        if matches!(self.algorithm, Algorithm::Dora | Algorithm::Pissa) && self.quantization.is_some()
        {
            return Err(CoreError::validation(format!(
                "{} is incompatible with quantization",
                self.algorithm
            )));
        }
        if self.experiment_tracker.is_some() && self.project_name.is_empty() {
            return Err(CoreError::validation(
                "project_name is required when experiment_tracker is set",
            ));
        }
        Ok(())
    }
}

crate::builder! {
    pub struct ConfigBuilder => Config {
        into {
            base_model: String = "test-model",
            model_source: String = "huggingface",
            dataset_path: String = "/data/train.jsonl",
            project_name: String = "",
        }
        set {
            validation_split: f64 = 0.1,
            algorithm: Algorithm = Algorithm::Lora,
            rank: i32 = 8,
            alpha: i32 = 16,
            dropout: f64 = 0.1,
            target_modules: Vec<String> = Vec::new(),
            optimizer: Optimizer = Optimizer::AdamW,
            scheduler: Scheduler = Scheduler::Cosine,
            precision: Precision = Precision::Bf16,
            learning_rate: f64 = 2e-4,
            batch_size: u32 = 4,
            gradient_accumulation_steps: u32 = 4,
            checkpoint_steps: u32 = 500,
            save_total_limit: u32 = 3,
            backend: ExecutionBackend = ExecutionBackend::Local,
            vars: HashMap<String, String> = HashMap::new(),
        }
        option {
            quantization: Quantization = None,
            num_epochs: u32 = Some(3),
            max_steps: u32 = Some(1000),
            experiment_tracker: ExperimentTracker = None,
            resource_id: String = None,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
