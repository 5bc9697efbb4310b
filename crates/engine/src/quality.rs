// SPDX-License-Identifier: MIT

//! Post-completion quality scoring (§4.F "run quality analysis"), ported
//! from `original_source/backend/services/quality_analysis_service.py`'s
//! `analyze_training_quality`. `peft_core::quality` owns the value types;
//! this module derives the scorer's `TrainingResult` input from a job's
//! recorded [`peft_core::MetricsSample`] history and reproduces its point
//! buckets and suggestion rules.

use peft_core::{
    ImprovementSuggestion, Job, QualityAnalysis, SuggestionCategory, SuggestionPriority,
};
use std::collections::BTreeMap;

/// Summary of a completed run's metrics, equivalent to the Python
/// `TrainingResult` dataclass, derived entirely from `job.metrics_history`.
struct TrainingResult {
    initial_loss: f64,
    final_loss: f64,
    epochs_completed: u32,
    total_steps: u64,
    best_val_loss: Option<f64>,
    convergence_achieved: bool,
    gradient_norm_stable: bool,
    recent_losses: Vec<f64>,
}

/// Score `job`'s recorded metrics history. Returns `None` if the job has
/// no metrics at all (e.g. it completed before ever reporting one), since
/// the scoring algorithm is undefined without an initial/final loss pair.
pub fn analyze(job: &Job) -> Option<QualityAnalysis> {
    let result = summarize(job)?;
    Some(score(&result))
}

fn summarize(job: &Job) -> Option<TrainingResult> {
    let first = job.metrics_history.iter().next()?;
    let last = job.metrics_history.last()?;

    let grad_norms: Vec<f64> = job.metrics_history.iter().filter_map(|s| s.grad_norm).collect();
    let gradient_norm_stable = grad_norms.len() < 2
        || grad_norms.windows(2).all(|w| w[1] <= w[0] * 5.0 || w[1] <= 10.0);

    let best_val_loss = job
        .metrics_history
        .iter()
        .filter_map(|s| s.val_loss)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));

    // "Converged" if the final 3 samples' loss varied by less than 1% of
    // the final loss, mirroring the distilled convergence_achieved flag
    // the Python side receives as an upstream-computed boolean.
    let recent_losses: Vec<f64> = job.metrics_history.iter().rev().take(10).map(|s| s.loss).collect();
    let convergence_achieved = if recent_losses.len() >= 3 {
        let window = &recent_losses[..3];
        let spread = window.iter().cloned().fold(f64::MIN, f64::max) - window.iter().cloned().fold(f64::MAX, f64::min);
        spread.abs() <= last.loss.abs() * 0.01
    } else {
        false
    };

    Some(TrainingResult {
        initial_loss: first.loss,
        final_loss: last.loss,
        epochs_completed: last.epoch.floor().max(0.0) as u32,
        total_steps: last.step,
        best_val_loss,
        convergence_achieved,
        gradient_norm_stable,
        recent_losses,
    })
}

fn score(result: &TrainingResult) -> QualityAnalysis {
    let mut suggestions = Vec::new();
    let mut metrics_summary = BTreeMap::new();

    let loss_reduction = if result.initial_loss != 0.0 {
        (result.initial_loss - result.final_loss) / result.initial_loss
    } else {
        0.0
    };
    metrics_summary.insert("loss_reduction".to_string(), format!("{loss_reduction:.4}"));
    metrics_summary.insert("loss_reduction_percent".to_string(), format!("{:.1}", loss_reduction * 100.0));

    let mut quality_score = 50.0_f64;

    // Factor 1: loss reduction, 0-30.
    if loss_reduction > 0.8 {
        quality_score += 30.0;
    } else if loss_reduction > 0.6 {
        quality_score += 25.0;
    } else if loss_reduction > 0.4 {
        quality_score += 20.0;
    } else if loss_reduction > 0.2 {
        quality_score += 10.0;
    } else {
        quality_score += 5.0;
        suggestions.push(ImprovementSuggestion {
            category: SuggestionCategory::Convergence,
            description: "Loss reduction is low. Consider training for more epochs or adjusting the learning rate.".to_string(),
            priority: SuggestionPriority::High,
            action: Some("Increase epochs or adjust learning rate".to_string()),
        });
    }

    // Factor 2: convergence, 0-25.
    if result.convergence_achieved {
        quality_score += 25.0;
        metrics_summary.insert("convergence_status".to_string(), "achieved".to_string());
    } else {
        quality_score += 10.0;
        metrics_summary.insert("convergence_status".to_string(), "not_achieved".to_string());

        if result.recent_losses.len() > 10 {
            let window = &result.recent_losses[..10];
            // `recent_losses` is newest-first; oldest of the window vs newest.
            if window[9] > window[0] {
                suggestions.push(ImprovementSuggestion {
                    category: SuggestionCategory::Convergence,
                    description: "Loss is still decreasing. Training for more epochs may improve results.".to_string(),
                    priority: SuggestionPriority::Medium,
                    action: Some("Increase number of epochs".to_string()),
                });
            }
        }
    }

    // Factor 3: gradient stability, 0-20.
    if result.gradient_norm_stable {
        quality_score += 20.0;
        metrics_summary.insert("stability".to_string(), "stable".to_string());
    } else {
        quality_score += 5.0;
        metrics_summary.insert("stability".to_string(), "unstable".to_string());
        suggestions.push(ImprovementSuggestion {
            category: SuggestionCategory::Stability,
            description: "Gradient norms were unstable. Consider enabling gradient clipping or reducing learning rate.".to_string(),
            priority: SuggestionPriority::High,
            action: Some("Enable gradient clipping".to_string()),
        });
    }

    // Factor 4: overfitting, 0-15.
    match result.best_val_loss {
        Some(best_val_loss) if best_val_loss != 0.0 => {
            let val_gap = (result.final_loss - best_val_loss).abs() / best_val_loss;
            if val_gap < 0.1 {
                quality_score += 15.0;
                metrics_summary.insert("overfitting_risk".to_string(), "low".to_string());
            } else if val_gap < 0.3 {
                quality_score += 10.0;
                metrics_summary.insert("overfitting_risk".to_string(), "moderate".to_string());
                suggestions.push(ImprovementSuggestion {
                    category: SuggestionCategory::Overfitting,
                    description: "Moderate gap between training and validation loss. Consider adding regularization.".to_string(),
                    priority: SuggestionPriority::Medium,
                    action: Some("Add dropout or weight decay".to_string()),
                });
            } else {
                metrics_summary.insert("overfitting_risk".to_string(), "high".to_string());
                suggestions.push(ImprovementSuggestion {
                    category: SuggestionCategory::Overfitting,
                    description: "Large gap between training and validation loss indicates overfitting. Increase regularization or use more training data.".to_string(),
                    priority: SuggestionPriority::High,
                    action: Some("Increase dropout rate or add more training data".to_string()),
                });
            }
        }
        _ => {
            quality_score += 10.0;
            metrics_summary.insert("overfitting_risk".to_string(), "unknown".to_string());
        }
    }

    // Factor 5: efficiency, 0-10.
    if result.epochs_completed > 0 {
        let loss_per_epoch = loss_reduction / result.epochs_completed as f64;
        if loss_per_epoch > 0.1 {
            quality_score += 10.0;
            metrics_summary.insert("efficiency".to_string(), "high".to_string());
        } else if loss_per_epoch > 0.05 {
            quality_score += 7.0;
            metrics_summary.insert("efficiency".to_string(), "moderate".to_string());
        } else {
            quality_score += 3.0;
            metrics_summary.insert("efficiency".to_string(), "low".to_string());
            suggestions.push(ImprovementSuggestion {
                category: SuggestionCategory::Efficiency,
                description: "Training efficiency is low. Consider increasing learning rate or batch size.".to_string(),
                priority: SuggestionPriority::Low,
                action: Some("Increase learning rate".to_string()),
            });
        }
    }

    let quality_score = quality_score.clamp(0.0, 100.0);

    let overall_assessment = if quality_score >= 90.0 {
        "Excellent training run with strong convergence and stability."
    } else if quality_score >= 75.0 {
        "Good training run with room for minor improvements."
    } else if quality_score >= 60.0 {
        "Acceptable training run, but several areas could be optimized."
    } else if quality_score >= 40.0 {
        "Training run completed but with significant issues. Review suggestions carefully."
    } else {
        "Training run had major issues. Consider adjusting hyperparameters significantly."
    }
    .to_string();

    suggestions.sort_by_key(|s| match s.priority {
        SuggestionPriority::High => 0,
        SuggestionPriority::Medium => 1,
        SuggestionPriority::Low => 2,
    });

    QualityAnalysis { quality_score, improvement_suggestions: suggestions, metrics_summary, overall_assessment }
}

#[cfg(test)]
#[path = "quality_tests.rs"]
mod tests;
