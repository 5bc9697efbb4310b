use super::*;
use crate::error::SuggestedAction;

#[test]
fn auto_recoverable_true_when_any_action_is_automatic() {
    let anomaly = Anomaly::new(
        AnomalyKind::LossDivergence,
        Severity::High,
        "loss diverged",
        DetectedAt { step: 10, timestamp_ms: 1000 },
        vec![
            SuggestedAction { description: "notify user".into(), automatic: false },
            SuggestedAction { description: "halve learning rate".into(), automatic: true },
        ],
    );
    assert!(anomaly.auto_recoverable);
}

#[test]
fn auto_recoverable_false_when_no_actions_are_automatic() {
    let anomaly = Anomaly::new(
        AnomalyKind::Overfitting,
        Severity::Medium,
        "val loss rising",
        DetectedAt { step: 10, timestamp_ms: 1000 },
        vec![SuggestedAction { description: "reduce epochs".into(), automatic: false }],
    );
    assert!(!anomaly.auto_recoverable);
}

#[test]
fn auto_recoverable_false_with_no_suggested_actions() {
    let anomaly = Anomaly::new(
        AnomalyKind::Oom,
        Severity::High,
        "gpu memory near capacity",
        DetectedAt { step: 10, timestamp_ms: 1000 },
        vec![],
    );
    assert!(!anomaly.auto_recoverable);
}

#[test]
fn severity_ordering_places_critical_highest() {
    assert!(Severity::Critical > Severity::High);
    assert!(Severity::High > Severity::Medium);
    assert!(Severity::Medium > Severity::Low);
}

#[test]
fn kind_display_matches_wire_format() {
    assert_eq!(AnomalyKind::MemoryLeak.to_string(), "memory_leak");
    assert_eq!(AnomalyKind::GradientExplosion.to_string(), "gradient_explosion");
}
