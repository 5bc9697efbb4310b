use super::*;

#[test]
fn job_id_is_extracted_from_every_variant() {
    let id = JobId::new("job-1");
    let events = vec![
        Event::JobCreated {
            job_id: id.clone(),
            config: crate::config::Config::builder().build(),
            created_at_ms: 0,
        },
        Event::JobTransitioned { job_id: id.clone(), to: JobState::Running, at_ms: 1 },
        Event::ErrorRecorded { job_id: id.clone(), message: "boom".into(), kind: crate::error::ErrorKind::Validation },
    ];
    for event in &events {
        assert_eq!(event.job_id(), &id);
    }
}

#[test]
fn log_summary_never_includes_raw_metric_sample_fields() {
    let sample = crate::metrics::MetricsSample {
        step: 42,
        epoch: 1.0,
        loss: 0.5,
        learning_rate: 2e-4,
        grad_norm: None,
        throughput: 10.0,
        samples_per_second: 10.0,
        gpu_util: vec![],
        gpu_mem_used: vec![],
        gpu_mem_total: vec![],
        gpu_temp: vec![],
        cpu_util: 0.0,
        ram_used: 0.0,
        val_loss: None,
        val_perplexity: None,
        timestamp_ms: 0,
        elapsed: std::time::Duration::ZERO,
        eta: std::time::Duration::ZERO,
    };
    let event = Event::MetricsIngested { job_id: JobId::new("job-1"), sample };
    assert_eq!(event.log_summary(), "job_id=job-1 step=42");
}

#[test]
fn name_matches_snake_case_variant() {
    let event = Event::JobCreated {
        job_id: JobId::new("job-1"),
        config: crate::config::Config::builder().build(),
        created_at_ms: 0,
    };
    assert_eq!(event.name(), "job_created");
}

#[test]
fn quality_analysis_recorded_carries_job_id_and_summarizes_the_score() {
    let analysis = crate::quality::QualityAnalysis {
        quality_score: 87.5,
        improvement_suggestions: Vec::new(),
        metrics_summary: Default::default(),
        overall_assessment: "Good training run with room for minor improvements.".to_string(),
    };
    let event = Event::QualityAnalysisRecorded { job_id: JobId::new("job-1"), analysis };
    assert_eq!(event.name(), "quality_analysis_recorded");
    assert_eq!(event.job_id(), &JobId::new("job-1"));
    assert_eq!(event.log_summary(), "job_id=job-1 quality_score=87.5");
}

#[test]
fn error_recorded_log_summary_includes_kind() {
    let event = Event::ErrorRecorded {
        job_id: JobId::new("job-1"),
        message: "provider rejected the job".to_string(),
        kind: crate::error::ErrorKind::Connector(crate::error::ConnectorFailureKind::Permanent),
    };
    assert_eq!(event.log_summary(), "job_id=job-1 kind=connector_permanent");
}
