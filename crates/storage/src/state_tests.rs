use super::*;
use peft_core::{Config, JobState, MetricsSample, Notification, NotificationKind, Urgency};

fn sample(step: u64) -> MetricsSample {
    MetricsSample {
        step,
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
        timestamp_ms: step * 1000,
        elapsed: std::time::Duration::ZERO,
        eta: std::time::Duration::ZERO,
    }
}

fn created(job_id: &str) -> Event {
    Event::JobCreated {
        job_id: JobId::new(job_id),
        config: Config::builder().build(),
        created_at_ms: 0,
    }
}

#[test]
fn job_created_inserts_a_new_job() {
    let mut state = MaterializedState::new();
    state.apply(&created("job-1"));

    let job = state.get("job-1").expect("job present");
    assert_eq!(job.state, JobState::Created);
    assert_eq!(job.id, JobId::new("job-1"));
}

#[test]
fn job_created_is_idempotent_on_replay() {
    let mut state = MaterializedState::new();
    state.apply(&created("job-1"));
    state.apply(&Event::JobTransitioned { job_id: JobId::new("job-1"), to: JobState::Running, at_ms: 5 });
    state.apply(&created("job-1"));

    assert_eq!(state.get("job-1").unwrap().state, JobState::Running);
    assert_eq!(state.len(), 1);
}

#[test]
fn transitioned_event_replays_through_job_transition() {
    let mut state = MaterializedState::new();
    state.apply(&created("job-1"));
    state.apply(&Event::JobTransitioned { job_id: JobId::new("job-1"), to: JobState::Initializing, at_ms: 1 });
    state.apply(&Event::JobTransitioned { job_id: JobId::new("job-1"), to: JobState::Running, at_ms: 2 });

    let job = state.get("job-1").unwrap();
    assert_eq!(job.state, JobState::Running);
    assert_eq!(job.started_at_ms, Some(2));
}

#[test]
fn metrics_ingested_updates_history_and_current() {
    let mut state = MaterializedState::new();
    state.apply(&created("job-1"));
    state.apply(&Event::MetricsIngested { job_id: JobId::new("job-1"), sample: sample(1) });
    state.apply(&Event::MetricsIngested { job_id: JobId::new("job-1"), sample: sample(2) });

    let job = state.get("job-1").unwrap();
    assert_eq!(job.current_metrics.as_ref().unwrap().step, 2);
    assert_eq!(job.metrics_history.len(), 2);
}

#[test]
fn notification_sent_is_appended() {
    let mut state = MaterializedState::new();
    state.apply(&created("job-1"));
    let notification = Notification {
        kind: NotificationKind::Progress,
        title: "25% complete".into(),
        body: "25% complete".into(),
        milestone: Some(25),
        urgency: Urgency::Normal,
        sound: false,
        taskbar_progress: Some(25),
        respect_dnd: true,
        actions: vec![],
    };
    state.apply(&Event::NotificationSent { job_id: JobId::new("job-1"), notification });

    assert_eq!(state.get("job-1").unwrap().notifications.len(), 1);
}

#[test]
fn error_recorded_sets_error_message() {
    let mut state = MaterializedState::new();
    state.apply(&created("job-1"));
    state.apply(&Event::ErrorRecorded { job_id: JobId::new("job-1"), message: "boom".into(), kind: peft_core::ErrorKind::Validation });

    assert_eq!(state.get("job-1").unwrap().error_message.as_deref(), Some("boom"));
}

#[test]
fn events_for_an_unknown_job_are_ignored_not_fatal() {
    let mut state = MaterializedState::new();
    state.apply(&Event::ErrorRecorded { job_id: JobId::new("ghost"), message: "boom".into(), kind: peft_core::ErrorKind::Validation });

    assert!(state.get("ghost").is_none());
    assert!(state.is_empty());
}

#[test]
fn replaying_the_same_log_twice_yields_the_same_state() {
    let events = vec![
        created("job-1"),
        Event::JobTransitioned { job_id: JobId::new("job-1"), to: JobState::Initializing, at_ms: 1 },
        Event::JobTransitioned { job_id: JobId::new("job-1"), to: JobState::Running, at_ms: 2 },
        Event::MetricsIngested { job_id: JobId::new("job-1"), sample: sample(1) },
    ];

    let mut first = MaterializedState::new();
    for event in &events {
        first.apply(event);
    }
    let mut second = MaterializedState::new();
    for event in &events {
        second.apply(event);
    }

    assert_eq!(first.get("job-1").unwrap().state, second.get("job-1").unwrap().state);
    assert_eq!(
        first.get("job-1").unwrap().metrics_history.len(),
        second.get("job-1").unwrap().metrics_history.len()
    );
}
