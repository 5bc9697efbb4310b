use super::*;

#[test]
fn handle_captures_reason_and_step_from_checkpoint() {
    let checkpoint = Checkpoint::builder().step(250).reason(CheckpointReason::Anomaly).build();
    let handle = CheckpointHandle::new(&checkpoint, "/data/ckpt/250", "abc123");
    assert_eq!(handle.step, 250);
    assert_eq!(handle.reason, CheckpointReason::Anomaly);
    assert_eq!(handle.path, "/data/ckpt/250");
    assert_eq!(handle.sha256, "abc123");
}

#[test]
fn default_builder_has_no_scheduler_state() {
    let checkpoint = Checkpoint::builder().build();
    assert!(checkpoint.scheduler_state.is_none());
}

#[test]
fn reason_display_matches_wire_format() {
    assert_eq!(CheckpointReason::Pause.to_string(), "pause");
    assert_eq!(CheckpointReason::Scheduled.to_string(), "scheduled");
}
