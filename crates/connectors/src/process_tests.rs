// SPDX-License-Identifier: MIT

use super::*;
use peft_core::Config;
use tokio::sync::mpsc;

fn sample_line(step: u64) -> String {
    format!(
        r#"{{"type":"sample","step":{step},"epoch":0.1,"loss":0.9,"learning_rate":0.0002,"grad_norm":null,"throughput":10.0,"samples_per_second":10.0,"cpu_util":0.0,"ram_used":0.0,"val_loss":null,"val_perplexity":null,"timestamp_ms":1000,"elapsed":{{"secs":1,"nanos":0}},"eta":{{"secs":0,"nanos":0}}}}"#
    )
}

#[tokio::test]
async fn streams_samples_then_completes() {
    let script = format!(r#"read _; echo '{}'; echo '{{"type":"completed"}}'"#, sample_line(1));
    let driver = ProcessTrainingDriver::new(vec!["sh".to_string(), "-c".to_string(), script]);

    let config = Config::builder().build();
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (update_tx, mut update_rx) = mpsc::channel(8);

    driver.run(config, None, cmd_rx, update_tx).await;

    let first = update_rx.recv().await.expect("expected a sample update");
    match first {
        TrainingUpdate::Sample(sample) => assert_eq!(sample.step, 1),
        other => panic!("expected Sample, got {other:?}"),
    }
    let second = update_rx.recv().await.expect("expected a terminal update");
    assert!(matches!(second, TrainingUpdate::Completed));
}

#[tokio::test]
async fn child_reported_failure_surfaces_as_failed() {
    let script = r#"read _; echo '{"type":"failed","message":"dataset not found"}'"#;
    let driver = ProcessTrainingDriver::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()]);

    let config = Config::builder().build();
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (update_tx, mut update_rx) = mpsc::channel(8);

    driver.run(config, None, cmd_rx, update_tx).await;

    let update = update_rx.recv().await.expect("expected an update");
    match update {
        TrainingUpdate::Failed(message) => assert_eq!(message, "dataset not found"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn unspawnable_command_surfaces_as_failed() {
    let driver = ProcessTrainingDriver::new(vec!["this-binary-does-not-exist-anywhere".to_string()]);
    let config = Config::builder().build();
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (update_tx, mut update_rx) = mpsc::channel(8);

    driver.run(config, None, cmd_rx, update_tx).await;

    let update = update_rx.recv().await.expect("expected an update");
    assert!(matches!(update, TrainingUpdate::Failed(_)));
}

#[tokio::test]
async fn per_job_training_command_override_is_used() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script_path = dir.path().join("train.sh");
    std::fs::write(&script_path, "#!/bin/sh\nread _\necho '{\"type\":\"completed\"}'\n").expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    // default command would fail; the per-job override in `vars` should win.
    let driver = ProcessTrainingDriver::new(vec!["this-binary-does-not-exist-anywhere".to_string()]);
    let mut config = Config::builder().build();
    config.vars.insert("training_command".to_string(), script_path.to_string_lossy().into_owned());
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (update_tx, mut update_rx) = mpsc::channel(8);

    driver.run(config, None, cmd_rx, update_tx).await;

    let update = update_rx.recv().await.expect("expected an update");
    assert!(matches!(update, TrainingUpdate::Completed));
}
