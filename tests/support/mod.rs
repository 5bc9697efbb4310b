// SPDX-License-Identifier: MIT

//! Shared black-box harness for the §8 acceptance scenarios: spawn the
//! real `peftd` binary against a scratch directory, drive it with the
//! real `peftctl` binary, and assert on the wire responses and the
//! files `peftd` leaves on disk. Nothing in this module links against
//! the workspace's internal crates — the root test package deliberately
//! has no path dependencies on them, so this is the same vantage point
//! an end user has.

use assert_cmd::cargo::CommandCargoExt;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// A `peftd` instance running against a private temp directory, killed
/// when dropped.
pub struct Daemon {
    child: Child,
    pub dir: tempfile::TempDir,
    pub socket_path: PathBuf,
}

impl Daemon {
    /// Spawn `peftd` with its state rooted at a fresh temp directory.
    /// `extra_env` lets individual scenarios override the training
    /// command or the http connector's base URL.
    pub fn spawn(extra_env: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("peftd.sock");

        let mut command = Command::cargo_bin("peftd").expect("peftd binary");
        command
            .env("PEFT_SOCKET_PATH", &socket_path)
            .env("DATABASE_URL", dir.path().join("jobs.wal"))
            .env("PEFT_CHECKPOINT_ROOT", dir.path().join("checkpoints"))
            .env("PEFT_ARTIFACT_ROOT", dir.path().join("artifacts"))
            .env("PEFT_CONNECTOR_PLUGIN_DIR", dir.path().join("connectors"))
            .env("PEFT_LOG_DIR", dir.path().join("logs"))
            .env("RUST_LOG", "info")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in extra_env {
            command.env(key, value);
        }

        let child = command.spawn().expect("failed to spawn peftd");
        let daemon = Self { child, dir, socket_path };
        daemon.wait_for_socket();
        daemon
    }

    fn wait_for_socket(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if self.socket_path.exists() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        panic!("peftd never created its socket at {}", self.socket_path.display());
    }

    /// A `peftctl` invocation preconfigured to talk to this daemon.
    pub fn ctl(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("peftctl").expect("peftctl binary");
        cmd.env("PEFT_SOCKET_PATH", &self.socket_path);
        cmd
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Write a job config JSON file under `dir` and return its path.
/// `patch` lets each scenario tweak fields on top of a realistic default.
pub fn write_config(dir: &Path, name: &str, patch: serde_json::Value) -> PathBuf {
    let mut config = serde_json::json!({
        "base_model": "meta-llama/Llama-3-8b",
        "model_source": "huggingface",
        "dataset_path": "/data/train.jsonl",
        "validation_split": 0.1,
        "algorithm": "lora",
        "rank": 8,
        "alpha": 16,
        "dropout": 0.1,
        "target_modules": ["q_proj", "v_proj"],
        "quantization": null,
        "optimizer": "adam_w",
        "scheduler": "cosine",
        "precision": "bf16",
        "learning_rate": 2e-4,
        "batch_size": 4,
        "gradient_accumulation_steps": 4,
        "num_epochs": 3,
        "max_steps": 4,
        "checkpoint_steps": 2,
        "save_total_limit": 3,
        "experiment_tracker": null,
        "project_name": "",
        "backend": "local",
        "resource_id": null,
        "vars": {}
    });
    merge_json(&mut config, patch);

    let path = dir.join(format!("{name}.json"));
    std::fs::write(&path, serde_json::to_vec_pretty(&config).expect("encode config")).expect("write config");
    path
}

fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Write a chmod'd shell script under `dir` and return its path, for use
/// as a `training_command` override that speaks `ProcessTrainingDriver`'s
/// JSON-lines protocol directly.
pub fn write_training_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    }
    path
}

pub fn sample_line(step: u64, loss: f64, grad_norm: Option<f64>) -> String {
    let grad_norm = match grad_norm {
        Some(v) if v.is_nan() => "null".to_string(),
        Some(v) => v.to_string(),
        None => "null".to_string(),
    };
    format!(
        r#"{{"type":"sample","step":{step},"epoch":{epoch},"loss":{loss},"learning_rate":0.0002,"grad_norm":{grad_norm},"throughput":10.0,"samples_per_second":10.0,"cpu_util":0.0,"ram_used":0.0,"val_loss":null,"val_perplexity":null,"timestamp_ms":1000,"elapsed":{{"secs":1,"nanos":0}},"eta":{{"secs":0,"nanos":0}}}}"#,
        epoch = step as f64 / 4.0,
    )
}

pub fn checkpoint_line(event: &str, step: u64, loss: f64, dir: &Path) -> String {
    let model = dir.join(format!("model-{step}.bin"));
    let optim = dir.join(format!("optim-{step}.bin"));
    std::fs::write(&model, b"model-bytes").expect("write fake model state");
    std::fs::write(&optim, b"optim-bytes").expect("write fake optimizer state");
    format!(
        r#"{{"type":"{event}","step":{step},"epoch":{epoch},"loss":{loss},"learning_rate":0.0002,"model_state_path":"{model}","optimizer_state_path":"{optim}","scheduler_state_path":null,"recent_metrics":[],"timestamp_ms":1000}}"#,
        epoch = step as f64 / 4.0,
        model = model.display(),
        optim = optim.display(),
    )
}

pub fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    predicate()
}

/// A minimal single-threaded HTTP/1.1 server standing in for a real
/// provider, speaking just enough of the `HttpConnector` REST contract
/// (§4.A) to drive the provider-backed scenarios end to end.
pub struct MockProvider {
    port: u16,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl MockProvider {
    /// `artifact_bytes` is returned verbatim from `GET /jobs/:id/artifact`.
    pub fn start(job_id: &'static str, artifact_bytes: &'static [u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock provider");
        listener.set_nonblocking(true).expect("nonblocking");
        let port = listener.local_addr().expect("local addr").port();
        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_thread = stop.clone();
        let cancelled = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let cancelled_thread = cancelled.clone();

        let handle = std::thread::spawn(move || {
            while !stop_thread.load(std::sync::atomic::Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => handle_connection(stream, job_id, artifact_bytes, &cancelled_thread),
                    Err(_) => std::thread::sleep(Duration::from_millis(10)),
                }
            }
        });

        Self { port, stop, cancelled, handle: Some(handle) }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        // Unstick the blocking accept loop with a dummy connection.
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(mut stream: TcpStream, job_id: &str, artifact_bytes: &[u8], cancelled: &std::sync::atomic::AtomicBool) {
    stream.set_nonblocking(false).ok();
    let request = match read_request(&mut stream) {
        Some(r) => r,
        None => return,
    };

    let (status, body): (&str, Vec<u8>) = if request.starts_with("POST /jobs/") && request.contains("/cancel") {
        cancelled.store(true, std::sync::atomic::Ordering::Relaxed);
        ("200 OK", b"{}".to_vec())
    } else if request.starts_with(&format!("GET /jobs/{job_id}/artifact")) {
        ("200 OK", artifact_bytes.to_vec())
    } else if request.starts_with(&format!("GET /jobs/{job_id}")) {
        let status_word = if cancelled.load(std::sync::atomic::Ordering::Relaxed) { "cancelled" } else { "completed" };
        (
            "200 OK",
            serde_json::json!({"status": status_word}).to_string().into_bytes(),
        )
    } else if request.starts_with("POST /jobs") {
        ("200 OK", serde_json::json!({"job_id": job_id}).to_string().into_bytes())
    } else if request.starts_with("GET /whoami") {
        ("200 OK", b"{}".to_vec())
    } else {
        ("404 Not Found", b"{}".to_vec())
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {len}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = [0u8; 8192];
    let n = stream.read(&mut buf).ok()?;
    if n == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&buf[..n]).into_owned())
}
