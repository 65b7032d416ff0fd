//! Stop and restart of the real `switchyard` binary.
#![cfg(unix)]

use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;

mod common;

/// A spawned server process, killed on drop if still running.
struct Process {
    child: Child,
    port: u16,
    _dir: TempDir,
}

impl Process {
    fn start() -> Self {
        let port = free_port();
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("app.toml");
        std::fs::write(
            &config,
            format!(
                "[listener]\nlisten = \"127.0.0.1:{}\"\nrestart_timeout_secs = 1\n\n[observability]\nlog_level = \"warn\"\n",
                port
            ),
        )
        .unwrap();

        Self {
            child: spawn_binary(&config),
            port,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    fn signal(&self, signal: Signal) {
        kill(Pid::from_raw(self.child.id() as i32), signal).unwrap();
    }

    async fn wait_exit(&mut self, limit: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait().unwrap() {
                return Some(status);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        None
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn spawn_binary(config: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_switchyard"))
        .arg("--config")
        .arg(config)
        .env_remove("SWITCHYARD_GRACE")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

async fn wait_ready(url: &str) {
    let client = common::client();
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Ok(res) = client.get(url).send().await {
            if res.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server at {} never became ready", url);
}

/// Pid reported by the banner route, `"switchyard 0.1.0 (pid N)"`.
async fn serving_pid(url: &str) -> Option<u32> {
    let body = common::client().get(url).send().await.ok()?.text().await.ok()?;
    let start = body.rfind("(pid ")? + "(pid ".len();
    body[start..].trim_end_matches(')').parse().ok()
}

#[tokio::test]
async fn test_stuck_request_does_not_hold_exit() {
    let mut process = Process::start();
    wait_ready(&process.url("/healthz")).await;

    let url = process.url("/api/echo/sleep?ms=20000");
    let _stuck = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(300)).await;

    process.signal(Signal::SIGTERM);

    let status = process
        .wait_exit(Duration::from_secs(5))
        .await
        .expect("process should exit once the stop timeout passes");
    assert!(!status.success(), "an abandoned request is reported as a failure");
}

#[tokio::test]
async fn test_second_terminate_exits_immediately() {
    let mut process = Process::start();
    wait_ready(&process.url("/healthz")).await;

    let url = process.url("/api/echo/sleep?ms=20000");
    let _stuck = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(300)).await;

    process.signal(Signal::SIGTERM);
    tokio::time::sleep(Duration::from_millis(100)).await;
    process.signal(Signal::SIGINT);

    let status = process
        .wait_exit(Duration::from_millis(800))
        .await
        .expect("second signal should end the drain early");
    assert!(!status.success());
}

#[tokio::test]
async fn test_restart_keeps_port_served_by_new_process() {
    let mut process = Process::start();
    let banner = process.url("/");
    wait_ready(&banner).await;
    let old_pid = process.child.id();
    assert_eq!(serving_pid(&banner).await, Some(old_pid));

    process.signal(Signal::SIGUSR2);

    let status = process
        .wait_exit(Duration::from_secs(5))
        .await
        .expect("old process should exit after handing off");
    assert!(status.success());

    let new_pid = serving_pid(&banner)
        .await
        .expect("port should still be served after the old process exited");
    assert_ne!(new_pid, old_pid);

    for _ in 0..5 {
        let res = common::client()
            .get(process.url("/api/echo/hello?name=successor"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.text().await.unwrap(), "hello, successor");
    }

    kill(Pid::from_raw(new_pid as i32), Signal::SIGTERM).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while serving_pid(&banner).await.is_some() {
        assert!(Instant::now() < deadline, "successor did not stop");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
