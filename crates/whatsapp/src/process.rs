//! Lifecycle of the protocol sidecar child process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

/// Environment variable pointing at the sidecar directory.
pub const SIDECAR_DIR_ENV: &str = "ZENOR_SIDECAR_DIR";

/// Sidecar location relative to an install prefix or the working directory.
const SIDECAR_REL_PATH: &str = "sidecar/zenor-bridge";

/// Grace period for SIGTERM before the child is killed.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarLaunch {
    /// Directory containing the sidecar's `package.json`.
    pub dir: PathBuf,
    pub port: u16,
}

/// A running sidecar child process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    /// Build the sidecar if needed, spawn it, and wait briefly for an early exit.
    pub async fn start(launch: SidecarLaunch) -> Result<Self> {
        let dir = &launch.dir;
        if !dir.join("package.json").exists() {
            bail!("no sidecar at {} (package.json missing)", dir.display());
        }

        if !dir.join("dist/index.js").exists() {
            if !dir.join("node_modules").exists() {
                run_npm(dir, &["install"]).await?;
            }
            run_npm(dir, &["run", "build"]).await?;
        }

        info!(path = %dir.display(), port = launch.port, "starting sidecar");

        let mut child = Command::new("node")
            .arg("dist/index.js")
            .current_dir(dir)
            .env("ZENOR_SIDECAR_PORT", launch.port.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn sidecar")?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    forward_log_line(&line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "zenor_sidecar", "{line}");
                }
            });
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Some(status) = child.try_wait().context("failed to poll sidecar")? {
            bail!("sidecar exited immediately with {status}");
        }

        Ok(Self {
            child,
            port: launch.port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM, then kill if the child ignores it.
    pub async fn stop(&mut self) -> Result<()> {
        info!("stopping sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
            {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill().await;
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for sidecar"),
            Err(_) => {
                warn!("sidecar ignored SIGTERM, killing");
                self.child.kill().await.context("failed to kill sidecar")?;
            },
        }
        Ok(())
    }
}

/// Locate the sidecar directory.
///
/// Order: `explicit`, `$ZENOR_SIDECAR_DIR`, next to the executable, then
/// relative to the working directory.
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let has_package = |p: &Path| p.join("package.json").exists();

    if let Some(path) = explicit {
        if has_package(path) {
            return Ok(path.to_path_buf());
        }
        bail!("sidecar directory {} has no package.json", path.display());
    }

    if let Ok(dir) = std::env::var(SIDECAR_DIR_ENV) {
        let path = PathBuf::from(&dir);
        if has_package(&path) {
            return Ok(path);
        }
        warn!(path = %dir, "{SIDECAR_DIR_ENV} set but package.json not found");
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let near_exe = exe_dir
        .into_iter()
        .flat_map(|dir| [dir.join("..").join(SIDECAR_REL_PATH), dir.join("../..").join(SIDECAR_REL_PATH)]);
    let near_cwd = ["", "..", "../.."]
        .into_iter()
        .map(|prefix| Path::new(prefix).join(SIDECAR_REL_PATH));

    if let Some(found) = near_exe.chain(near_cwd).find(|p| has_package(p)) {
        return Ok(found.canonicalize().unwrap_or(found));
    }

    bail!("sidecar not found; set {SIDECAR_DIR_ENV} or install it under {SIDECAR_REL_PATH}")
}

async fn run_npm(dir: &Path, args: &[&str]) -> Result<()> {
    info!(path = %dir.display(), ?args, "running npm");
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to run npm {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "npm {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Pino numeric levels mapped onto tracing levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SidecarLevel {
    Debug,
    Info,
    Warn,
    Error,
}

fn pino_level(level: u64) -> SidecarLevel {
    match level {
        0..=20 => SidecarLevel::Debug,
        21..=30 => SidecarLevel::Info,
        31..=40 => SidecarLevel::Warn,
        _ => SidecarLevel::Error,
    }
}

/// Re-emit one stdout line. Pino JSON lines keep their level and message.
fn forward_log_line(line: &str) {
    let parsed = line
        .starts_with('{')
        .then(|| serde_json::from_str::<serde_json::Value>(line).ok())
        .flatten();
    let Some(log) = parsed else {
        info!(target: "zenor_sidecar", "{line}");
        return;
    };
    let level = log.get("level").and_then(|v| v.as_u64()).unwrap_or(30);
    let msg = log.get("msg").and_then(|v| v.as_str()).unwrap_or(line);
    match pino_level(level) {
        SidecarLevel::Debug => debug!(target: "zenor_sidecar", "{msg}"),
        SidecarLevel::Info => info!(target: "zenor_sidecar", "{msg}"),
        SidecarLevel::Warn => warn!(target: "zenor_sidecar", "{msg}"),
        SidecarLevel::Error => error!(target: "zenor_sidecar", "{msg}"),
    }
}
