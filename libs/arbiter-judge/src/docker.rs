//! Docker-based execution engine for sandboxed code execution
//!
//! **Docker Execution Rules (one container per submission):**
//! 1. Pulls the language image if not present
//! 2. Creates a container with security constraints:
//!    - Network disabled
//!    - CPU/memory limits from languages.json
//! 3. Writes the executable unit into /code
//! 4. Compiles it once when the language has a compile step
//! 5. Runs it once per test input on stdin, one run at a time, under a hard timeout
//! 6. Captures stdout/stderr, exit code, wall time and peak memory of each run
//! 7. Removes the container, even on panic or cancellation

use crate::engine::{ExecutionEngine, Prepared, PreparedUnit};
use crate::error::ExecutionFault;
use crate::harness::LanguageConfig;
use arbiter_common::types::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, Kilobytes, Millis,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const WORK_DIR: &str = "/code";
const COMPILE_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on a submission's container lifetime; the guard removes it sooner.
const CONTAINER_KEEPALIVE: Duration = Duration::from_secs(3600);
/// GNU time writes the run's peak RSS here, in kilobytes.
const PEAK_RSS_FILE: &str = "/tmp/arbiter-peak-rss";

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution panics or the
/// caller drops the future (a cancelled run)
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Best-effort cleanup - cannot be async in Drop
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to clean up container");
            }
        });
    }
}

struct ExecOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i64>,
}

fn unavailable(context: &str, e: bollard::errors::Error) -> ExecutionFault {
    ExecutionFault::Unavailable(format!("{}: {}", context, e))
}

fn shell_quote(command: &str) -> String {
    format!("'{}'", command.replace('\'', r"'\''"))
}

/// Wrap the run command so GNU time records its peak RSS. Images without
/// `/usr/bin/time` run the command bare and report no memory.
fn measured(run: &str) -> String {
    let quoted = shell_quote(run);
    format!(
        "rm -f {file}; if [ -x /usr/bin/time ]; then exec /usr/bin/time -f %M -o {file} sh -c {cmd}; else exec sh -c {cmd}; fi",
        file = PEAK_RSS_FILE,
        cmd = quoted
    )
}

/// Peak RSS from GNU time's output file. Non-zero exits add a status line
/// before the figure, so the last line is the one that counts.
fn parse_peak_rss(report: &str) -> Option<Kilobytes> {
    report
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse().ok())
        .map(Kilobytes)
}

/// Run a shell command inside the container, optionally feeding stdin.
async fn exec(
    docker: &Docker,
    container_id: &str,
    command: &str,
    stdin: Option<&[u8]>,
) -> Result<ExecOutput, bollard::errors::Error> {
    let exec = docker
        .create_exec(
            container_id,
            CreateExecOptions {
                cmd: Some(vec!["sh", "-c", command]),
                attach_stdin: Some(stdin.is_some()),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                working_dir: Some(WORK_DIR),
                ..Default::default()
            },
        )
        .await?;

    let start_config = StartExecOptions {
        detach: false,
        ..Default::default()
    };

    let mut stdout = String::new();
    let mut stderr = String::new();

    if let StartExecResults::Attached { mut output, mut input } =
        docker.start_exec(&exec.id, Some(start_config)).await?
    {
        let feed = async {
            if let Some(data) = stdin {
                input.write_all(data).await?;
            }
            input.shutdown().await
        };

        let drain = async {
            while let Some(msg) = output.next().await {
                match msg? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
            Ok::<(), bollard::errors::Error>(())
        };

        let (fed, drained) = tokio::join!(feed, drain);
        drained?;
        if let Err(e) = fed {
            // Programs that never read stdin close the pipe early
            debug!(error = %e, "stdin not fully consumed");
        }
    }

    let inspect = docker.inspect_exec(&exec.id).await?;

    Ok(ExecOutput {
        stdout,
        stderr,
        exit_code: inspect.exit_code,
    })
}

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the local Docker daemon
    pub fn connect() -> Result<Self, ExecutionFault> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| unavailable("Failed to connect to Docker daemon", e))?;
        Ok(Self { docker })
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<(), ExecutionFault> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling now");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| unavailable("Failed to pull Docker image", e))?;
        }

        info!(image = %image, "Image pulled successfully");
        Ok(())
    }

    /// Create and start an idle container the unit is then exec'd into.
    async fn start_container(&self, language: &LanguageConfig) -> Result<ContainerGuard, ExecutionFault> {
        let container_name = format!("arbiter-{}", uuid::Uuid::new_v4());

        let config = Config {
            image: Some(language.image.clone()),
            // sleep runs as PID 1, which `kill -9 -1` never reaches
            cmd: Some(vec![
                "sleep".to_string(),
                CONTAINER_KEEPALIVE.as_secs().to_string(),
            ]),
            entrypoint: Some(vec![]),
            working_dir: Some(WORK_DIR.to_string()),
            network_disabled: Some(true), // SECURITY: No network access
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(language.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((f64::from(language.cpu_limit) * 1_000_000_000.0) as i64),
                readonly_rootfs: Some(false), // compilers write next to the source
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| unavailable("Failed to create Docker container", e))?;

        // Guard goes up before start so a failed start still cleans up
        let guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container.id,
        };

        self.docker
            .start_container(&guard.container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| unavailable("Failed to start Docker container", e))?;

        Ok(guard)
    }

    /// Compile the unit. `Some` carries the compiler's complaint.
    async fn compile(&self, container_id: &str, compile_cmd: &str) -> Result<Option<String>, ExecutionFault> {
        let compile_start = Instant::now();
        let compiled = tokio::time::timeout(COMPILE_TIMEOUT, exec(&self.docker, container_id, compile_cmd, None)).await;

        let compile_error = match compiled {
            Ok(Ok(output)) if output.exit_code == Some(0) => {
                if !output.stderr.is_empty() {
                    debug!(warnings = %output.stderr.trim(), "Compiled with warnings");
                }
                None
            }
            Ok(Ok(output)) => Some(format!("{}{}", output.stdout, output.stderr)),
            Ok(Err(e)) => return Err(unavailable("Compilation process failed", e)),
            Err(_) => Some(format!(
                "Compilation timed out after {}s",
                COMPILE_TIMEOUT.as_secs()
            )),
        };

        let compile_ms = Millis::from_duration(compile_start.elapsed());
        match &compile_error {
            Some(compile_output) => warn!(
                compile_ms = compile_ms.get(),
                error_preview = compile_output.lines().next().unwrap_or(""),
                "Compilation failed"
            ),
            None => debug!(compile_ms = compile_ms.get(), "Compilation succeeded"),
        }
        Ok(compile_error)
    }
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    #[tracing::instrument(skip(self, language, source), fields(language = %language.name, image = %language.image))]
    async fn prepare(&self, language: &LanguageConfig, source: &str) -> Result<Prepared, ExecutionFault> {
        self.ensure_image(&language.image).await?;

        let container = self.start_container(language).await?;
        let container_id = container.container_id.as_str();

        // Step 1: write the executable unit
        let file_path = format!("{}/{}", WORK_DIR, language.execution.file_name);
        let write = exec(
            &self.docker,
            container_id,
            &format!("cat > {}", file_path),
            Some(source.as_bytes()),
        )
        .await
        .map_err(|e| unavailable("Failed to write source code", e))?;
        if write.exit_code != Some(0) {
            return Err(ExecutionFault::Unavailable(format!(
                "Failed to write source code: {}",
                write.stderr.trim()
            )));
        }

        // Step 2: compile once, if the language needs it
        if let Some(compile_cmd) = &language.execution.compile {
            if let Some(compile_output) = self.compile(container_id, compile_cmd).await? {
                return Ok(Prepared::Rejected(ExecutionResult {
                    stdout: String::new(),
                    stderr: String::new(),
                    compile_output,
                    status: ExecutionStatus::CompilationError,
                    time: Millis::default(),
                    memory: Kilobytes::default(),
                }));
            }
        }

        Ok(Prepared::Ready(Box::new(DockerUnit {
            docker: self.docker.clone(),
            run_command: measured(&language.execution.run),
            container,
            turn: Mutex::new(()),
        })))
        // Container removal happens in ContainerGuard::drop once the unit is dropped
    }
}

/// A compiled unit living in its own container.
struct DockerUnit {
    docker: Docker,
    run_command: String,
    container: ContainerGuard,
    /// Runs share the container's cgroup, so they take turns.
    turn: Mutex<()>,
}

impl DockerUnit {
    fn container_id(&self) -> &str {
        &self.container.container_id
    }

    /// Kill everything but the keepalive after a timed-out run.
    async fn stop_processes(&self) {
        if let Err(e) = exec(&self.docker, self.container_id(), "kill -9 -1", None).await {
            warn!(container_id = %self.container_id(), error = %e, "Failed to kill timed-out run");
        }
    }

    async fn peak_memory(&self) -> Kilobytes {
        let command = format!("cat {} 2>/dev/null", PEAK_RSS_FILE);
        match exec(&self.docker, self.container_id(), &command, None).await {
            Ok(output) => parse_peak_rss(&output.stdout).unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "Peak memory unavailable");
                Kilobytes::default()
            }
        }
    }
}

#[async_trait]
impl PreparedUnit for DockerUnit {
    #[tracing::instrument(skip(self, request), fields(language = %request.language, container_id = %self.container_id()))]
    async fn run(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionResult, ExecutionFault> {
        let _turn = self.turn.lock().await;

        // Run against the test input under the hard timeout
        let run_start = Instant::now();
        let run = tokio::time::timeout(
            request.timeout.as_duration(),
            exec(&self.docker, self.container_id(), &self.run_command, Some(request.stdin.as_bytes())),
        )
        .await;
        let elapsed = Millis::from_duration(run_start.elapsed());

        let output = match run {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(unavailable("Test execution failed", e)),
            Err(_) => {
                warn!(timeout_ms = request.timeout.get(), "Execution timed out, killing run");
                self.stop_processes().await;
                return Ok(ExecutionResult::timed_out(elapsed));
            }
        };

        let memory = self.peak_memory().await;

        let (status, mut stderr) = match output.exit_code {
            Some(code) => (ExecutionStatus::from_exit_code(code), output.stderr),
            None => (ExecutionStatus::Unknown { code: -1 }, output.stderr),
        };
        if status == (ExecutionStatus::RuntimeError { exit_code: 139 }) {
            stderr.push_str("\n[Container killed: segmentation fault]");
        }

        debug!(status = ?status, time_ms = elapsed.get(), memory_kb = memory.get(), "Run finished");

        Ok(ExecutionResult {
            stdout: output.stdout,
            stderr,
            compile_output: String::new(),
            status,
            time: elapsed,
            memory,
        })
    }
}
