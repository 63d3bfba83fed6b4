//! Engine adapter that runs each trajectory as an external program.
//!
//! Every trajectory gets a private working directory under
//! [`CommandSpec::work_root`], named after its [`TrajectoryId`]. Before the
//! program starts the adapter writes `positions.xyz` (Å) and `velocities.xyz`
//! (m/s) there. The program reports back through two files in the same
//! directory:
//!
//! - `basin`: the committed basin as an integer, or empty if it did not commit.
//! - `frames.xyz`: at least two frames, the configurations at Δt and 2Δt.
//!
//! Arguments may reference `{dir}`, `{positions}`, `{velocities}` and `{id}`.

use super::simulator::{EngineLauncher, LaunchError, SimulationEngine, TrajectoryId};
use crate::core::io::xyz;
use crate::core::models::configuration::Configuration;
use crate::core::models::outcome::{Basin, TrajectoryOutcome};
use crate::core::models::velocity::Velocities;
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

pub const POSITIONS_FILE: &str = "positions.xyz";
pub const VELOCITIES_FILE: &str = "velocities.xyz";
pub const BASIN_FILE: &str = "basin";
pub const FRAMES_FILE: &str = "frames.xyz";
const STDOUT_FILE: &str = "stdout.log";
const STDERR_FILE: &str = "stderr.log";
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_root: PathBuf,
    pub poll_interval: Duration,
    /// Wall-clock limit after which the process is killed and the branch counts as not committed.
    pub timeout: Option<Duration>,
    pub keep_files: bool,
}

#[derive(Debug, Clone)]
pub struct CommandLauncher {
    spec: Arc<CommandSpec>,
}

impl CommandLauncher {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec: Arc::new(spec),
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

impl EngineLauncher for CommandLauncher {
    type Engine = CommandEngine;

    fn configure(&self, seed: &Configuration, id: TrajectoryId) -> Result<CommandEngine, LaunchError> {
        Ok(CommandEngine {
            spec: Arc::clone(&self.spec),
            dir: self.spec.work_root.join(id.to_string()),
            id,
            reference: seed.clone(),
            positions: None,
            velocities: None,
        })
    }
}

pub struct CommandEngine {
    spec: Arc<CommandSpec>,
    id: TrajectoryId,
    dir: PathBuf,
    reference: Configuration,
    positions: Option<Configuration>,
    velocities: Option<Velocities>,
}

impl SimulationEngine for CommandEngine {
    fn set_positions(&mut self, configuration: &Configuration) -> Result<(), LaunchError> {
        self.reference.check_same_atoms(configuration)?;
        self.positions = Some(configuration.clone());
        Ok(())
    }

    fn set_velocities(&mut self, velocities: &Velocities) -> Result<(), LaunchError> {
        velocities.check_len(self.reference.len())?;
        self.velocities = Some(velocities.clone());
        Ok(())
    }

    fn run(self) -> impl Future<Output = Result<TrajectoryOutcome, LaunchError>> + Send {
        async move {
            let start = self.positions.as_ref().ok_or(LaunchError::NotReady("positions"))?;
            let velocities = self
                .velocities
                .as_ref()
                .ok_or(LaunchError::NotReady("velocities"))?;

            let result = self.execute(start, velocities).await;
            if !self.spec.keep_files {
                if let Err(e) = tokio::task::block_in_place(|| fs::remove_dir_all(&self.dir)) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(dir = %self.dir.display(), error = %e, "Failed to remove trajectory directory");
                    }
                }
            }
            result
        }
    }
}

enum Completion {
    Exited(ExitStatus),
    TimedOut,
}

impl CommandEngine {
    async fn execute(
        &self,
        start: &Configuration,
        velocities: &Velocities,
    ) -> Result<TrajectoryOutcome, LaunchError> {
        tokio::task::block_in_place(|| self.prepare(start, velocities)).map_err(|source| {
            LaunchError::Prepare {
                id: self.id,
                source,
            }
        })?;

        let completion = self.wait_for_process().await?;
        tokio::task::block_in_place(|| self.collect(completion, start))
    }

    /// Reads what the finished program left in the trajectory directory.
    fn collect(
        &self,
        completion: Completion,
        start: &Configuration,
    ) -> Result<TrajectoryOutcome, LaunchError> {
        match completion {
            Completion::TimedOut => {
                warn!(trajectory = %self.id, "Trajectory timed out; branch counts as not committed");
                Ok(TrajectoryOutcome::new(None, self.frames_or_start(start)))
            }
            Completion::Exited(status) => {
                let basin_path = self.dir.join(BASIN_FILE);
                if !basin_path.exists() {
                    if status.success() {
                        return Err(self.output_error(&basin_path, "program exited without writing it"));
                    }
                    return Err(LaunchError::Process {
                        id: self.id,
                        status: status.to_string(),
                        stderr: self.stderr_tail(),
                    });
                }
                let basin = self.read_basin(&basin_path)?;
                let frames = match basin {
                    Some(_) => self.read_frames(start)?,
                    None => self.frames_or_start(start),
                };
                debug!(trajectory = %self.id, %status, ?basin, "Engine program finished");
                Ok(TrajectoryOutcome::new(basin, frames))
            }
        }
    }

    fn prepare(&self, start: &Configuration, velocities: &Velocities) -> io::Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::create_dir_all(&self.dir)?;

        let mut positions = BufWriter::new(File::create(self.dir.join(POSITIONS_FILE))?);
        xyz::write_configuration(&mut positions, start)?;
        positions.flush()?;

        let mut vel = BufWriter::new(File::create(self.dir.join(VELOCITIES_FILE))?);
        xyz::write_velocities(&mut vel, start.atoms(), velocities)?;
        vel.flush()
    }

    fn substitute(&self, arg: &str) -> String {
        arg.replace("{dir}", &self.dir.to_string_lossy())
            .replace("{positions}", &self.dir.join(POSITIONS_FILE).to_string_lossy())
            .replace("{velocities}", &self.dir.join(VELOCITIES_FILE).to_string_lossy())
            .replace("{id}", &self.id.to_string())
    }

    async fn wait_for_process(&self) -> Result<Completion, LaunchError> {
        let prepare_error = |source: io::Error| LaunchError::Prepare {
            id: self.id,
            source,
        };
        let stdout = File::create(self.dir.join(STDOUT_FILE)).map_err(prepare_error)?;
        let stderr = File::create(self.dir.join(STDERR_FILE)).map_err(prepare_error)?;

        let mut command = Command::new(&self.spec.program);
        command
            .args(self.spec.args.iter().map(|a| self.substitute(a)))
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            id: self.id,
            source,
        })?;
        debug!(trajectory = %self.id, program = %self.spec.program.display(), "Engine program started");

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Completion::Exited(status)),
                Ok(None) => {}
                Err(e) => {
                    return Err(LaunchError::Process {
                        id: self.id,
                        status: format!("wait failed: {e}"),
                        stderr: self.stderr_tail(),
                    });
                }
            }
            if self.spec.timeout.is_some_and(|limit| started.elapsed() >= limit) {
                if let Err(e) = child.kill().await {
                    warn!(trajectory = %self.id, error = %e, "Failed to kill timed-out engine program");
                }
                return Ok(Completion::TimedOut);
            }
            tokio::time::sleep(self.spec.poll_interval).await;
        }
    }

    fn read_basin(&self, path: &Path) -> Result<Option<Basin>, LaunchError> {
        let text = fs::read_to_string(path).map_err(|e| self.output_error(path, e))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse()
            .map(Some)
            .map_err(|_| self.output_error(path, format!("'{text}' is not a basin number")))
    }

    fn read_frames(&self, start: &Configuration) -> Result<[Configuration; 2], LaunchError> {
        let path = self.dir.join(FRAMES_FILE);
        let mut file = File::open(&path).map_err(|e| self.output_error(&path, e))?;
        let frames = xyz::read_frames(&mut file).map_err(|e| self.output_error(&path, e))?;
        match frames.as_slice() {
            [first, second, ..] => Ok([
                first
                    .to_configuration_like(start)
                    .map_err(|e| self.output_error(&path, e))?,
                second
                    .to_configuration_like(start)
                    .map_err(|e| self.output_error(&path, e))?,
            ]),
            _ => Err(self.output_error(
                &path,
                format!("expected at least 2 frames, found {}", frames.len()),
            )),
        }
    }

    /// Offset frames for a branch that did not commit; they are never used as a base.
    fn frames_or_start(&self, start: &Configuration) -> [Configuration; 2] {
        self.read_frames(start)
            .unwrap_or_else(|_| [start.clone(), start.clone()])
    }

    fn stderr_tail(&self) -> String {
        let bytes = fs::read(self.dir.join(STDERR_FILE)).unwrap_or_default();
        let tail = &bytes[bytes.len().saturating_sub(STDERR_TAIL_BYTES)..];
        String::from_utf8_lossy(tail).trim().to_string()
    }

    fn output_error(&self, path: &Path, message: impl ToString) -> LaunchError {
        LaunchError::Output {
            id: self.id,
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}
