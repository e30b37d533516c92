use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::config::ConversionJob;
use crate::config::ConverterSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One way of turning a checkpoint into a bundle.
pub trait ConversionBackend {
    fn name(&self) -> &str;

    /// Capability check; an error means the backend is skipped, not that it failed.
    fn probe(&self, job: &ConversionJob) -> Result<()>;

    fn convert(&self, job: &ConversionJob) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Exports the checkpoint to a `.tflite` model.
    Convert,
    /// Packs an already exported `.tflite` model with its tokenizer.
    Bundle,
}

/// Runs one library entry point through a Python interpreter.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    name: String,
    program: PathBuf,
    module: String,
    stage: Stage,
    envs: Vec<(String, String)>,
    timeout: Duration,
    probe_timeout: Duration,
}

impl CommandBackend {
    pub fn new(program: impl Into<PathBuf>, module: impl Into<String>, stage: Stage) -> Self {
        let module = module.into();
        let defaults = ConverterSettings::default();
        Self {
            name: module.rsplit('.').next().unwrap_or(&module).to_string(),
            program: program.into(),
            module,
            stage,
            envs: Vec::new(),
            timeout: Duration::from_secs(defaults.timeout_secs),
            probe_timeout: Duration::from_secs(defaults.probe_timeout_secs),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeout: Duration, probe_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.probe_timeout = probe_timeout;
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn python_module(settings: &ConverterSettings, module: &str, stage: Stage) -> Self {
        let backend = Self::new(&settings.program, module, stage).with_timeouts(
            Duration::from_secs(settings.timeout_secs),
            Duration::from_secs(settings.probe_timeout_secs),
        );
        match &settings.python_path {
            Some(path) => backend.with_env("PYTHONPATH", path.display().to_string()),
            None => backend,
        }
    }

    pub fn script(&self, job: &ConversionJob) -> String {
        match self.stage {
            Stage::Convert => job.conversion.python_script(&self.module),
            Stage::Bundle => job.bundle.python_script(&self.module),
        }
    }

    fn expected_output<'a>(&self, job: &'a ConversionJob) -> &'a Path {
        match self.stage {
            Stage::Convert => &job.conversion.output_path,
            Stage::Bundle => &job.bundle.output_filename,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.envs(self.envs.iter().map(|(key, value)| (key, value)));
        command.stdin(Stdio::null());
        command
    }
}

impl ConversionBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self, job: &ConversionJob) -> Result<()> {
        if self.stage == Stage::Bundle && !job.bundle.tflite_model.exists() {
            return Err(anyhow!(
                "no exported model at {}",
                job.bundle.tflite_model.display()
            ));
        }
        let mut command = self.command();
        command
            .arg("-c")
            .arg(format!("import {}", self.module))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = run_with_timeout(&mut command, self.probe_timeout)
            .with_context(|| format!("check import with {:?}", self.program))?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow!(
                "{} is not importable (import check exited with {:?})",
                self.module,
                status.code()
            ))
        }
    }

    fn convert(&self, job: &ConversionJob) -> Result<PathBuf> {
        let output = self.expected_output(job);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).context("create output directory")?;
        }
        let mut command = self.command();
        command
            .arg("-c")
            .arg(self.script(job))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        tracing::debug!("running {} via {:?}", self.module, self.program);

        let status = run_with_timeout(&mut command, self.timeout)
            .with_context(|| format!("failed to run {} via {:?}", self.name, self.program))?;
        if !status.success() {
            return Err(anyhow!(
                "{} exited with status {:?}",
                self.name,
                status.code()
            ));
        }
        if !output.exists() {
            return Err(anyhow!(
                "{} finished but produced no {}",
                self.name,
                output.display()
            ));
        }
        Ok(output.to_path_buf())
    }
}

fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<ExitStatus> {
    let mut child = command.spawn().context("failed to spawn command")?;
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("failed polling command")? {
            return Ok(status);
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("command exceeded {:?} timeout", timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
