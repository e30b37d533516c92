use std::path::{Path, PathBuf};

use super::backend::{CommandBackend, ConversionBackend, Stage};
use super::config::ConversionJob;
use super::manual::{self, Attempt};
use crate::config::ConverterSettings;
use crate::hub::HubClient;
use crate::models::{CatalogEntry, ModelSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted(PathBuf),
    /// No backend produced a bundle; a file with the manual procedure was written instead.
    DeferredManual { instructions: PathBuf },
    Failed(String),
}

pub struct Converter {
    backends: Vec<Box<dyn ConversionBackend>>,
}

impl Converter {
    pub fn new(backends: Vec<Box<dyn ConversionBackend>>) -> Self {
        Self { backends }
    }

    /// Checkpoint converter first, bundler second.
    pub fn from_settings(settings: &ConverterSettings) -> Self {
        Self::new(vec![
            Box::new(CommandBackend::python_module(
                settings,
                &settings.converter_module,
                Stage::Convert,
            )),
            Box::new(CommandBackend::python_module(
                settings,
                &settings.bundler_module,
                Stage::Bundle,
            )),
        ])
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    /// Backends run in order. One that yields an intermediate artifact hands over to
    /// the next; the first to produce the bundle ends the chain.
    pub fn run(&self, job: &ConversionJob) -> ConversionOutcome {
        if job.output_path.exists() {
            tracing::info!("{} already converted", job.output_path.display());
            return ConversionOutcome::Converted(job.output_path.clone());
        }

        let mut attempts = Vec::new();
        for backend in &self.backends {
            if let Err(error) = backend.probe(job) {
                tracing::info!("skipping {}: {error:#}", backend.name());
                attempts.push(Attempt {
                    backend: backend.name().to_string(),
                    reason: format!("unavailable: {error:#}"),
                });
                continue;
            }
            tracing::info!("converting {} with {}", job.model_id, backend.name());
            match backend.convert(job) {
                Ok(path) if path == job.output_path => return ConversionOutcome::Converted(path),
                Ok(path) => tracing::info!("{} exported {}", backend.name(), path.display()),
                Err(error) => {
                    tracing::warn!("{} failed: {error:#}", backend.name());
                    attempts.push(Attempt {
                        backend: backend.name().to_string(),
                        reason: format!("{error:#}"),
                    });
                }
            }
        }

        match manual::write_instructions(job, &attempts) {
            Ok(instructions) => ConversionOutcome::DeferredManual { instructions },
            Err(error) => ConversionOutcome::Failed(format!(
                "all conversion backends failed and instructions could not be written: {error:#}"
            )),
        }
    }
}

/// Snapshots the entry's hub repository and converts it into `<dir>/<filename>`.
pub fn convert_entry(
    hub: &dyn HubClient,
    converter: &Converter,
    entry: &CatalogEntry,
    dir: &Path,
) -> ConversionOutcome {
    let ModelSource::Hub { repo } = &entry.source else {
        return ConversionOutcome::Failed(format!(
            "{} is a pre-built bundle; download it instead",
            entry.id
        ));
    };

    let output_path = entry.path(dir);
    if output_path.exists() {
        return ConversionOutcome::Converted(output_path);
    }
    if let Err(error) = std::fs::create_dir_all(dir) {
        return ConversionOutcome::Failed(format!("create {}: {error}", dir.display()));
    }

    let checkpoint = match hub.snapshot(repo) {
        Ok(path) => path,
        Err(error) => {
            return ConversionOutcome::Failed(format!("snapshot of {repo} failed: {error:#}"))
        }
    };
    tracing::info!("{repo} available at {}", checkpoint.display());

    converter.run(&ConversionJob::new(entry, &checkpoint, &output_path))
}
