//! Command handlers behind the `llmhub-models` subcommands.
//!
//! Every handler reports through the [`Console`] and returns normally; a failed
//! item is a printed message, never a process error.

use std::path::Path;

use anyhow::Result;

use crate::config::Settings;
use crate::convert::{manual, Converter};
use crate::hub::auth::{self, AuthStatus};
use crate::hub::HubClient;
use crate::models::{
    self, format_megabytes, place_assets, scan_directory, verify_artifact, Catalog,
    CatalogEntry, Fetcher, ItemOutcome, SourceKind, Verification,
};
use crate::output::Console;

const INTEGRATION_GUIDE: &str = r#"Android Integration Guide
=========================
1. Your models are now in: {assets}

2. Load a model from assets:

   val modelPath = "models/{example}"
   val llmInference = LlmInference.createFromAsset(context, modelPath)

3. Or load it from a file path:

   val modelFile = File(context.getExternalFilesDir(null), "models/{example}")
   val llmInference = LlmInference.createFromFile(context, modelFile.absolutePath)

4. Rebuild and run the app.
"#;

pub fn list(catalog: &Catalog, dir: &Path, console: &mut Console) {
    for kind in [SourceKind::Url, SourceKind::Hub] {
        let entries = catalog.entries_of(kind);
        if entries.is_empty() {
            continue;
        }
        console.heading(match kind {
            SourceKind::Url => "Models available for download",
            SourceKind::Hub => "Models available for conversion",
        });
        for entry in entries {
            describe_entry(entry, dir, console);
        }
        console.blank();
    }
}

fn describe_entry(entry: &CatalogEntry, dir: &Path, console: &mut Console) {
    let marker = if entry.path(dir).exists() {
        " [present]"
    } else {
        ""
    };
    console.line(format!("{}{marker}", entry.id));
    console.line(format!("   Name: {}", entry.name));
    if !entry.description.is_empty() {
        console.line(format!("   Description: {}", entry.description));
    }
    match entry.kind() {
        SourceKind::Url => console.line(format!("   File: {}", entry.filename)),
        SourceKind::Hub => console.line(format!("   Repository: {}", entry.source.location())),
    }
    if !entry.size.is_empty() {
        console.line(format!("   Size: {}", entry.size));
    }
    if let Some(quantization) = entry.quantization {
        console.line(format!("   Quantization: {quantization}"));
    }
    if let Some(performance) = &entry.performance {
        console.line(format!("   Performance: {performance}"));
    }
    if let Some(context_length) = entry.context_length {
        console.line(format!("   Context length: {context_length} tokens"));
    }
}

pub fn download(
    fetcher: &dyn Fetcher,
    catalog: &Catalog,
    id: &str,
    dir: &Path,
    console: &mut Console,
) -> ItemOutcome {
    models::download_model(fetcher, catalog, id, dir, console)
}

pub fn download_all(
    fetcher: &dyn Fetcher,
    catalog: &Catalog,
    dir: &Path,
    console: &mut Console,
) {
    console.heading(&format!("Downloading all models into {}", dir.display()));
    models::download_all(fetcher, catalog, dir, console);
}

pub fn convert(
    hub: &dyn HubClient,
    converter: &Converter,
    catalog: &Catalog,
    id: &str,
    dir: &Path,
    console: &mut Console,
) -> ItemOutcome {
    models::convert_model(hub, converter, catalog, id, dir, console)
}

pub fn convert_all(
    hub: &dyn HubClient,
    converter: &Converter,
    catalog: &Catalog,
    dir: &Path,
    console: &mut Console,
) {
    console.heading(&format!("Converting all models into {}", dir.display()));
    console.line(format!(
        "Conversion chain: {} -> manual instructions",
        converter.backend_names().join(" -> ")
    ));
    models::convert_all(hub, converter, catalog, dir, console);
}

/// Copies built bundles into the application's asset directory.
pub fn setup(settings: &Settings, console: &mut Console) -> Result<()> {
    console.heading("Setting up Android models");
    let report = place_assets(&settings.models_dir, &settings.assets_dir, &settings.asset_suffix)?;
    console.line(format!("Assets directory: {}", settings.assets_dir.display()));

    if report.source_missing || report.is_empty() {
        console.line(format!(
            "No .{} files found in {}",
            settings.asset_suffix,
            settings.models_dir.display()
        ));
        console.line("Run a download or conversion command first.");
        return Ok(());
    }

    for placed in &report.copied {
        console.line(format!(
            "   Copied {} ({}) -> {}",
            placed.name,
            format_megabytes(placed.bytes),
            placed.destination.display()
        ));
    }
    for (name, reason) in &report.failed {
        console.line(format!("   Failed to copy {name}: {reason}"));
    }

    let example = report
        .copied
        .first()
        .map(|placed| placed.name.as_str())
        .unwrap_or("model.task");
    console.blank();
    console.line(
        INTEGRATION_GUIDE
            .replace("{assets}", &settings.assets_dir.display().to_string())
            .replace("{example}", example),
    );
    Ok(())
}

pub fn check(settings: &Settings, console: &mut Console) -> Result<()> {
    console.heading("Model status");
    let suffix = settings.asset_suffix.as_str();
    for (label, dir) in [
        ("Models directory", &settings.models_dir),
        ("Android assets", &settings.assets_dir),
    ] {
        let status = scan_directory(dir, &[suffix])?;
        console.blank();
        console.line(format!("{label} ({}):", status.path.display()));
        if !status.exists {
            console.line("   Directory doesn't exist");
        } else if status.files.is_empty() {
            console.line(format!("   No .{suffix} files found"));
        } else {
            for (name, bytes) in &status.files {
                console.line(format!("   {name} ({})", format_megabytes(*bytes)));
            }
        }
    }
    Ok(())
}

/// Returns whether the artifact is present and consistent with the catalog.
pub fn verify(catalog: &Catalog, id: &str, dir: &Path, console: &mut Console) -> Result<bool> {
    let entry = match catalog.find(id) {
        Ok(entry) => entry,
        Err(error) => {
            console.line(format!("Unknown model: {error}"));
            return Ok(false);
        }
    };

    let path = entry.path(dir);
    let verification = verify_artifact(entry, &path)?;
    match &verification {
        Verification::Missing => console.line(format!("{} is missing", path.display())),
        Verification::Matched { sha256 } => {
            console.line(format!("{} matches sha256 {sha256}", path.display()))
        }
        Verification::Unpinned { sha256, bytes } => console.line(format!(
            "{} ({}) has sha256 {sha256}; the catalog pins no digest",
            path.display(),
            format_megabytes(*bytes)
        )),
        Verification::SizeMismatch { expected, actual } => console.line(format!(
            "{} is {actual} bytes, expected {expected}",
            path.display()
        )),
        Verification::DigestMismatch { expected, actual } => console.line(format!(
            "{} has sha256 {actual}, expected {expected}",
            path.display()
        )),
    }
    Ok(verification.is_ok())
}

/// Reports the hub identity and writes the manual download script either way.
pub fn auth(
    hub: &dyn HubClient,
    catalog: &Catalog,
    dir: &Path,
    console: &mut Console,
) -> Result<()> {
    console.heading("Hub authentication");
    match auth::check_auth(hub) {
        AuthStatus::LoggedIn(name) => {
            console.line(format!("Logged in as: {name}"));
            console.line("Gated repositories still require the license to be accepted once.");
        }
        AuthStatus::Anonymous => {
            console.line("Not logged in.");
            console.blank();
            console.line(auth::remediation_steps(catalog));
        }
        AuthStatus::Unreachable(reason) => {
            console.line(format!("Could not query the hub: {reason}"));
            console.blank();
            console.line(auth::remediation_steps(catalog));
        }
    }

    console.heading("Direct download links");
    console.line(auth::direct_links(catalog, dir));
    let script = auth::write_manual_download_script(catalog, dir)?;
    console.line(format!("Manual download script written to {}", script.display()));
    Ok(())
}

pub fn guide(console: &mut Console) {
    console.line(manual::guide_text());
}
