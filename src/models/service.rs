use std::path::{Path, PathBuf};

use crate::convert::{convert_entry, ConversionOutcome, Converter};
use crate::hub::HubClient;
use crate::output::Console;

use super::catalog::{Catalog, CatalogEntry, SourceKind};
use super::download::{download_with_progress, DownloadPlan, DownloadStatus, Fetcher};
use super::metadata::format_megabytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed(PathBuf),
    Skipped(PathBuf),
    /// Conversion handed off to a human; the path points at the instructions.
    Deferred(PathBuf),
    Failed(String),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ItemOutcome::Failed(_))
    }
}

impl From<ConversionOutcome> for ItemOutcome {
    fn from(outcome: ConversionOutcome) -> Self {
        match outcome {
            ConversionOutcome::Converted(path) => ItemOutcome::Completed(path),
            ConversionOutcome::DeferredManual { instructions } => {
                ItemOutcome::Deferred(instructions)
            }
            ConversionOutcome::Failed(reason) => ItemOutcome::Failed(reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    items: Vec<(String, ItemOutcome)>,
}

impl BatchSummary {
    pub fn push(&mut self, id: impl Into<String>, outcome: ItemOutcome) {
        self.items.push((id.into(), outcome));
    }

    pub fn items(&self) -> &[(String, ItemOutcome)] {
        &self.items
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, outcome)| outcome.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn report(&self, console: &mut Console, verb: &str) {
        console.blank();
        console.heading(&format!("{} summary", capitalize(verb)));
        console.line(format!("Succeeded: {} of {}", self.succeeded(), self.total()));
        for (id, outcome) in &self.items {
            match outcome {
                ItemOutcome::Completed(path) => {
                    console.line(format!("   - {id}: {}", path.display()))
                }
                ItemOutcome::Skipped(path) => {
                    console.line(format!("   - {id}: already present at {}", path.display()))
                }
                ItemOutcome::Deferred(path) => console.line(format!(
                    "   - {id}: manual steps written to {}",
                    path.display()
                )),
                ItemOutcome::Failed(_) => {}
            }
        }
        if self.failed() > 0 {
            console.line(format!("Failed: {}", self.failed()));
            for (id, outcome) in &self.items {
                if let ItemOutcome::Failed(reason) = outcome {
                    console.line(format!("   - {id}: {reason}"));
                }
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Downloads one pre-built bundle. Unknown ids are reported, not raised.
pub fn download_model(
    fetcher: &dyn Fetcher,
    catalog: &Catalog,
    id: &str,
    dir: &Path,
    console: &mut Console,
) -> ItemOutcome {
    match catalog.lookup(id, SourceKind::Url) {
        Ok(entry) => download_entry(fetcher, entry, dir, console),
        Err(error) => {
            console.line(format!("Unknown model: {error}"));
            ItemOutcome::Failed(error.to_string())
        }
    }
}

pub fn download_all(
    fetcher: &dyn Fetcher,
    catalog: &Catalog,
    dir: &Path,
    console: &mut Console,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for entry in catalog.entries_of(SourceKind::Url) {
        let outcome = download_entry(fetcher, entry, dir, console);
        summary.push(entry.id.clone(), outcome);
    }
    summary.report(console, "download");
    summary
}

fn download_entry(
    fetcher: &dyn Fetcher,
    entry: &CatalogEntry,
    dir: &Path,
    console: &mut Console,
) -> ItemOutcome {
    console.blank();
    console.line(format!("Downloading {} ({})", entry.name, entry.size));
    let plan = match DownloadPlan::for_entry(entry, dir) {
        Ok(plan) => plan,
        Err(error) => return ItemOutcome::Failed(error.to_string()),
    };
    console.line(format!("   URL: {}", plan.uri));

    let result = download_with_progress(fetcher, &plan, |progress| console.progress(progress));
    console.finish_progress();
    let status = match result {
        Ok(status) => status,
        Err(error) => {
            tracing::warn!("download of {} failed: {error}", entry.id);
            console.line(format!("   Download failed: {error}"));
            return ItemOutcome::Failed(error.to_string());
        }
    };
    let path = status.path().to_path_buf();
    match status {
        DownloadStatus::Skipped { .. } => {
            console.line(format!("   Already present: {}", path.display()));
            ItemOutcome::Skipped(path)
        }
        DownloadStatus::Downloaded { bytes, .. } => {
            tracing::info!("{} downloaded ({bytes} bytes)", entry.id);
            console.line(format!(
                "   Saved {} ({})",
                path.display(),
                format_megabytes(bytes)
            ));
            ItemOutcome::Completed(path)
        }
    }
}

pub fn convert_model(
    hub: &dyn HubClient,
    converter: &Converter,
    catalog: &Catalog,
    id: &str,
    dir: &Path,
    console: &mut Console,
) -> ItemOutcome {
    match catalog.lookup(id, SourceKind::Hub) {
        Ok(entry) => convert_one(hub, converter, entry, dir, console),
        Err(error) => {
            console.line(format!("Unknown model: {error}"));
            ItemOutcome::Failed(error.to_string())
        }
    }
}

pub fn convert_all(
    hub: &dyn HubClient,
    converter: &Converter,
    catalog: &Catalog,
    dir: &Path,
    console: &mut Console,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for entry in catalog.entries_of(SourceKind::Hub) {
        let outcome = convert_one(hub, converter, entry, dir, console);
        summary.push(entry.id.clone(), outcome);
    }
    summary.report(console, "conversion");
    summary
}

fn convert_one(
    hub: &dyn HubClient,
    converter: &Converter,
    entry: &CatalogEntry,
    dir: &Path,
    console: &mut Console,
) -> ItemOutcome {
    console.blank();
    console.line(format!("Converting {}", entry.name));
    console.line(format!("   Repository: {}", entry.source.location()));
    if !entry.size.is_empty() {
        console.line(format!("   Estimated size: {}", entry.size));
    }

    let outcome = ItemOutcome::from(convert_entry(hub, converter, entry, dir));
    match &outcome {
        ItemOutcome::Completed(path) => {
            console.line(format!("   Converted: {}", path.display()))
        }
        ItemOutcome::Deferred(path) => console.line(format!(
            "   Automatic conversion unavailable; follow {}",
            path.display()
        )),
        ItemOutcome::Failed(reason) => console.line(format!("   Conversion failed: {reason}")),
        ItemOutcome::Skipped(_) => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::convert::pipeline_tests::ScriptedBackend;
    use crate::hub::tests::FakeHub;
    use crate::models::catalog::tests::{hub_entry, url_entry};
    use crate::models::download::tests::FakeFetcher;
    use crate::output::console::tests::captured;

    fn mixed_catalog() -> Catalog {
        Catalog::from_entries(vec![
            url_entry("m1", "http://models.test/m1.task", "m1.task"),
            url_entry("m2", "http://models.test/broken.task", "m2.task"),
            url_entry("m3", "http://models.test/m3.task", "m3.task"),
            hub_entry("h1", "org/one", "h1.task"),
        ])
        .unwrap()
    }

    #[test]
    fn download_all_counts_every_entry_once() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = mixed_catalog();
        let mut fetcher = FakeFetcher::serving(b"bundle");
        fetcher.failing_urls = vec!["http://models.test/broken.task".into()];
        let (mut console, buffer) = captured();

        let summary = download_all(&fetcher, &catalog, dir.path(), &mut console);

        assert_eq!(summary.total(), catalog.entries_of(SourceKind::Url).len());
        assert_eq!(summary.succeeded() + summary.failed(), summary.total());
        assert_eq!(summary.failed(), 1);
        assert_eq!(fetcher.calls.get(), 3);
        assert!(dir.path().join("m1.task").exists());
        assert!(!dir.path().join("m2.task").exists());
        assert!(!dir.path().join("m2.task.part").exists());
        assert!(buffer.text().contains("Failed: 1"));
    }

    #[test]
    fn second_run_skips_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = mixed_catalog();
        let (mut console, _buffer) = captured();

        let first = FakeFetcher::serving(b"bundle");
        download_model(&first, &catalog, "m1", dir.path(), &mut console);
        let second = FakeFetcher::serving(b"bundle");
        let outcome = download_model(&second, &catalog, "m1", dir.path(), &mut console);

        assert_eq!(outcome, ItemOutcome::Skipped(dir.path().join("m1.task")));
        assert_eq!(second.calls.get(), 0);
    }

    #[test]
    fn unknown_id_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::serving(b"bundle");
        let (mut console, buffer) = captured();

        let outcome =
            download_model(&fetcher, &mixed_catalog(), "h1", dir.path(), &mut console);

        assert!(matches!(outcome, ItemOutcome::Failed(_)));
        assert_eq!(fetcher.calls.get(), 0);
        assert!(buffer.text().contains("available: m1, m2, m3"));
    }

    #[test]
    fn convert_all_defers_when_backends_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::from_entries(vec![
            hub_entry("h1", "org/one", "h1.task"),
            hub_entry("h2", "org/two", "h2.task"),
            url_entry("m1", "http://models.test/m1.task", "m1.task"),
        ])
        .unwrap();
        let hub = FakeHub::with_snapshot(dir.path().join("snapshot"));
        let (backend, calls) = ScriptedBackend::boxed("converter", false, false);
        let converter = Converter::new(vec![backend]);
        let (mut console, _buffer) = captured();

        let summary = convert_all(&hub, &converter, &catalog, dir.path(), &mut console);

        assert_eq!(summary.total(), 2);
        assert_eq!(summary.failed(), 0);
        assert!(summary
            .items()
            .iter()
            .all(|(_, outcome)| matches!(outcome, ItemOutcome::Deferred(_))));
        assert_eq!(calls.get(), 0);
        assert_eq!(*hub.snapshots.borrow(), vec!["org/one", "org/two"]);
    }

    #[test]
    fn convert_failures_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::from_entries(vec![
            hub_entry("h1", "org/one", "h1.task"),
            hub_entry("h2", "org/two", "h2.task"),
        ])
        .unwrap();
        fs::write(dir.path().join("h2.task"), b"bundle").unwrap();
        let hub = FakeHub::failing();
        let converter = Converter::new(Vec::new());
        let (mut console, _buffer) = captured();

        let summary = convert_all(&hub, &converter, &catalog, dir.path(), &mut console);

        assert_eq!(summary.total(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.items()[1].1,
            ItemOutcome::Completed(dir.path().join("h2.task"))
        );
    }
}
