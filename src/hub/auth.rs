use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::HubClient;
use crate::models::{Catalog, SourceKind};

pub const TOKEN_SETTINGS_URL: &str = "https://huggingface.co/settings/tokens";
pub const MANUAL_SCRIPT: &str = "manual_download.sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    LoggedIn(String),
    Anonymous,
    Unreachable(String),
}

pub fn check_auth(hub: &dyn HubClient) -> AuthStatus {
    match hub.whoami() {
        Ok(Some(name)) => AuthStatus::LoggedIn(name),
        Ok(None) => AuthStatus::Anonymous,
        Err(error) => {
            tracing::debug!("identity lookup failed: {error:#}");
            AuthStatus::Unreachable(format!("{error:#}"))
        }
    }
}

/// License pages of every catalog source, deduplicated, in catalog order.
fn license_pages(catalog: &Catalog) -> Vec<String> {
    let mut pages: Vec<String> = Vec::new();
    for entry in catalog.entries() {
        let page = entry.license_page();
        if !pages.contains(&page) {
            pages.push(page);
        }
    }
    pages
}

pub fn remediation_steps(catalog: &Catalog) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Gemma models require accepting a license agreement.");
    let _ = writeln!(text);
    let _ = writeln!(text, "Steps to get access:");
    let _ = writeln!(text, "1. Accept the license on each model page:");
    for page in license_pages(catalog) {
        let _ = writeln!(text, "   - {page}");
    }
    let _ = writeln!(text, "2. Create an access token at: {TOKEN_SETTINGS_URL}");
    let _ = writeln!(text, "3. Supply the token through the environment:");
    let _ = writeln!(text, "   export HF_TOKEN=your_token_here");
    let _ = writeln!(text, "   (PowerShell: $env:HF_TOKEN = 'your_token_here')");
    text
}

pub fn direct_links(catalog: &Catalog, dir: &Path) -> String {
    let mut text = String::new();
    for entry in catalog.entries_of(SourceKind::Url) {
        let target = entry.path(dir);
        let _ = writeln!(text, "{} ({})", entry.name, entry.size);
        let _ = writeln!(text, "   URL: {}", entry.source.location());
        let _ = writeln!(text, "   Save as: {}", target.display());
        let _ = writeln!(
            text,
            "   curl -L -o \"{}\" \"{}\"",
            target.display(),
            entry.source.location()
        );
    }
    text
}

pub fn write_manual_download_script(catalog: &Catalog, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(MANUAL_SCRIPT);

    let mut script = String::from("#!/bin/sh\n# Run after accepting the model licenses.\nset -e\n");
    let _ = writeln!(script, "mkdir -p \"{}\"", dir.display());
    for entry in catalog.entries_of(SourceKind::Url) {
        let target = entry.path(dir);
        let _ = writeln!(script);
        let _ = writeln!(script, "echo \"Downloading {} ({})...\"", entry.name, entry.size);
        let _ = writeln!(
            script,
            "[ -f \"{target}\" ] || curl -L -o \"{target}\" \"{url}\"",
            target = target.display(),
            url = entry.source.location()
        );
    }
    let _ = writeln!(script);
    let _ = writeln!(script, "echo \"Done. Check {}\"", dir.display());

    fs::write(&path, script).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .context("mark download script executable")?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::hub::tests::FakeHub;
    use crate::models::catalog::tests::{hub_entry, url_entry};

    fn catalog() -> Catalog {
        Catalog::from_entries(vec![
            url_entry(
                "m1",
                "https://huggingface.co/org/one/resolve/main/m1.task",
                "m1.task",
            ),
            url_entry(
                "m2",
                "https://huggingface.co/org/one/resolve/main/m2.task",
                "m2.task",
            ),
            hub_entry("h1", "google/gemma-3-4b-it", "h1.task"),
        ])
        .unwrap()
    }

    #[test]
    fn auth_status_follows_identity_lookup() {
        let mut hub = FakeHub::with_snapshot(PathBuf::from("/unused"));
        assert_eq!(check_auth(&hub), AuthStatus::Anonymous);
        hub.user = Some("alice".into());
        assert_eq!(check_auth(&hub), AuthStatus::LoggedIn("alice".into()));
        assert!(matches!(
            check_auth(&FakeHub::failing()),
            AuthStatus::Unreachable(_)
        ));
    }

    #[test]
    fn remediation_lists_each_license_page_once() {
        let text = remediation_steps(&catalog());
        assert_eq!(text.matches("https://huggingface.co/org/one\n").count(), 1);
        assert!(text.contains("https://huggingface.co/google/gemma-3-4b-it"));
        assert!(text.contains("HF_TOKEN"));
        assert!(text.contains(TOKEN_SETTINGS_URL));
    }

    #[test]
    fn direct_links_only_cover_downloadable_entries() {
        let text = direct_links(&catalog(), Path::new("models"));
        assert!(text.contains("curl -L -o \"models/m1.task\""));
        assert!(!text.contains("h1.task"));
    }

    #[test]
    fn writes_executable_download_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manual_download_script(&catalog(), dir.path()).unwrap();
        let script = fs::read_to_string(&path).unwrap();
        assert!(script.starts_with("#!/bin/sh"));
        assert_eq!(script.matches("curl -L -o").count(), 2);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
