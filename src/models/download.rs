use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::catalog::{CatalogEntry, ModelSource};

const CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{id} has no direct download url")]
    NotDownloadable { id: String },
    #[error("transfer of {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl DownloadError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        DownloadError::Io {
            context: context.into(),
            source,
        }
    }

    fn transport(url: &str, message: impl ToString) -> Self {
        DownloadError::Transport {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

pub struct FetchResponse {
    pub content_length: Option<u64>,
    pub body: Box<dyn Read>,
}

/// Opens a streaming GET for `url`. Non-success statuses are transport errors.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        // Bundles run to several GB; the blocking client's 30s default would cut them off.
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .context("create http client")?;
        Ok(Self::with_client(client))
    }

    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|error| DownloadError::transport(url, error))?
            .error_for_status()
            .map_err(|error| DownloadError::transport(url, error))?;
        Ok(FetchResponse {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub uri: String,
    pub destination: PathBuf,
    pub expected_size_bytes: Option<u64>,
    pub expected_checksum: Option<String>,
}

impl DownloadPlan {
    pub fn for_entry(entry: &CatalogEntry, dir: &Path) -> Result<Self, DownloadError> {
        let ModelSource::Url { uri } = &entry.source else {
            return Err(DownloadError::NotDownloadable {
                id: entry.id.clone(),
            });
        };
        Ok(Self {
            uri: uri.clone(),
            destination: entry.path(dir),
            expected_size_bytes: entry.size_bytes,
            expected_checksum: entry.sha256.clone(),
        })
    }

    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self
            .destination
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        self.destination.with_file_name(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// `None` when the server sent no usable content-length.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.downloaded as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloaded {
        path: PathBuf,
        bytes: u64,
        sha256: String,
    },
    Skipped {
        path: PathBuf,
    },
}

impl DownloadStatus {
    pub fn path(&self) -> &Path {
        match self {
            DownloadStatus::Downloaded { path, .. } | DownloadStatus::Skipped { path } => path,
        }
    }
}

pub fn download(
    fetcher: &dyn Fetcher,
    plan: &DownloadPlan,
) -> Result<DownloadStatus, DownloadError> {
    download_with_progress(fetcher, plan, |_| {})
}

pub fn download_with_progress<F>(
    fetcher: &dyn Fetcher,
    plan: &DownloadPlan,
    mut progress: F,
) -> Result<DownloadStatus, DownloadError>
where
    F: FnMut(Progress),
{
    if let Some(parent) = plan.destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| DownloadError::io("create destination directory", error))?;
    }

    if plan.destination.exists() {
        tracing::debug!("{} already present", plan.destination.display());
        return Ok(DownloadStatus::Skipped {
            path: plan.destination.clone(),
        });
    }

    let staging = plan.staging_path();
    let result = fetch_to_staging(fetcher, plan, &staging, &mut progress)
        .and_then(|(bytes, sha256)| verify(plan, &staging, bytes, sha256));

    match result {
        Ok((bytes, sha256)) => {
            fs::rename(&staging, &plan.destination).map_err(|error| {
                let _ = fs::remove_file(&staging);
                DownloadError::io("move download into place", error)
            })?;
            Ok(DownloadStatus::Downloaded {
                path: plan.destination.clone(),
                bytes,
                sha256,
            })
        }
        Err(error) => {
            if staging.exists() {
                if let Err(cleanup) = fs::remove_file(&staging) {
                    tracing::warn!(
                        "failed to remove partial download {}: {cleanup}",
                        staging.display()
                    );
                }
            }
            Err(error)
        }
    }
}

fn fetch_to_staging<F>(
    fetcher: &dyn Fetcher,
    plan: &DownloadPlan,
    staging: &Path,
    progress: &mut F,
) -> Result<(u64, String), DownloadError>
where
    F: FnMut(Progress),
{
    let mut response = fetcher.fetch(&plan.uri)?;
    let total = response.content_length;

    let mut file =
        File::create(staging).map_err(|error| DownloadError::io("create staging file", error))?;
    let mut hasher = Sha256::new();
    let mut downloaded = 0u64;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match response.body.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(DownloadError::transport(&plan.uri, error)),
        };
        file.write_all(&buffer[..read])
            .map_err(|error| DownloadError::io("write download chunk", error))?;
        hasher.update(&buffer[..read]);
        downloaded += read as u64;
        progress(Progress { downloaded, total });
    }
    file.flush()
        .map_err(|error| DownloadError::io("flush staging file", error))?;

    if let Some(total) = total {
        if downloaded < total {
            return Err(DownloadError::transport(
                &plan.uri,
                format!("connection closed after {downloaded} of {total} bytes"),
            ));
        }
    }

    Ok((downloaded, format!("{:x}", hasher.finalize())))
}

fn verify(
    plan: &DownloadPlan,
    staging: &Path,
    bytes: u64,
    sha256: String,
) -> Result<(u64, String), DownloadError> {
    if let Some(expected) = plan.expected_size_bytes {
        if bytes != expected {
            return Err(DownloadError::SizeMismatch {
                path: plan.destination.clone(),
                expected,
                actual: bytes,
            });
        }
    }
    if let Some(expected) = &plan.expected_checksum {
        if !expected.eq_ignore_ascii_case(&sha256) {
            return Err(DownloadError::ChecksumMismatch {
                path: plan.destination.clone(),
                expected: expected.clone(),
                actual: sha256,
            });
        }
    }
    tracing::debug!("{} verified ({bytes} bytes)", staging.display());
    Ok((bytes, sha256))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::{Cell, RefCell};
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::models::catalog::tests::{hub_entry, url_entry};

    /// Serves canned bodies; `fail_after` cuts the stream with a reset after that many bytes.
    pub(crate) struct FakeFetcher {
        pub body: Vec<u8>,
        pub content_length: Option<u64>,
        pub fail_after: Option<usize>,
        pub failing_urls: Vec<String>,
        pub calls: Cell<usize>,
        pub requested: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn serving(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                content_length: Some(body.len() as u64),
                fail_after: None,
                failing_urls: Vec::new(),
                calls: Cell::new(0),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    struct FailingReader {
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )),
                read => Ok(read),
            }
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError> {
            self.calls.set(self.calls.get() + 1);
            self.requested.borrow_mut().push(url.to_string());
            if self.failing_urls.iter().any(|failing| failing == url) {
                return Err(DownloadError::transport(url, "HTTP status server error (503)"));
            }
            let body: Box<dyn Read> = match self.fail_after {
                Some(limit) => Box::new(FailingReader {
                    data: io::Cursor::new(self.body[..limit].to_vec()),
                }),
                None => Box::new(io::Cursor::new(self.body.clone())),
            };
            Ok(FetchResponse {
                content_length: self.content_length,
                body,
            })
        }
    }

    fn plan_in(dir: &Path) -> DownloadPlan {
        DownloadPlan::for_entry(&url_entry("m1", "http://x/y.bin", "m1.bin"), dir).unwrap()
    }

    #[test]
    fn downloads_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let models = dir.path().join("models");
        let fetcher = FakeFetcher::serving(b"weights");
        let plan = plan_in(&models);

        let status = download(&fetcher, &plan).unwrap();

        assert_eq!(fetcher.requested.borrow().as_slice(), ["http://x/y.bin"]);
        assert_eq!(fs::read(models.join("m1.bin")).unwrap(), b"weights");
        assert!(!plan.staging_path().exists());
        match status {
            DownloadStatus::Downloaded { bytes, sha256, .. } => {
                assert_eq!(bytes, 7);
                assert_eq!(sha256.len(), 64);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn existing_destination_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::serving(b"weights");
        let plan = plan_in(dir.path());

        download(&fetcher, &plan).unwrap();
        let second = download(&fetcher, &plan).unwrap();

        assert_eq!(fetcher.calls.get(), 1);
        assert_eq!(
            second,
            DownloadStatus::Skipped {
                path: dir.path().join("m1.bin")
            }
        );
    }

    #[test]
    fn transport_failure_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = FakeFetcher::serving(&vec![7u8; 100_000]);
        fetcher.fail_after = Some(40_000);
        let plan = plan_in(dir.path());

        let error = download(&fetcher, &plan).unwrap_err();

        assert!(matches!(error, DownloadError::Transport { .. }));
        assert!(!plan.destination.exists());
        assert!(!plan.staging_path().exists());
    }

    #[test]
    fn short_body_is_a_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = FakeFetcher::serving(b"half");
        fetcher.content_length = Some(8);
        let plan = plan_in(dir.path());

        let error = download(&fetcher, &plan).unwrap_err();

        assert!(matches!(error, DownloadError::Transport { .. }));
        assert!(!plan.destination.exists());
    }

    #[test]
    fn checksum_mismatch_removes_download() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::serving(b"weights");
        let mut plan = plan_in(dir.path());
        plan.expected_checksum = Some("deadbeef".into());

        let error = download(&fetcher, &plan).unwrap_err();

        assert!(matches!(error, DownloadError::ChecksumMismatch { .. }));
        assert!(!plan.destination.exists());
        assert!(!plan.staging_path().exists());
    }

    #[test]
    fn size_mismatch_removes_download() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::serving(b"weights");
        let mut plan = plan_in(dir.path());
        plan.expected_size_bytes = Some(1);

        let error = download(&fetcher, &plan).unwrap_err();

        assert!(matches!(error, DownloadError::SizeMismatch { .. }));
        assert!(!plan.destination.exists());
    }

    #[test]
    fn progress_reports_percentage_when_length_known() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::serving(&vec![1u8; CHUNK_SIZE * 2]);
        let mut seen = Vec::new();

        download_with_progress(&fetcher, &plan_in(dir.path()), |progress| seen.push(progress))
            .unwrap();

        let last = seen.last().copied().unwrap();
        assert_eq!(last.downloaded, (CHUNK_SIZE * 2) as u64);
        assert_eq!(last.percent(), Some(100.0));
    }

    #[test]
    fn progress_falls_back_to_byte_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = FakeFetcher::serving(b"weights");
        fetcher.content_length = None;
        let mut seen = Vec::new();

        download_with_progress(&fetcher, &plan_in(dir.path()), |progress| seen.push(progress))
            .unwrap();

        assert!(seen.iter().all(|progress| progress.percent().is_none()));
        assert_eq!(seen.last().unwrap().downloaded, 7);
    }

    #[test]
    fn hub_entries_have_no_download_plan() {
        let entry = hub_entry("h1", "org/repo", "h1.task");
        let error = DownloadPlan::for_entry(&entry, Path::new("models")).unwrap_err();
        assert!(matches!(error, DownloadError::NotDownloadable { .. }));
    }

    #[test]
    fn staging_path_appends_part_suffix() {
        let plan = plan_in(Path::new("models"));
        assert_eq!(plan.staging_path(), Path::new("models/m1.bin.part"));
    }

    fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let head = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
        });
        format!("http://{address}/y.bin")
    }

    fn loopback_fetcher() -> HttpFetcher {
        HttpFetcher::with_client(Client::builder().no_proxy().build().unwrap())
    }

    #[test]
    fn http_fetcher_streams_body() {
        let url = serve_once("HTTP/1.1 200 OK", b"bundle-bytes");
        let dir = tempfile::tempdir().unwrap();
        let plan = DownloadPlan::for_entry(&url_entry("m1", &url, "m1.bin"), dir.path()).unwrap();

        let status = download(&loopback_fetcher(), &plan).unwrap();

        assert!(matches!(status, DownloadStatus::Downloaded { bytes: 12, .. }));
        assert_eq!(fs::read(dir.path().join("m1.bin")).unwrap(), b"bundle-bytes");
    }

    #[test]
    fn http_fetcher_rejects_error_status() {
        let url = serve_once("HTTP/1.1 404 Not Found", b"missing");
        let dir = tempfile::tempdir().unwrap();
        let plan = DownloadPlan::for_entry(&url_entry("m1", &url, "m1.bin"), dir.path()).unwrap();

        let error = download(&loopback_fetcher(), &plan).unwrap_err();

        assert!(matches!(error, DownloadError::Transport { .. }));
        assert!(!dir.path().join("m1.bin").exists());
    }
}
