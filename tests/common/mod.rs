#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use base_image_store::cancel::CancelToken;
use base_image_store::catalog::{VersionCatalog, VersionEntry};
use base_image_store::deriver::ImageDeriver;
use base_image_store::error::{DeriveError, FetchError};
use base_image_store::fetcher::Fetcher;

/// Wiremock server driven from synchronous tests. The blocking HTTP client
/// must not run inside an async context, so the server lives on its own
/// runtime and the test thread only blocks on it for setup.
pub struct MockHttp {
    server: MockServer,
    runtime: Runtime,
}

impl MockHttp {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    pub fn serve(&self, route: &str, status: u16, body: &[u8]) {
        self.runtime.block_on(
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
                .mount(&self.server),
        );
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    pub fn request_count(&self) -> usize {
        self.runtime
            .block_on(self.server.received_requests())
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

/// Body written by [`RawServer`] after its response head.
pub enum RawBody {
    /// Sent once, then the connection is closed.
    Exact(Vec<u8>),
    /// 64 KiB chunks every 20 ms until the client hangs up.
    Endless,
}

/// One-connection responder for replies wiremock derives its own
/// Content-Length for: a declared length the body never reaches, or a body
/// that does not end.
pub struct RawServer {
    addr: SocketAddr,
}

impl RawServer {
    pub fn start(declared_length: u64, body: RawBody) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).is_ok_and(|read| read > 0) && line != "\r\n" {
                line.clear();
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {declared_length}\r\nConnection: close\r\n\r\n"
            );
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            match body {
                RawBody::Exact(bytes) => {
                    let _ = stream.write_all(&bytes);
                }
                RawBody::Endless => {
                    let chunk = vec![0u8; 64 * 1024];
                    while stream.write_all(&chunk).is_ok() {
                        thread::sleep(Duration::from_millis(20));
                    }
                }
            }
        });
        Self { addr }
    }

    pub fn url(&self, route: &str) -> String {
        format!("http://{}{}", self.addr, route)
    }
}

pub fn utf8_dir(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

pub fn catalog(entries: &[(&str, &str, Option<&str>)]) -> VersionCatalog {
    let entries = entries
        .iter()
        .map(|(version, iso_url, rootfs_url)| {
            (
                version.to_string(),
                VersionEntry {
                    iso_url: Some(iso_url.to_string()),
                    rootfs_url: rootfs_url.map(str::to_string),
                },
            )
        })
        .collect::<BTreeMap<_, _>>();
    VersionCatalog::from_entries(entries).unwrap()
}

/// Writes a small payload for every URL except those listed in `fail_urls`.
#[derive(Default)]
pub struct RecordingFetcher {
    pub calls: Mutex<Vec<String>>,
    pub fail_urls: Vec<String>,
}

impl RecordingFetcher {
    pub fn failing(urls: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_urls: urls.iter().map(|url| url.to_string()).collect(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Fetcher for RecordingFetcher {
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        _cancel: &CancelToken,
    ) -> Result<u64, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail_urls.iter().any(|fail| fail == url) {
            return Err(FetchError::BadStatus { status: 404 });
        }
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(destination.as_std_path(), b"full-image").unwrap();
        Ok(10)
    }
}

/// Copies the full image to the output and records each call. Fails for
/// versions whose rootfs URL is listed in `fail_rootfs`.
#[derive(Default)]
pub struct RecordingDeriver {
    pub calls: Mutex<Vec<(Utf8PathBuf, String, Utf8PathBuf)>>,
    pub fail_rootfs: Vec<String>,
    pub full_missing_at_call: AtomicUsize,
}

impl RecordingDeriver {
    pub fn failing(rootfs_urls: &[&str]) -> Self {
        Self {
            fail_rootfs: rootfs_urls.iter().map(|url| url.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ImageDeriver for RecordingDeriver {
    fn derive_minimal(
        &self,
        full_image: &Utf8Path,
        rootfs_url: &str,
        output: &Utf8Path,
    ) -> Result<(), DeriveError> {
        self.calls.lock().unwrap().push((
            full_image.to_path_buf(),
            rootfs_url.to_string(),
            output.to_path_buf(),
        ));
        if !full_image.as_std_path().exists() {
            self.full_missing_at_call.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_rootfs.iter().any(|fail| fail == rootfs_url) {
            return Err(DeriveError::Failed("rootfs unreachable".to_string()));
        }
        std::fs::copy(full_image.as_std_path(), output.as_std_path())
            .map_err(|err| DeriveError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
