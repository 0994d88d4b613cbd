use std::fs;
use std::io::{Read, Write};
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::{Builder, NamedTempFile};

use crate::cancel::CancelToken;
use crate::error::FetchError;

const CHUNK_SIZE: usize = 64 * 1024;

pub trait Fetcher: Send + Sync {
    /// Downloads `url` into `destination` and returns the number of bytes
    /// written. On error nothing is left at `destination`.
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        cancel: &CancelToken,
    ) -> Result<u64, FetchError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        cancel: &CancelToken,
    ) -> Result<u64, FetchError> {
        (**self).fetch(url, destination, cancel)
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("base-image-store/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::Client(err.to_string()))?,
        );
        // Images run to gigabytes; only the connect phase is bounded here.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        cancel: &CancelToken,
    ) -> Result<u64, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::BadStatus {
                status: response.status().as_u16(),
            });
        }
        let expected = response.content_length();

        let mut temp = temp_file_for(destination)?;
        let written = copy_with_cancel(&mut response, temp.as_file_mut(), cancel)?;
        check_length(written, expected)?;
        temp.as_file()
            .sync_all()
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        temp.persist(destination.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}

/// Creates a dot-prefixed scratch file next to `destination`, so the final
/// rename stays on one filesystem. The file is removed if it is dropped
/// before `persist`.
fn temp_file_for(destination: &Utf8Path) -> Result<NamedTempFile, FetchError> {
    let parent = destination
        .parent()
        .ok_or_else(|| FetchError::Filesystem(format!("invalid destination {destination}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    let name = destination.file_name().unwrap_or("download");
    Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))
}

/// Compares the bytes written with the declared `Content-Length`, if any.
fn check_length(written: u64, expected: Option<u64>) -> Result<(), FetchError> {
    match expected {
        Some(expected) if written != expected => Err(FetchError::SizeMismatch { written, expected }),
        _ => Ok(()),
    }
}

fn copy_with_cancel(
    reader: &mut impl Read,
    writer: &mut impl Write,
    cancel: &CancelToken,
) -> Result<u64, FetchError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(FetchError::Transport(err.to_string())),
        };
        writer
            .write_all(&buf[..read])
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        written += read as u64;
    }
    writer
        .flush()
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    Ok(written)
}
