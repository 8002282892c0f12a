use std::{
    io::{Cursor, Read},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context as _;
use base64::Engine as _;

use crate::foundation::error::{FramecutError, FramecutResult};

/// Default request timeout for HTTP sources.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Response to a single source fetch, before the body is read.
pub struct FetchedSource {
    /// HTTP-style status code. Non-HTTP sources report 200 or 404.
    pub status: u16,
    /// Declared body length, when known up front.
    pub content_length: Option<u64>,
    /// Declared MIME type, when known.
    pub content_type: Option<String>,
    /// Unread body.
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for FetchedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedSource")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Fully read, size-checked source bytes.
#[derive(Clone, Debug)]
pub struct SourceBytes {
    /// Source reference the bytes came from.
    pub source: String,
    /// Declared MIME type, when known.
    pub content_type: Option<String>,
    /// Compressed source bytes.
    pub bytes: Vec<u8>,
}

impl FetchedSource {
    /// Check the status and byte ceiling, then read the body.
    ///
    /// The declared length is checked before reading; the body itself is read through a reader
    /// capped one byte past `limit`, so undeclared oversize bodies are caught too.
    pub fn read_bounded(self, source: &str, limit: u64) -> FramecutResult<SourceBytes> {
        if !(200..300).contains(&self.status) {
            return Err(FramecutError::Fetch {
                status: self.status,
                url: source.to_string(),
            });
        }
        if let Some(len) = self.content_length
            && len > limit
        {
            return Err(FramecutError::ResourceTooLarge { size: len, limit });
        }

        let mut bytes = Vec::with_capacity(self.content_length.unwrap_or(0).min(limit) as usize);
        self.body
            .take(limit.saturating_add(1))
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed reading source body '{source}'"))?;
        let size = bytes.len() as u64;
        if size > limit {
            return Err(FramecutError::ResourceTooLarge { size, limit });
        }

        Ok(SourceBytes {
            source: source.to_string(),
            content_type: self.content_type,
            bytes,
        })
    }
}

/// Retrieves a source by reference.
pub trait SourceFetcher: Send + Sync {
    /// Issue one request for `source`. A non-success status is returned, not raised.
    fn fetch(&self, source: &str) -> FramecutResult<FetchedSource>;
}

/// Fetcher for `http(s)://`, `file://`, `data:` and bare filesystem paths.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    http: reqwest::blocking::Client,
}

impl DefaultFetcher {
    /// Build a fetcher whose HTTP requests time out after `timeout`.
    pub fn new(timeout: Duration) -> FramecutResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    fn fetch_http(&self, url: &str) -> FramecutResult<FetchedSource> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed fetching source ({url})"))?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(FetchedSource {
            status,
            content_length,
            content_type,
            body: Box::new(response),
        })
    }

    fn fetch_file(&self, path: PathBuf) -> FramecutResult<FetchedSource> {
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FetchedSource {
                    status: 404,
                    content_length: Some(0),
                    content_type: None,
                    body: Box::new(std::io::empty()),
                });
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to open source '{}'", path.display()))
                    .into());
            }
        };
        let content_length = file.metadata().ok().map(|m| m.len());
        Ok(FetchedSource {
            status: 200,
            content_length,
            content_type: None,
            body: Box::new(file),
        })
    }
}

impl SourceFetcher for DefaultFetcher {
    fn fetch(&self, source: &str) -> FramecutResult<FetchedSource> {
        if let Some(rest) = source.strip_prefix("data:") {
            let (content_type, bytes) = parse_data_url(rest)?;
            return Ok(FetchedSource {
                status: 200,
                content_length: Some(bytes.len() as u64),
                content_type,
                body: Box::new(Cursor::new(bytes)),
            });
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch_http(source);
        }
        let path = source.strip_prefix("file://").unwrap_or(source);
        self.fetch_file(PathBuf::from(path))
    }
}

/// Split the part of a data URL after `data:` into its MIME type and payload.
fn parse_data_url(rest: &str) -> FramecutResult<(Option<String>, Vec<u8>)> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| FramecutError::invalid_input("data URL has no ',' separator"))?;
    let mut parts = meta.split(';');
    let mime = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| FramecutError::invalid_input(format!("invalid base64 in data URL: {e}")))?
    } else {
        percent_decode(payload)
    };
    Ok((mime, bytes))
}

fn percent_decode(s: &str) -> Vec<u8> {
    let raw = s.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%'
            && i + 2 < raw.len()
            && let (Some(hi), Some(lo)) = (hex_val(raw[i + 1]), hex_val(raw[i + 2]))
        {
            out.push(hi << 4 | lo);
            i += 3;
            continue;
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/grid/fetch.rs"]
mod tests;
