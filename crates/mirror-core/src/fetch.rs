use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::{
    config::{DEFAULT_FETCH_DELAY, DEFAULT_MAX_UPLOAD_BYTES},
    domain::{FetchedMedia, MediaKind, MediaRef},
    errors::Error,
    Result,
};

const MAX_FILENAME_LEN: usize = 120;
const DEFAULT_EXTENSION: &str = "jpg";

/// Raw body of a media download.
#[derive(Clone, Debug)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Port for retrieving media bytes by URL.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Bodies larger than `max_bytes` are refused without being buffered in full.
    async fn get(&self, url: &str, max_bytes: usize) -> Result<Payload>;
}

/// `reqwest`-backed media source.
#[derive(Clone, Debug)]
pub struct HttpMediaSource {
    http: reqwest::Client,
}

impl HttpMediaSource {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::External(format!("http client build error: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn get(&self, url: &str, max_bytes: usize) -> Result<Payload> {
        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("media request error: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(Error::External(format!("media download failed: {status}")));
        }

        if let Some(len) = resp.content_length() {
            if len > max_bytes as u64 {
                return Err(Error::External(format!(
                    "declared size {len} exceeds upload limit {max_bytes}"
                )));
            }
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Chunked bodies carry no length up front, so the limit is enforced
        // while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::External(format!("media body error: {e}")))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(Error::External(format!(
                    "body exceeds upload limit {max_bytes}"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Payload {
            bytes,
            content_type,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FetchConfig {
    pub max_upload_bytes: usize,
    /// Minimum spacing between consecutive fetches of one batch.
    pub fetch_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fetch_delay: DEFAULT_FETCH_DELAY,
        }
    }
}

/// Result of a fetch batch. Media keeps the order of the input refs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Complete(Vec<FetchedMedia>),
    Partial {
        media: Vec<FetchedMedia>,
        dropped: usize,
    },
    Failed,
}

impl FetchOutcome {
    fn from_parts(media: Vec<FetchedMedia>, requested: usize) -> Self {
        if media.is_empty() {
            FetchOutcome::Failed
        } else if media.len() == requested {
            FetchOutcome::Complete(media)
        } else {
            let dropped = requested - media.len();
            FetchOutcome::Partial { media, dropped }
        }
    }

    pub fn into_media(self) -> Vec<FetchedMedia> {
        match self {
            FetchOutcome::Complete(media) | FetchOutcome::Partial { media, .. } => media,
            FetchOutcome::Failed => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }

    async fn wait(&mut self) {
        let wait = self.reserve();
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

/// Downloads media refs into upload-ready payloads, dropping whatever fails.
pub struct MediaFetcher {
    source: Arc<dyn MediaSource>,
    cfg: FetchConfig,
}

impl MediaFetcher {
    pub fn new(source: Arc<dyn MediaSource>, cfg: FetchConfig) -> Self {
        Self { source, cfg }
    }

    pub async fn fetch_all(&self, refs: &[MediaRef]) -> FetchOutcome {
        // Pacing is per batch so one slow message never delays another.
        let mut limiter = IntervalLimiter::new(self.cfg.fetch_delay);
        let mut media = Vec::with_capacity(refs.len());

        for r in refs {
            limiter.wait().await;
            match self.fetch_one(r).await {
                Ok(m) => media.push(m),
                Err(e) if e.is_not_found() => debug!(url = %r.url, "media gone, skipping"),
                Err(e) => warn!(url = %r.url, error = %e, "skipping media"),
            }
        }

        FetchOutcome::from_parts(media, refs.len())
    }

    async fn fetch_one(&self, r: &MediaRef) -> Result<FetchedMedia> {
        let max = self.cfg.max_upload_bytes;
        let payload = self.source.get(&r.url, max).await?;
        let size = payload.bytes.len();
        if size > max {
            return Err(Error::External(format!(
                "{:.2} MiB exceeds upload limit",
                size as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(FetchedMedia {
            name: derive_filename(r, payload.content_type.as_deref()),
            size_bytes: size,
            bytes: payload.bytes,
        })
    }
}

fn has_extension_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.[a-z0-9]{2,6}$").expect("extension regex"))
}

fn media_subtype_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:image|video|audio)/([a-z0-9.-]+)").expect("content type regex")
    })
}

/// Upload filename for a fetched ref: suggested name, URL basename, or a
/// kind-based default, with an extension guaranteed and sanitized.
pub fn derive_filename(r: &MediaRef, content_type: Option<&str>) -> String {
    let base = r
        .suggested_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| url_basename(&r.url))
        .unwrap_or_else(|| match r.kind {
            MediaKind::Image => "image".to_string(),
            _ => "file".to_string(),
        });

    let named = if has_extension_re().is_match(&base) {
        base
    } else {
        format!("{base}.{}", extension_for(content_type))
    };

    sanitize_filename(&named)
}

fn url_basename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(last.to_string())
}

fn extension_for(content_type: Option<&str>) -> String {
    content_type
        .and_then(|ct| media_subtype_re().captures(ct))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars().take(MAX_FILENAME_LEN) {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "file".to_string()
    } else {
        out
    }
}
