//! Image loading behind a single [`ImageSource`] capability.
//!
//! A panel's image reference can be an http(s) URL, a `data:` URL, a
//! `file://` URL or a plain local path. Which loading strategy applies
//! (direct fetch, or direct fetch with a proxy fallback) is decided once
//! at construction by [`ImageSourceKind::detect`]; the rest of the
//! pipeline only sees `dyn ImageSource`.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Environment variable naming a proxy endpoint for remote images.
pub const PROXY_ENV_VAR: &str = "XVIEW_IMAGE_PROXY";

/// Default timeout for a single remote fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Default cap on the body of a single remote response.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Longest reference prefix kept by [`describe_reference`].
const DESCRIBED_REFERENCE_CHARS: usize = 96;

/// Why the bytes behind an image reference could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageLoadError {
    /// The reference was empty or whitespace.
    #[error("image reference is empty")]
    EmptyReference,

    /// The reference uses a scheme no source can load.
    #[error("unsupported image reference: {0}")]
    UnsupportedReference(String),

    /// A `data:` URL was malformed or not base64 encoded.
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// Reading a local file failed.
    #[error("failed to read {path}: {message}")]
    Io {
        /// The path that could not be read.
        path: String,
        /// The underlying I/O error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching image")]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// The server refused access (HTTP 403).
    #[error("access to image forbidden")]
    Forbidden,

    /// The request could not be completed.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the fetch timeout.
    #[error("image fetch timed out")]
    Timeout,

    /// Nothing exists at the reference.
    #[error("image not found: {0}")]
    NotFound(String),

    /// The response body exceeded the configured size cap.
    #[error("image response larger than {limit} bytes")]
    TooLarge {
        /// The cap, in bytes.
        limit: u64,
    },

    /// Pixel access was blocked by a cross-origin restriction and no
    /// fallback could obtain the bytes.
    #[error("cross-origin restriction blocked pixel access")]
    CrossOriginBlocked,
}

impl ImageLoadError {
    /// Whether this is the sanctioned cross-origin exception rather
    /// than a genuine load failure.
    #[must_use]
    pub const fn is_cross_origin(&self) -> bool {
        matches!(self, Self::CrossOriginBlocked)
    }

    /// Whether a different route (a proxy) might still reach the image.
    const fn worth_falling_back(&self) -> bool {
        matches!(
            self,
            Self::Forbidden | Self::Network(_) | Self::Http { .. } | Self::Timeout
        )
    }
}

/// A strategy for turning an image reference into raw bytes.
///
/// Implementations must not block indefinitely: remote fetches carry a
/// timeout and resolve to [`ImageLoadError::Timeout`].
pub trait ImageSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Load the bytes behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns an [`ImageLoadError`] describing why the bytes could not
    /// be obtained.
    fn load(&self, reference: &str) -> Result<Vec<u8>, ImageLoadError>;
}

/// What kind of reference a string is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `http://` or `https://`.
    Remote,
    /// `data:` URL.
    DataUrl,
    /// `file://` URL or plain path.
    Local,
    /// Any other `scheme://`.
    Unsupported,
}

/// Classify a reference by its scheme.
#[must_use]
pub fn reference_kind(reference: &str) -> ReferenceKind {
    let lowered = reference.trim().to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        ReferenceKind::Remote
    } else if lowered.starts_with("data:") {
        ReferenceKind::DataUrl
    } else if lowered.starts_with("file://") || !lowered.contains("://") {
        ReferenceKind::Local
    } else {
        ReferenceKind::Unsupported
    }
}

/// A log- and report-safe rendition of a reference.
///
/// `data:` URLs are reduced to their media-type header and payload
/// size; anything else is truncated so image bytes never end up in a
/// log record.
#[must_use]
pub fn describe_reference(reference: &str) -> String {
    let trimmed = reference.trim();
    if reference_kind(trimmed) == ReferenceKind::DataUrl {
        let (header, payload) = trimmed.split_once(',').unwrap_or((trimmed, ""));
        let header: String = header.chars().take(DESCRIBED_REFERENCE_CHARS).collect();
        return format!("{header},<{} bytes>", payload.len());
    }
    if trimmed.chars().count() > DESCRIBED_REFERENCE_CHARS {
        let head: String = trimmed.chars().take(DESCRIBED_REFERENCE_CHARS).collect();
        return format!("{head}...");
    }
    trimmed.to_string()
}

/// Decode the payload of a base64 `data:` URL.
///
/// # Errors
///
/// Returns [`ImageLoadError::InvalidDataUrl`] if the URL has no comma,
/// is not base64 encoded, or the payload does not decode.
pub fn decode_data_url(reference: &str) -> Result<Vec<u8>, ImageLoadError> {
    let body = reference
        .trim()
        .get("data:".len()..)
        .ok_or_else(|| ImageLoadError::InvalidDataUrl("missing data: prefix".to_string()))?;
    let (header, payload) = body
        .split_once(',')
        .ok_or_else(|| ImageLoadError::InvalidDataUrl("missing ',' separator".to_string()))?;
    if !header.to_ascii_lowercase().ends_with(";base64") {
        return Err(ImageLoadError::InvalidDataUrl(
            "only base64 payloads are supported".to_string(),
        ));
    }
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| ImageLoadError::InvalidDataUrl(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ImageLoadError::InvalidDataUrl("empty payload".to_string()));
    }
    Ok(bytes)
}

/// Read a local path or `file://` URL.
///
/// # Errors
///
/// Returns [`ImageLoadError::NotFound`] if nothing exists at the path,
/// [`ImageLoadError::Io`] for other read failures.
pub fn read_local(reference: &str) -> Result<Vec<u8>, ImageLoadError> {
    let trimmed = reference.trim();
    let path = trimmed
        .strip_prefix("file://")
        .or_else(|| trimmed.strip_prefix("FILE://"))
        .unwrap_or(trimmed);
    std::fs::read(Path::new(path)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ImageLoadError::NotFound(path.to_string())
        } else {
            ImageLoadError::Io {
                path: path.to_string(),
                message: e.to_string(),
            }
        }
    })
}

fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client, ImageLoadError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ImageLoadError::Network(e.to_string()))
}

fn map_transport_error(err: &reqwest::Error) -> ImageLoadError {
    if err.is_timeout() {
        ImageLoadError::Timeout
    } else {
        ImageLoadError::Network(err.to_string())
    }
}

/// Read at most `max_bytes` from `reader`.
///
/// # Errors
///
/// Returns [`ImageLoadError::TooLarge`] once the body passes
/// `max_bytes`, [`ImageLoadError::Timeout`] or
/// [`ImageLoadError::Network`] if reading fails.
pub fn read_capped(reader: impl Read, max_bytes: u64) -> Result<Vec<u8>, ImageLoadError> {
    let mut bytes = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ImageLoadError::Timeout
            } else {
                ImageLoadError::Network(e.to_string())
            }
        })?;
    if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > max_bytes {
        return Err(ImageLoadError::TooLarge { limit: max_bytes });
    }
    Ok(bytes)
}

fn read_response(
    response: reqwest::blocking::Response,
    reference: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ImageLoadError> {
    let status = response.status();
    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(ImageLoadError::Forbidden);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ImageLoadError::NotFound(describe_reference(reference)));
    }
    if !status.is_success() {
        return Err(ImageLoadError::Http {
            status: status.as_u16(),
        });
    }
    if response.content_length().is_some_and(|n| n > max_bytes) {
        return Err(ImageLoadError::TooLarge { limit: max_bytes });
    }
    read_capped(response, max_bytes)
}

/// Loads every reference kind directly: http(s) with a blocking client,
/// `data:` URLs by decoding, local paths from disk.
#[derive(Debug, Clone)]
pub struct DirectSource {
    client: reqwest::blocking::Client,
    max_bytes: u64,
}

impl DirectSource {
    /// Build a direct source whose remote fetches time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageLoadError::Network`] if the HTTP client cannot be
    /// constructed.
    pub fn new(timeout: Duration) -> Result<Self, ImageLoadError> {
        Ok(Self {
            client: build_client(timeout)?,
            max_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        })
    }

    /// Cap remote response bodies at `max_bytes`.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl ImageSource for DirectSource {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn load(&self, reference: &str) -> Result<Vec<u8>, ImageLoadError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageLoadError::EmptyReference);
        }
        match reference_kind(reference) {
            ReferenceKind::DataUrl => decode_data_url(reference),
            ReferenceKind::Local => read_local(reference),
            ReferenceKind::Unsupported => Err(ImageLoadError::UnsupportedReference(
                describe_reference(reference),
            )),
            ReferenceKind::Remote => {
                let response = self
                    .client
                    .get(reference)
                    .send()
                    .map_err(|e| map_transport_error(&e))?;
                read_response(response, reference, self.max_bytes)
            }
        }
    }
}

/// Fetches remote images through a proxy endpoint as
/// `{endpoint}?url=<reference>`.
#[derive(Debug, Clone)]
pub struct ProxySource {
    endpoint: String,
    client: reqwest::blocking::Client,
    max_bytes: u64,
}

impl ProxySource {
    /// Build a proxy source for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageLoadError::Network`] if the HTTP client cannot be
    /// constructed.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ImageLoadError> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: build_client(timeout)?,
            max_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        })
    }

    /// Cap proxied response bodies at `max_bytes`.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// The proxy endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ImageSource for ProxySource {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn load(&self, reference: &str) -> Result<Vec<u8>, ImageLoadError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageLoadError::EmptyReference);
        }
        if reference_kind(reference) != ReferenceKind::Remote {
            return Err(ImageLoadError::UnsupportedReference(describe_reference(
                reference,
            )));
        }
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", reference)])
            .send()
            .map_err(|e| map_transport_error(&e))?;
        read_response(response, reference, self.max_bytes)
    }
}

/// Tries a primary source, then each fallback in order.
///
/// Fallbacks are only consulted for remote references whose primary
/// failure another route might avoid (forbidden, network, HTTP status,
/// timeout). When the primary was refused with 403 and every fallback
/// also fails, the result is [`ImageLoadError::CrossOriginBlocked`].
/// Otherwise the primary's error is returned.
pub struct FallbackSource {
    primary: Box<dyn ImageSource>,
    fallbacks: Vec<Box<dyn ImageSource>>,
}

impl FallbackSource {
    /// Chain `primary` with `fallbacks`.
    #[must_use]
    pub fn new(primary: Box<dyn ImageSource>, fallbacks: Vec<Box<dyn ImageSource>>) -> Self {
        Self { primary, fallbacks }
    }
}

impl std::fmt::Debug for FallbackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackSource")
            .field("primary", &self.primary.name())
            .field(
                "fallbacks",
                &self.fallbacks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ImageSource for FallbackSource {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn load(&self, reference: &str) -> Result<Vec<u8>, ImageLoadError> {
        let primary_error = match self.primary.load(reference) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };
        if reference_kind(reference) != ReferenceKind::Remote
            || !primary_error.worth_falling_back()
        {
            return Err(primary_error);
        }

        for fallback in &self.fallbacks {
            match fallback.load(reference) {
                Ok(bytes) => {
                    tracing::debug!(
                        source = fallback.name(),
                        reference = %describe_reference(reference),
                        "loaded image through fallback source"
                    );
                    return Ok(bytes);
                }
                Err(e) => tracing::debug!(
                    source = fallback.name(),
                    reference = %describe_reference(reference),
                    error = %e,
                    "fallback source failed"
                ),
            }
        }

        if primary_error == ImageLoadError::Forbidden {
            Err(ImageLoadError::CrossOriginBlocked)
        } else {
            Err(primary_error)
        }
    }
}

/// Pre-fetched bytes keyed by reference.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    images: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes for `reference`, replacing any previous entry.
    pub fn insert(&mut self, reference: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(reference.into(), bytes);
    }

    /// Builder-style [`MemorySource::insert`].
    #[must_use]
    pub fn with(mut self, reference: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(reference, bytes);
        self
    }
}

impl ImageSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, reference: &str) -> Result<Vec<u8>, ImageLoadError> {
        if reference.trim().is_empty() {
            return Err(ImageLoadError::EmptyReference);
        }
        self.images
            .get(reference)
            .cloned()
            .ok_or_else(|| ImageLoadError::NotFound(describe_reference(reference)))
    }
}

/// Selects the loading strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSourceKind {
    /// Direct loading only.
    #[default]
    Direct,
    /// Direct loading, falling back to a proxy endpoint for remote
    /// images that cannot be fetched directly.
    ProxyFallback {
        /// Proxy endpoint URL.
        endpoint: String,
    },
}

impl ImageSourceKind {
    /// Choose a strategy from the environment ([`PROXY_ENV_VAR`]).
    #[must_use]
    pub fn detect() -> Self {
        Self::from_proxy_setting(std::env::var(PROXY_ENV_VAR).ok().as_deref())
    }

    /// Choose a strategy from an optional proxy endpoint. Blank values
    /// select [`ImageSourceKind::Direct`].
    #[must_use]
    pub fn from_proxy_setting(endpoint: Option<&str>) -> Self {
        match endpoint.map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => Self::ProxyFallback {
                endpoint: endpoint.to_string(),
            },
            _ => Self::Direct,
        }
    }

    /// Construct the source. Remote fetches time out after `timeout`
    /// and bodies over `max_bytes` are refused.
    ///
    /// # Errors
    ///
    /// Returns [`ImageLoadError::Network`] if an HTTP client cannot be
    /// constructed.
    pub fn build(
        &self,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<Box<dyn ImageSource>, ImageLoadError> {
        let direct = DirectSource::new(timeout)?.with_max_bytes(max_bytes);
        Ok(match self {
            Self::Direct => Box::new(direct),
            Self::ProxyFallback { endpoint } => Box::new(FallbackSource::new(
                Box::new(direct),
                vec![Box::new(
                    ProxySource::new(endpoint.clone(), timeout)?.with_max_bytes(max_bytes),
                )],
            )),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Scripted {
        result: Result<Vec<u8>, ImageLoadError>,
    }

    impl Scripted {
        const fn new(result: Result<Vec<u8>, ImageLoadError>) -> Self {
            Self { result }
        }
    }

    impl ImageSource for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn load(&self, _reference: &str) -> Result<Vec<u8>, ImageLoadError> {
            self.result.clone()
        }
    }

    #[test]
    fn classifies_references() {
        assert_eq!(reference_kind("https://x/a.png"), ReferenceKind::Remote);
        assert_eq!(reference_kind("HTTP://x/a.png"), ReferenceKind::Remote);
        assert_eq!(reference_kind("data:image/png;base64,AA"), ReferenceKind::DataUrl);
        assert_eq!(reference_kind("/tmp/a.png"), ReferenceKind::Local);
        assert_eq!(reference_kind("file:///tmp/a.png"), ReferenceKind::Local);
        assert_eq!(reference_kind("ftp://x/a.png"), ReferenceKind::Unsupported);
    }

    #[test]
    fn decodes_base64_data_url() {
        let bytes = decode_data_url("data:image/png;base64,AQID").unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_non_base64_data_url() {
        let err = decode_data_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, ImageLoadError::InvalidDataUrl(_)));
    }

    #[test]
    fn rejects_corrupt_base64() {
        let err = decode_data_url("data:image/png;base64,!!!").unwrap_err();
        assert!(matches!(err, ImageLoadError::InvalidDataUrl(_)));
    }

    #[test]
    fn reads_local_path_and_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.png");
        std::fs::write(&path, [9_u8, 8, 7]).unwrap();
        let plain = path.to_str().unwrap();
        assert_eq!(read_local(plain).unwrap(), vec![9, 8, 7]);
        assert_eq!(read_local(&format!("file://{plain}")).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn missing_local_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let err = read_local(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ImageLoadError::NotFound(_)));
    }

    #[test]
    fn direct_source_rejects_empty_and_unsupported() {
        let source = DirectSource::new(DEFAULT_FETCH_TIMEOUT).unwrap();
        assert_eq!(source.load("  "), Err(ImageLoadError::EmptyReference));
        assert!(matches!(
            source.load("ftp://example.com/a.png"),
            Err(ImageLoadError::UnsupportedReference(_))
        ));
    }

    #[test]
    fn proxy_source_only_handles_remote_references() {
        let source = ProxySource::new("http://127.0.0.1:9/proxy", DEFAULT_FETCH_TIMEOUT).unwrap();
        assert!(matches!(
            source.load("/tmp/a.png"),
            Err(ImageLoadError::UnsupportedReference(_))
        ));
    }

    #[test]
    fn capped_read_refuses_oversized_bodies() {
        let body = vec![7_u8; 1024];
        assert_eq!(read_capped(body.as_slice(), 1024).unwrap().len(), 1024);
        assert_eq!(
            read_capped(body.as_slice(), 1023),
            Err(ImageLoadError::TooLarge { limit: 1023 })
        );
        assert_eq!(
            read_capped(std::io::repeat(0), 4096),
            Err(ImageLoadError::TooLarge { limit: 4096 })
        );
    }

    #[test]
    fn memory_source_returns_registered_bytes() {
        let source = MemorySource::new().with("a", vec![1]);
        assert_eq!(source.load("a").unwrap(), vec![1]);
        assert!(matches!(source.load("b"), Err(ImageLoadError::NotFound(_))));
    }

    #[test]
    fn fallback_used_when_primary_is_forbidden() {
        let source = FallbackSource::new(
            Box::new(Scripted::new(Err(ImageLoadError::Forbidden))),
            vec![Box::new(Scripted::new(Ok(vec![4, 2])))],
        );
        assert_eq!(source.load("https://cdn/x.png").unwrap(), vec![4, 2]);
    }

    #[test]
    fn forbidden_with_failing_fallbacks_is_cross_origin() {
        let source = FallbackSource::new(
            Box::new(Scripted::new(Err(ImageLoadError::Forbidden))),
            vec![Box::new(Scripted::new(Err(ImageLoadError::Timeout)))],
        );
        let err = source.load("https://cdn/x.png").unwrap_err();
        assert!(err.is_cross_origin());
    }

    #[test]
    fn network_failure_with_failing_fallbacks_keeps_primary_error() {
        let source = FallbackSource::new(
            Box::new(Scripted::new(Err(ImageLoadError::Network("reset".into())))),
            vec![Box::new(Scripted::new(Err(ImageLoadError::Forbidden)))],
        );
        let err = source.load("https://cdn/x.png").unwrap_err();
        assert_eq!(err, ImageLoadError::Network("reset".into()));
        assert!(!err.is_cross_origin());
    }

    #[test]
    fn local_failures_skip_fallbacks() {
        let source = FallbackSource::new(
            Box::new(Scripted::new(Err(ImageLoadError::NotFound("p".into())))),
            vec![Box::new(Scripted::new(Ok(vec![1])))],
        );
        assert!(matches!(
            source.load("/missing.png"),
            Err(ImageLoadError::NotFound(_))
        ));
    }

    #[test]
    fn describe_reference_hides_data_url_payload() {
        let described = describe_reference("data:image/png;base64,AAAABBBBCCCC");
        assert_eq!(described, "data:image/png;base64,<12 bytes>");
        let long = format!("https://cdn/{}", "x".repeat(500));
        assert!(describe_reference(&long).len() < 120);
    }

    #[test]
    fn proxy_setting_selects_strategy() {
        assert_eq!(ImageSourceKind::from_proxy_setting(None), ImageSourceKind::Direct);
        assert_eq!(
            ImageSourceKind::from_proxy_setting(Some("  ")),
            ImageSourceKind::Direct
        );
        assert_eq!(
            ImageSourceKind::from_proxy_setting(Some("https://proxy/fetch")),
            ImageSourceKind::ProxyFallback {
                endpoint: "https://proxy/fetch".to_string()
            }
        );
    }

    #[test]
    fn built_sources_report_their_strategy() {
        let direct = ImageSourceKind::Direct
            .build(DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_RESPONSE_BYTES)
            .unwrap();
        assert_eq!(direct.name(), "direct");
        let proxied = ImageSourceKind::ProxyFallback {
            endpoint: "https://proxy/fetch".to_string(),
        }
        .build(DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_RESPONSE_BYTES)
        .unwrap();
        assert_eq!(proxied.name(), "fallback");
    }
}
