pub mod arcgis;
pub mod html;
pub mod zip;

pub use arcgis::{query_geoservice, GeoService};
pub use html::{find_link_by_title, url_to_soup};
pub use self::zip::{get_zip, ZipSource};

use crate::config::FetchConfig;
use crate::error::{Result, ScrapeError};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Source of raw bytes for the scrapers.
pub trait Fetch: Send + Sync {
    fn fetch_bytes(&self, url: &str, use_cache: bool) -> Result<Vec<u8>>;

    /// Issue a GET and return the value of one response header.
    fn fetch_header(&self, url: &str, header: &str) -> Result<String>;

    fn fetch_text(&self, url: &str, use_cache: bool) -> Result<String> {
        let bytes = self.fetch_bytes(url, use_cache)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Blocking HTTP fetcher with an optional on-disk cache.
///
/// The client keeps cookies, so a header read with [`Fetch::fetch_header`]
/// and a later download belong to the same upstream session.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    cache_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()?;

        let cache_dir = if config.use_cache {
            Some(config.cache_dir.clone())
        } else {
            None
        };

        Ok(Self { client, cache_dir })
    }

    fn cache_path(&self, url: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(cache_file_name(url)))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!("Downloading {}", url);
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

impl Fetch for HttpFetcher {
    fn fetch_bytes(&self, url: &str, use_cache: bool) -> Result<Vec<u8>> {
        let cache_path = self.cache_path(url);

        if use_cache {
            if let Some(path) = cache_path.as_ref().filter(|p| p.exists()) {
                debug!("Cache hit for {} at {}", url, path.display());
                return Ok(fs::read(path)?);
            }
        }

        let bytes = self.download(url)?;

        if let Some(path) = cache_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &bytes)?;
        }

        Ok(bytes)
    }

    fn fetch_header(&self, url: &str, header: &str) -> Result<String> {
        let response = self.client.get(url).send()?.error_for_status()?;
        response
            .headers()
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ScrapeError::MissingHeader {
                url: url.to_string(),
                header: header.to_string(),
            })
    }
}

/// Fetcher serving fixed responses, for offline runs and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    bodies: HashMap<String, Vec<u8>>,
    headers: HashMap<(String, String), String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body<U: Into<String>, B: Into<Vec<u8>>>(mut self, url: U, body: B) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    pub fn with_header<U: Into<String>, H: Into<String>, V: Into<String>>(
        mut self,
        url: U,
        header: H,
        value: V,
    ) -> Self {
        self.headers
            .insert((url.into(), header.into().to_lowercase()), value.into());
        self
    }
}

impl Fetch for StaticFetcher {
    fn fetch_bytes(&self, url: &str, _use_cache: bool) -> Result<Vec<u8>> {
        self.bodies.get(url).cloned().ok_or_else(|| {
            ScrapeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no fixture for {}", url),
            ))
        })
    }

    fn fetch_header(&self, url: &str, header: &str) -> Result<String> {
        self.headers
            .get(&(url.to_string(), header.to_lowercase()))
            .cloned()
            .ok_or_else(|| ScrapeError::MissingHeader {
                url: url.to_string(),
                header: header.to_string(),
            })
    }
}

/// Filesystem-safe cache key for a URL: a readable prefix plus a hash so
/// that long URLs sharing a prefix do not collide.
fn cache_file_name(url: &str) -> String {
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    let mut readable = String::new();
    for ch in stripped.chars() {
        match ch {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => readable.push(c),
            _ => readable.push('_'),
        }
    }
    let readable = readable.trim_matches(|c| c == '.' || c == '_');
    let readable = if readable.len() > 80 { &readable[..80] } else { readable };

    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);

    format!("{}_{:016x}", readable, hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_file_name_is_sanitized() {
        let name = cache_file_name("https://example.com/a/b?x=1&y=2");
        assert!(name.starts_with("example.com_a_b_x_1_y_2_"));
        assert!(!name.contains('/'));
        assert!(!name.contains('?'));
    }

    #[test]
    fn test_cache_file_name_distinguishes_long_urls() {
        let prefix = format!("https://example.com/{}", "a".repeat(200));
        let first = cache_file_name(&format!("{}1", prefix));
        let second = cache_file_name(&format!("{}2", prefix));
        assert_ne!(first, second);
        assert!(first.len() < 120);
    }

    #[test]
    fn test_static_fetcher_serves_fixtures() {
        let fetcher = StaticFetcher::new()
            .with_body("https://example.com/data", "hello")
            .with_header("https://example.com/page", "X-Session-Id", "abc");

        assert_eq!(fetcher.fetch_text("https://example.com/data", true).unwrap(), "hello");
        assert_eq!(
            fetcher.fetch_header("https://example.com/page", "x-session-id").unwrap(),
            "abc"
        );
        assert!(fetcher.fetch_bytes("https://example.com/missing", true).is_err());
        assert!(matches!(
            fetcher.fetch_header("https://example.com/data", "x-session-id"),
            Err(ScrapeError::MissingHeader { .. })
        ));
    }

    #[test]
    fn test_http_fetcher_reads_cache_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let config = FetchConfig {
            cache_dir: temp_dir.path().to_path_buf(),
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();

        let url = "https://cache.invalid/report.pdf";
        let path = fetcher.cache_path(url).unwrap();
        fs::write(&path, b"cached").unwrap();

        assert_eq!(fetcher.fetch_bytes(url, true).unwrap(), b"cached");
    }

    #[test]
    fn test_http_fetcher_without_cache() {
        let config = FetchConfig {
            use_cache: false,
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert!(fetcher.cache_path("https://example.com").is_none());
    }
}
