//! Configuration, loaded from TOML.
//!
//! ```toml
//! [cache]
//! memory_size = "256MB"
//! disk_path = "/var/cache/bobbin"
//!
//! [remote]
//! max_concurrency = 8
//!
//! [thread]
//! batch_size = 100
//! ```
//!
//! Every field is optional and falls back to [`BobbinConfig::default`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BobbinError, BobbinResult};

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid size '{input}': expected a byte count like '12B', '64KB', '256MB' or '1GB'")]
pub struct SizeParseError {
    input: String,
}

/// Parse a human-readable size (`"256MB"`, `"64 kb"`, `"12B"`, `"4096"`) into
/// bytes. Units are powers of 1024.
pub fn parse_size(s: &str) -> Result<usize, SizeParseError> {
    let invalid = || SizeParseError { input: s.to_owned() };
    let trimmed = s.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (digits, multiplier) = [("GB", GB), ("MB", MB), ("KB", KB), ("B", 1)]
        .into_iter()
        .find_map(|(suffix, multiplier)| {
            upper
                .strip_suffix(suffix)
                .map(|rest| (&trimmed[..rest.len()], multiplier))
        })
        .unwrap_or((trimmed, 1));

    let digits = digits.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

/// Format a byte count in the largest unit that divides it evenly.
pub fn format_size(bytes: usize) -> String {
    match bytes {
        0 => "0B".to_owned(),
        n if n % GB == 0 => format!("{}GB", n / GB),
        n if n % MB == 0 => format!("{}MB", n / MB),
        n if n % KB == 0 => format!("{}KB", n / KB),
        n => format!("{n}B"),
    }
}

/// A byte count, written in TOML as a human-readable string or an integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "SizeRepr", into = "SizeRepr")]
pub struct ByteSize(pub usize);

impl ByteSize {
    pub fn bytes(self) -> usize {
        self.0
    }

    pub fn from_mb(mb: usize) -> Self {
        Self(mb * MB)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

impl std::str::FromStr for ByteSize {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(ByteSize)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SizeRepr {
    Bytes(usize),
    Text(String),
}

impl TryFrom<SizeRepr> for ByteSize {
    type Error = SizeParseError;

    fn try_from(repr: SizeRepr) -> Result<Self, Self::Error> {
        match repr {
            SizeRepr::Bytes(n) => Ok(ByteSize(n)),
            SizeRepr::Text(s) => s.parse(),
        }
    }
}

impl From<ByteSize> for SizeRepr {
    fn from(size: ByteSize) -> Self {
        SizeRepr::Text(size.to_string())
    }
}

/// Cache layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget of the in-memory layer, counting keys and values.
    pub memory_size: ByteSize,
    /// Root directory of the on-disk layer. No disk layer when unset.
    pub disk_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_size: ByteSize::from_mb(64),
            disk_path: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Most remote calls allowed in flight at once.
    pub max_concurrency: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Records requested per author-history prefetch.
    pub batch_size: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            batch_size: bobbin_thread::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BobbinConfig {
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    pub thread: ThreadConfig,
}

impl BobbinConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> BobbinResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub async fn load(path: &Path) -> BobbinResult<Self> {
        debug!(path = %path.display(), "loading configuration");
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> BobbinResult<String> {
        toml::to_string(self).map_err(|err| BobbinError::Config(err.to_string()))
    }

    pub fn validate(&self) -> BobbinResult<()> {
        if self.remote.max_concurrency == 0 {
            return Err(BobbinError::Config(
                "remote.max_concurrency must be at least 1".into(),
            ));
        }
        if self.thread.batch_size == 0 {
            return Err(BobbinError::Config(
                "thread.batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_units() {
        assert_eq!(parse_size("12B").unwrap(), 12);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_size("256MB").unwrap(), 256 * 1024 * 1024);
        assert_eq!(parse_size("1GB").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size(" 2 mb ").unwrap(), 2 * 1024 * 1024);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("-1KB").is_err());
        assert!(parse_size("1.5GB").is_err());
        assert!(parse_size("2TB").is_err());
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn defaults() {
        let config = BobbinConfig::default();
        assert_eq!(config.cache.memory_size, ByteSize::from_mb(64));
        assert!(config.cache.disk_path.is_none());
        assert_eq!(config.remote.max_concurrency, 8);
        assert_eq!(config.thread.batch_size, 100);
        config.validate().unwrap();
    }

    #[test]
    fn full_document() {
        let config = BobbinConfig::from_toml_str(
            r#"
            [cache]
            memory_size = "256MB"
            disk_path = "/var/cache/bobbin"

            [remote]
            max_concurrency = 4

            [thread]
            batch_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.memory_size.bytes(), 256 * 1024 * 1024);
        assert_eq!(config.cache.disk_path, Some(PathBuf::from("/var/cache/bobbin")));
        assert_eq!(config.remote.max_concurrency, 4);
        assert_eq!(config.thread.batch_size, 50);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = BobbinConfig::from_toml_str("[cache]\nmemory_size = 1024\n").unwrap();
        assert_eq!(config.cache.memory_size, ByteSize(1024));
        assert_eq!(config.remote, RemoteConfig::default());
        assert_eq!(config.thread, ThreadConfig::default());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = BobbinConfig::from_toml_str("[remote]\nmax_concurrency = 0\n").unwrap_err();
        assert!(matches!(err, BobbinError::Config(_)));
    }

    #[test]
    fn invalid_size_is_rejected() {
        let err = BobbinConfig::from_toml_str("[cache]\nmemory_size = \"huge\"\n").unwrap_err();
        assert!(matches!(err, BobbinError::ConfigParse(_)));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = BobbinConfig::default();
        config.cache.disk_path = Some(PathBuf::from("cache"));
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("memory_size = \"64MB\""));
        assert_eq!(BobbinConfig::from_toml_str(&text).unwrap(), config);
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobbin.toml");
        std::fs::write(&path, "[thread]\nbatch_size = 7\n").unwrap();

        let config = BobbinConfig::load(&path).await.unwrap();
        assert_eq!(config.thread.batch_size, 7);

        let missing = BobbinConfig::load(&dir.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(BobbinError::Io(_))));
    }

    proptest! {
        #[test]
        fn formatted_sizes_parse_back(n in 0usize..(1 << 40)) {
            prop_assert_eq!(parse_size(&format_size(n)).unwrap(), n);
        }

        #[test]
        fn kilobytes_scale_by_1024(n in 0usize..1_000_000) {
            prop_assert_eq!(parse_size(&format!("{n}KB")).unwrap(), n * 1024);
        }
    }
}
