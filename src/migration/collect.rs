// ABOUTME: Discovers versioned change scripts in a directory
// ABOUTME: Extracts version tokens from filenames and orders scripts numerically

use crate::error::MigrateError;
use anyhow::Result;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

fn version_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d[\d.\-]+"))
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to compile version pattern: {}", e))
}

/// Version embedded in a script filename, e.g. `0001` in `0001-init.sql`.
///
/// Compared component by component (split on `.` and `-`) as unbounded
/// integers, so `2 < 10` and `1.9 < 1.10`.
#[derive(Debug, Clone, Eq)]
pub struct VersionToken {
    raw: String,
    parts: Vec<String>,
}

impl VersionToken {
    /// First version token in `filename`, if any
    ///
    /// ```
    /// # use pg_scriptkit::migration::VersionToken;
    /// assert_eq!(VersionToken::from_filename("0001-init.sql").unwrap().as_str(), "0001");
    /// assert_eq!(VersionToken::from_filename("1.2.3_add_index.sql").unwrap().as_str(), "1.2.3");
    /// assert!(VersionToken::from_filename("readme.sql").is_none());
    /// ```
    pub fn from_filename(filename: &str) -> Option<Self> {
        Self::find(version_pattern().ok()?, filename)
    }

    fn find(pattern: &Regex, filename: &str) -> Option<Self> {
        let found = pattern.find(filename)?;
        let raw = found.as_str().trim_end_matches(['.', '-']);
        if raw.is_empty() {
            return None;
        }

        let parts = raw
            .split(['.', '-'])
            .filter(|p| !p.is_empty())
            .map(|p| {
                let trimmed = p.trim_start_matches('0');
                if trimmed.is_empty() { "0" } else { trimmed }.to_string()
            })
            .collect();

        Some(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for VersionToken {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.parts.iter().zip(&other.parts) {
            let ord = a.len().cmp(&b.len()).then_with(|| a.cmp(b));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.parts
            .len()
            .cmp(&other.parts.len())
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for VersionToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionToken {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One discovered change script.
///
/// Ordered by version, then by filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptChunk {
    pub version: VersionToken,
    pub filename: String,
    pub code: String,
}

/// Read the scripts in `directory` with one of `extensions`, ordered by version
///
/// Files are skipped when their name starts with `_` or carries no version
/// token. A missing or unreadable directory or file is a
/// [`MigrateError::Discovery`] error and nothing is returned.
pub fn collect<S: AsRef<str>>(directory: &Path, extensions: &[S]) -> Result<Vec<ScriptChunk>> {
    let discovery = |source| MigrateError::Discovery {
        path: directory.to_path_buf(),
        source,
    };

    let pattern = version_pattern()?;
    let mut chunks = Vec::new();
    for entry in fs::read_dir(directory).map_err(discovery)? {
        let entry = entry.map_err(discovery)?;
        let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if filename.starts_with('_')
            || !extensions
                .iter()
                .any(|ext| filename.ends_with(ext.as_ref()))
        {
            continue;
        }
        if !entry.file_type().map_err(discovery)?.is_file() {
            continue;
        }
        let Some(version) = VersionToken::find(pattern, &filename) else {
            tracing::debug!("Skipping {} (no version in filename)", filename);
            continue;
        };

        let path = entry.path();
        let code = fs::read_to_string(&path).map_err(|source| MigrateError::Discovery {
            path: path.clone(),
            source,
        })?;
        chunks.push(ScriptChunk {
            version,
            filename,
            code,
        });
    }

    chunks.sort();
    tracing::debug!(
        "Collected {} script(s) from {}",
        chunks.len(),
        directory.display()
    );
    Ok(chunks)
}
