//! Static security scanner for plugin source trees.
//!
//! Every line of every source file is matched against a fixed set of
//! dangerous-pattern detectors. This is pattern matching, not parsing:
//! false positives and negatives are expected, and scanned code is never
//! executed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PluginConfig;

/// Severity of a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    /// Process execution and dynamic code evaluation
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// `(type, severity, pattern)`
const DETECTORS: &[(&str, Severity, &str)] = &[
    ("eval", Severity::Critical, r"\beval\s*\("),
    ("assert", Severity::Critical, r"\bassert\s*\("),
    ("create_function", Severity::Critical, r"\bcreate_function\s*\("),
    ("exec", Severity::Critical, r"\bexec\s*\("),
    ("shell_exec", Severity::Critical, r"\bshell_exec\s*\("),
    ("system", Severity::Critical, r"\bsystem\s*\("),
    ("passthru", Severity::Critical, r"\bpassthru\s*\("),
    ("proc_open", Severity::Critical, r"\bproc_open\s*\("),
    ("popen", Severity::Critical, r"\bpopen\s*\("),
    (
        "raw_sql",
        Severity::High,
        r"(?i)\b(mysqli?_query|pg_query|DB::(raw|unprepared|statement)|(where|select|order|having)Raw)\s*\(",
    ),
    ("unserialize", Severity::High, r"\bunserialize\s*\("),
    (
        "env_credentials",
        Severity::High,
        r#"(?i)\b(getenv|env)\s*\(\s*['"][A-Z0-9_]*(PASSWORD|SECRET|TOKEN|API_KEY|PRIVATE_KEY)[A-Z0-9_]*['"]"#,
    ),
    ("curl_exec", Severity::Medium, r"\bcurl_exec\s*\("),
    (
        "remote_file_read",
        Severity::Medium,
        r#"\b(file_get_contents|fopen)\s*\(\s*['"]https?://"#,
    ),
    ("parse_str", Severity::Medium, r"\bparse_str\s*\("),
    ("base64_decode", Severity::Medium, r"\bbase64_decode\s*\("),
    (
        "dynamic_include",
        Severity::Low,
        r"\b(include|require)(_once)?\s*\(?\s*\$",
    ),
    (
        "reflection_call",
        Severity::Low,
        r"\bcall_user_func(_array)?\s*\(",
    ),
    ("file_write", Severity::Low, r"\bfile_put_contents\s*\("),
];

static COMPILED_DETECTORS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DETECTORS
        .iter()
        .filter_map(|&(kind, _, pattern)| match Regex::new(pattern) {
            Ok(regex) => Some((kind, regex)),
            Err(e) => {
                warn!(detector = kind, error = %e, "Invalid detector pattern");
                None
            }
        })
        .collect()
});

/// A single flagged line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanIssue {
    /// Path relative to the scanned root
    pub file: String,
    /// 1-based line number
    pub line: usize,
    /// Detector that matched
    #[serde(rename = "type")]
    pub issue_type: String,
    /// Trimmed source line
    pub code: String,
}

impl ScanIssue {
    pub fn severity(&self) -> Severity {
        severity(&self.issue_type)
    }
}

/// Outcome of scanning one plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub safe: bool,
    pub issues: Vec<ScanIssue>,
}

impl ScanResult {
    /// Most severe issue found, if any.
    pub fn highest_severity(&self) -> Option<Severity> {
        self.issues.iter().map(ScanIssue::severity).max()
    }
}

/// Severity class of a detector type. Unknown types are `Low`.
pub fn severity(issue_type: &str) -> Severity {
    DETECTORS
        .iter()
        .find(|(kind, _, _)| *kind == issue_type)
        .map_or(Severity::Low, |entry| entry.1)
}

/// Tally issues per detector type.
pub fn summarize(issues: &[ScanIssue]) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for issue in issues {
        *summary.entry(issue.issue_type.clone()).or_insert(0) += 1;
    }
    summary
}

/// Walks plugin source trees and flags dangerous lines.
#[derive(Debug, Clone)]
pub struct SecurityScanner {
    extensions: Vec<String>,
}

impl SecurityScanner {
    /// Create a scanner for files with the given extensions.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.into().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(config.scan_extensions.iter().cloned())
    }

    /// Scan every source file under `plugin_path`.
    ///
    /// A missing path is reported as safe. Files that fail to read are
    /// skipped; files that are not valid UTF-8 are scanned lossily.
    pub async fn scan(&self, plugin_path: &Path) -> ScanResult {
        if !plugin_path.exists() {
            warn!(path = %plugin_path.display(), "Scan target does not exist");
            return ScanResult {
                safe: true,
                issues: Vec::new(),
            };
        }

        let mut issues = Vec::new();
        for file in self.collect_source_files(plugin_path) {
            let bytes = match tokio::fs::read(&file).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            // Invalid UTF-8 must not hide a file from the detectors.
            let content = String::from_utf8_lossy(&bytes);
            let relative = relative_name(plugin_path, &file);
            issues.extend(scan_content(&relative, &content));
        }

        debug!(
            path = %plugin_path.display(),
            issues = issues.len(),
            "Scan complete"
        );

        ScanResult {
            safe: issues.is_empty(),
            issues,
        }
    }

    fn collect_source_files(&self, root: &Path) -> Vec<PathBuf> {
        walkdir::WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.is_source_file(entry.path()))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }

    fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }
}

impl Default for SecurityScanner {
    fn default() -> Self {
        Self::from_config(&PluginConfig::default())
    }
}

/// Match every line of `content` against the detectors.
pub fn scan_content(file: &str, content: &str) -> Vec<ScanIssue> {
    let mut issues = Vec::new();
    for (index, line) in content.lines().enumerate() {
        for (kind, regex) in COMPILED_DETECTORS.iter() {
            if regex.is_match(line) {
                issues.push(ScanIssue {
                    file: file.to_string(),
                    line: index + 1,
                    issue_type: kind.to_string(),
                    code: line.trim().to_string(),
                });
            }
        }
    }
    issues
}

fn relative_name(root: &Path, file: &Path) -> String {
    let relative = match file.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel,
        _ => file.file_name().map(Path::new).unwrap_or(file),
    };
    relative.to_string_lossy().replace('\\', "/")
}
