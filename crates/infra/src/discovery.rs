//! Filesystem manifest discovery.
//!
//! Scans `<root>/<package>/module.json`. One broken package never blocks the
//! others: missing or malformed manifests are logged and reported as skipped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use bizdesk_modules::ModuleManifest;

pub const MANIFEST_FILE: &str = "module.json";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("packages directory {0} does not exist")]
    MissingRoot(PathBuf),

    #[error("cannot read packages directory {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedManifest {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub manifests: Vec<ModuleManifest>,
    pub skipped: Vec<SkippedManifest>,
}

#[derive(Debug, Clone)]
pub struct ManifestDiscovery {
    root: PathBuf,
}

impl ManifestDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn discover(&self) -> Result<DiscoveryReport, DiscoveryError> {
        if !self.root.is_dir() {
            return Err(DiscoveryError::MissingRoot(self.root.clone()));
        }

        let mut report = DiscoveryReport::default();
        let mut seen = BTreeSet::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(DiscoveryError::Root {
                        path: self.root.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    skip(&mut report, path, err.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path().join(MANIFEST_FILE);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    skip(&mut report, path, format!("unreadable manifest: {err}"));
                    continue;
                }
            };
            match ModuleManifest::parse(&content) {
                Ok(manifest) => {
                    if seen.insert(manifest.name.clone()) {
                        report.manifests.push(manifest);
                    } else {
                        let reason = format!("module '{}' already declared by another package", manifest.name);
                        skip(&mut report, path, reason);
                    }
                }
                Err(err) => skip(&mut report, path, err.to_string()),
            }
        }

        info!(
            root = %self.root.display(),
            found = report.manifests.len(),
            skipped = report.skipped.len(),
            "manifest discovery completed"
        );
        Ok(report)
    }
}

fn skip(report: &mut DiscoveryReport, path: PathBuf, reason: String) {
    warn!(path = %path.display(), reason = %reason, "skipping module package");
    report.skipped.push(SkippedManifest { path, reason });
}
