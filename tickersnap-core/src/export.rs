//! Export pipeline: fetch → normalize → write JSON.

use crate::fetch::SectionStatus;
use crate::model::ExportDocument;
use crate::normalize::{normalize_history, IndexColumn};
use crate::provider::{HistoryWindow, Interval, MarketDataProvider, Ticker};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Export failures. Only the filesystem can fail an export; provider
/// failures degrade the document instead.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to resolve {}: {source}", path.display())]
    Canonicalize { path: PathBuf, source: io::Error },

    #[error("failed to serialize export document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What to fetch and how to shape it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub window: HistoryWindow,
    pub interval: Interval,
    pub index_column: IndexColumn,
}

impl ExportOptions {
    pub fn with_window(window: HistoryWindow) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }
}

/// Where the document went and whether each section is real data.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub info: SectionStatus,
    pub history: SectionStatus,
}

impl ExportReport {
    /// True when either section had to be defaulted.
    pub fn is_degraded(&self) -> bool {
        self.info.is_fallback() || self.history.is_fallback()
    }
}

/// Runs exports against one provider.
pub struct Exporter<'p> {
    provider: &'p dyn MarketDataProvider,
    options: ExportOptions,
}

impl<'p> Exporter<'p> {
    pub fn new(provider: &'p dyn MarketDataProvider, options: ExportOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Fetch both sections and build the document. Never fails.
    pub fn build_document(&self, symbol: &str) -> (ExportDocument, SectionStatus, SectionStatus) {
        let ticker = Ticker::new(self.provider, symbol);

        let info = ticker.info();
        let info_status = info.status(|m| m.len());

        let history = ticker
            .history(&self.options.window, &self.options.interval)
            .map(|table| normalize_history(table, &self.options.index_column));
        let history_status = history.status(Vec::len);

        let doc = ExportDocument::new(info.into_value(), history.into_value());
        (doc, info_status, history_status)
    }

    /// Export `symbol` to `destination` and report what was written.
    pub fn run(
        &self,
        symbol: &str,
        destination: impl AsRef<Path>,
    ) -> Result<ExportReport, ExportError> {
        let (doc, info, history) = self.build_document(symbol);
        let path = write_document(destination.as_ref(), &doc)?;
        log::info!(
            "[{symbol}] wrote {} ({} info keys, {} history rows)",
            path.display(),
            doc.info.len(),
            doc.history.len()
        );
        Ok(ExportReport {
            path,
            info,
            history,
        })
    }
}

/// Export `symbol` and return the absolute path written.
pub fn export(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    destination: impl AsRef<Path>,
    window: HistoryWindow,
) -> Result<PathBuf, ExportError> {
    export_with_report(provider, symbol, destination, ExportOptions::with_window(window))
        .map(|report| report.path)
}

/// Export `symbol` and say which sections fell back to empty.
pub fn export_with_report(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    destination: impl AsRef<Path>,
    options: ExportOptions,
) -> Result<ExportReport, ExportError> {
    Exporter::new(provider, options).run(symbol, destination)
}

/// Pretty JSON (2-space indent, UTF-8, non-ASCII literal), written to a
/// temp file beside the destination and renamed over it.
///
/// A destination that is an existing symlink is written through: the link
/// stays and its target gets the new contents.
pub fn write_document(path: &Path, doc: &ExportDocument) -> Result<PathBuf, ExportError> {
    let json = serde_json::to_vec_pretty(doc)?;
    let target = resolve_destination(path)?;
    write_atomic(&target, |file| file.write_all(&json))?;

    std::fs::canonicalize(&target).map_err(|source| ExportError::Canonicalize {
        path: target,
        source,
    })
}

/// Absolute, lexically normalized destination, followed through a symlink.
fn resolve_destination(path: &Path) -> Result<PathBuf, ExportError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| ExportError::Canonicalize {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };
    let absolute = normalize_lexically(&absolute);

    match std::fs::symlink_metadata(&absolute) {
        // Dangling links fall through and get replaced.
        Ok(meta) if meta.file_type().is_symlink() => {
            Ok(std::fs::canonicalize(&absolute).unwrap_or(absolute))
        }
        _ => Ok(absolute),
    }
}

/// Drop `.` and fold `..` into its parent without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // `..` at the root stays at the root.
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Create `target`'s parent, fill a temp file there with `write`, then
/// rename it over `target`. The temp file is removed on every error path.
fn write_atomic(
    target: &Path,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> Result<(), ExportError> {
    let write_err = |source: io::Error| ExportError::Write {
        path: target.to_path_buf(),
        source,
    };

    let parent = target.parent().ok_or_else(|| {
        write_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "destination has no parent directory",
        ))
    })?;
    std::fs::create_dir_all(parent).map_err(|source| ExportError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tickersnap-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(write_err)?;
    write(tmp.as_file_mut()).map_err(write_err)?;

    #[cfg(unix)]
    tmp.as_file()
        .set_permissions(output_permissions(target))
        .map_err(write_err)?;

    tmp.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Keep an existing file's mode; new files get 0644 rather than the temp
/// file's 0600.
#[cfg(unix)]
fn output_permissions(target: &Path) -> std::fs::Permissions {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(target)
        .map(|meta| meta.permissions())
        .unwrap_or_else(|_| std::fs::Permissions::from_mode(0o644))
}
