//! Offline rewriting of a directory of compiled units.
//!
//! Every `.class` file under the input root goes through the rewriter; its
//! identifier is the relative path without the extension. Other files are
//! copied verbatim. The first rejected unit stops the run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use exitguard_core::{Disposition, ExitCallRewriter, RewriteError, RewriteReport, SiteAction};
use thiserror::Error;

use crate::structured_log::{LogEmitter, LogLevel, Outcome, StreamKind, event, sha256_hex};

const CLASS_SUFFIX: &str = ".class";

#[derive(Debug, Error)]
pub enum TreeRewriteError {
    #[error("input {0} is not a directory")]
    InputNotDirectory(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: {source}")]
    Rejected {
        path: PathBuf,
        #[source]
        source: RewriteError,
    },
    #[error("failed to write log: {0}")]
    Log(#[source] io::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> TreeRewriteError + '_ {
    move |source| TreeRewriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One file written to the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// Path relative to the output root, `/`-separated.
    pub relative: String,
    /// `None` for files that are not compiled units.
    pub disposition: Option<Disposition>,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Totals for one tree rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub rewritten: usize,
    pub unchanged: usize,
    pub reserved: usize,
    pub copied: usize,
    pub sites_replaced: usize,
    pub sites_exempt: usize,
    pub outputs: Vec<OutputRecord>,
}

impl TreeSummary {
    #[must_use]
    pub fn units(&self) -> usize {
        self.rewritten + self.unchanged + self.reserved
    }
}

/// Rewrite every unit under `input` into the same layout under `output`.
///
/// # Errors
///
/// Fails on the first unreadable or unwritable file, or on the first unit
/// the rewriter rejects. Files already written stay in place.
pub fn rewrite_tree(
    rewriter: &ExitCallRewriter,
    input: &Path,
    output: &Path,
    mut emitter: Option<&mut LogEmitter>,
) -> Result<TreeSummary, TreeRewriteError> {
    if !input.is_dir() {
        return Err(TreeRewriteError::InputNotDirectory(input.to_path_buf()));
    }
    let mut files = Vec::new();
    collect_files(input, &mut files)?;
    files.sort();

    let mut summary = TreeSummary::default();
    for path in files {
        let relative = relative_name(input, &path);
        let target = output.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let data = fs::read(&path).map_err(io_err(&path))?;

        let Some(identifier) = relative.strip_suffix(CLASS_SUFFIX) else {
            fs::write(&target, &data).map_err(io_err(&target))?;
            summary.copied += 1;
            summary.outputs.push(OutputRecord {
                relative,
                disposition: None,
                sha256: sha256_hex(&data),
                size_bytes: data.len() as u64,
            });
            continue;
        };

        let outcome = match rewriter.rewrite(&data, identifier) {
            Ok(outcome) => outcome,
            Err(source) => {
                if let Some(emitter) = emitter.as_deref_mut() {
                    let entry = emitter
                        .entry(LogLevel::Error, event::UNIT_REJECTED)
                        .with_stream(StreamKind::Rewrite)
                        .with_unit(identifier)
                        .with_outcome(Outcome::Fail)
                        .with_details(serde_json::json!({ "error": source.source.to_string() }));
                    emitter.emit_entry(entry).map_err(TreeRewriteError::Log)?;
                    emitter.flush().map_err(TreeRewriteError::Log)?;
                }
                return Err(TreeRewriteError::Rejected { path, source });
            }
        };

        fs::write(&target, &outcome.bytes).map_err(io_err(&target))?;
        let report = &outcome.report;
        match report.disposition {
            Disposition::Rewritten => summary.rewritten += 1,
            Disposition::Unchanged => summary.unchanged += 1,
            Disposition::Reserved => summary.reserved += 1,
        }
        summary.sites_replaced += report.replaced();
        summary.sites_exempt += report.exempt();
        let sha256 = sha256_hex(&outcome.bytes);
        if let Some(emitter) = emitter.as_deref_mut() {
            log_report(emitter, report, &relative, &sha256).map_err(TreeRewriteError::Log)?;
        }
        summary.outputs.push(OutputRecord {
            relative,
            disposition: Some(report.disposition),
            sha256,
            size_bytes: outcome.bytes.len() as u64,
        });
    }
    if let Some(emitter) = emitter {
        emitter.flush().map_err(TreeRewriteError::Log)?;
    }
    Ok(summary)
}

fn log_report(
    emitter: &mut LogEmitter,
    report: &RewriteReport,
    relative: &str,
    sha256: &str,
) -> io::Result<()> {
    for site in &report.sites {
        let name = match site.action {
            SiteAction::Replaced => event::SITE_REWRITTEN,
            SiteAction::Exempt => event::SITE_EXEMPT,
        };
        let entry = emitter
            .entry(LogLevel::Debug, name)
            .with_stream(StreamKind::Rewrite)
            .with_unit(&report.identifier)
            .with_symbol(&site.method)
            .with_details(serde_json::json!({
                "descriptor": site.descriptor,
                "offset": site.offset,
            }));
        emitter.emit_entry(entry)?;
    }

    let name = match report.disposition {
        Disposition::Rewritten => event::UNIT_REWRITTEN,
        Disposition::Unchanged => event::UNIT_UNCHANGED,
        Disposition::Reserved => event::UNIT_SKIPPED,
    };
    let outcome = if report.disposition == Disposition::Reserved {
        Outcome::Skip
    } else {
        Outcome::Pass
    };
    let entry = emitter
        .entry(LogLevel::Info, name)
        .with_stream(StreamKind::Rewrite)
        .with_unit(&report.identifier)
        .with_outcome(outcome)
        .with_artifacts(vec![relative.to_string()])
        .with_details(serde_json::json!({
            "class_exempt": report.class_exempt,
            "sites_replaced": report.replaced(),
            "sites_exempt": report.exempt(),
            "fingerprint": report.fingerprint,
            "sha256": sha256,
        }));
    emitter.emit_entry(entry)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), TreeRewriteError> {
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// `path` relative to `root`, joined with `/` on every platform.
fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
