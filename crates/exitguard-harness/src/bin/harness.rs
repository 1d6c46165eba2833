//! CLI entrypoint for the exitguard harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use exitguard_core::{ExitCallRewriter, RewriteConfig};
use exitguard_harness::class_rewrite::rewrite_tree;
use exitguard_harness::structured_log::{
    ArtifactIndex, LogEmitter, sha256_hex, unix_seconds, validate_log_file,
};

/// Exit-call tooling for exitguard.
#[derive(Debug, Parser)]
#[command(name = "exitguard-harness")]
#[command(about = "Rewrite exit calls in compiled units and check run logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite every `.class` file under a directory.
    Rewrite {
        /// Input root of compiled units.
        #[arg(long)]
        input: PathBuf,
        /// Output root; created if missing.
        #[arg(long)]
        output: PathBuf,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Artifact index JSON path.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
        /// Extra reserved identifier prefix (repeatable).
        #[arg(long)]
        reserved_prefix: Vec<String>,
        /// Exemption marker descriptor suffix.
        #[arg(long)]
        marker_suffix: Option<String>,
        /// Class that receives redirected calls.
        #[arg(long)]
        redirect_owner: Option<String>,
        /// Static method on the redirect owner.
        #[arg(long)]
        redirect_name: Option<String>,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        /// Structured JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Rewrite {
            input,
            output,
            log,
            artifact_index,
            reserved_prefix,
            marker_suffix,
            redirect_owner,
            redirect_name,
        } => {
            let mut config = RewriteConfig::default();
            for prefix in &reserved_prefix {
                config = config.with_reserved_prefix(prefix);
            }
            if let Some(suffix) = &marker_suffix {
                config = config.with_marker_suffix(suffix);
            }
            if redirect_owner.is_some() || redirect_name.is_some() {
                let owner = redirect_owner.unwrap_or_else(|| config.redirect.owner.clone());
                let name = redirect_name.unwrap_or_else(|| config.redirect.name.clone());
                config = config.with_redirect(&owner, &name);
            }
            let rewriter = ExitCallRewriter::new(config);

            let run_id = format!("rewrite-{}", unix_seconds());
            let mut emitter = match &log {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    Some(LogEmitter::to_file(path, "exitguard", &run_id)?)
                }
                None => None,
            };

            eprintln!(
                "Rewriting units in {} -> {}",
                input.display(),
                output.display()
            );
            let summary = rewrite_tree(&rewriter, &input, &output, emitter.as_mut())?;
            eprintln!(
                "{} unit(s): {} rewritten, {} unchanged, {} reserved; {} site(s) replaced, {} exempt; {} other file(s) copied",
                summary.units(),
                summary.rewritten,
                summary.unchanged,
                summary.reserved,
                summary.sites_replaced,
                summary.sites_exempt,
                summary.copied,
            );

            if let Some(path) = artifact_index {
                let mut index = ArtifactIndex::new(&run_id, "exitguard");
                for record in &summary.outputs {
                    let kind = record.disposition.map_or("copy", |d| d.as_str());
                    index.add_sized(
                        output.join(&record.relative).display().to_string(),
                        kind,
                        record.sha256.clone(),
                        record.size_bytes,
                        record.relative.clone(),
                    );
                }
                if let Some(log) = &log {
                    index.add(log.display().to_string(), "log", sha256_hex(&std::fs::read(log)?));
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, index.to_json()?)?;
                eprintln!("Artifact index written to {}", path.display());
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            if !errors.is_empty() {
                return Err(format!(
                    "{}: {} violation(s) in {lines} line(s)",
                    log.display(),
                    errors.len()
                )
                .into());
            }
            eprintln!("{}: {lines} line(s) valid", log.display());
        }
    }

    Ok(())
}
