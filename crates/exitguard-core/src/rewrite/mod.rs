//! Redirect calls to the termination primitive.
//!
//! [`ExitCallRewriter`] takes the raw bytes of one compiled unit plus its
//! identifier and returns bytes in which every `invokestatic` of the
//! termination symbol calls the redirect target instead. The descriptor is
//! carried over unchanged, so the operand stack shape at the call site is
//! identical.
//!
//! Exclusion order:
//! 1. Reserved identifier prefix: the input is returned as-is and never
//!    parsed.
//! 2. Exemption marker on the class: every call site is left alone.
//! 3. Exemption marker on a method: that method's call sites are left alone.
//!
//! Malformed input is always rejected; it is never passed through.

pub mod exclusion;
mod splice;

pub use exclusion::{
    DEFAULT_MARKER_SUFFIX, DEFAULT_RESERVED_PREFIXES, RewriteExclusionSet, normalize_identifier,
};

use std::borrow::Cow;

use thiserror::Error;

use crate::classfile::bytecode::opcode;
use crate::classfile::{ClassFile, ClassFileError, InstructionWalker};
use splice::PoolAppender;

/// Owner of the default termination primitive.
pub const DEFAULT_TERMINATION_OWNER: &str = "java/lang/System";
/// Name of the default termination primitive.
pub const DEFAULT_TERMINATION_NAME: &str = "exit";
/// Owner of the default redirect entry point.
pub const DEFAULT_REDIRECT_OWNER: &str =
    "com/ginsberg/junit/exit/agent/AgentSystemExitHandlerStrategy";
/// Name of the default redirect entry point.
pub const DEFAULT_REDIRECT_NAME: &str = "handleExit";

/// A static method named by owner (internal form) and member name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSymbol {
    pub owner: String,
    pub name: String,
}

impl MethodSymbol {
    /// Dotted owners are normalized to the internal slash form.
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: normalize_identifier(owner).into_owned(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for MethodSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Rewriter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    pub termination: MethodSymbol,
    pub redirect: MethodSymbol,
    pub reserved_prefixes: Vec<String>,
    pub marker_suffix: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            termination: MethodSymbol::new(DEFAULT_TERMINATION_OWNER, DEFAULT_TERMINATION_NAME),
            redirect: MethodSymbol::new(DEFAULT_REDIRECT_OWNER, DEFAULT_REDIRECT_NAME),
            reserved_prefixes: DEFAULT_RESERVED_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            marker_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
        }
    }
}

impl RewriteConfig {
    #[must_use]
    pub fn with_termination(mut self, owner: &str, name: &str) -> Self {
        self.termination = MethodSymbol::new(owner, name);
        self
    }

    #[must_use]
    pub fn with_redirect(mut self, owner: &str, name: &str) -> Self {
        self.redirect = MethodSymbol::new(owner, name);
        self
    }

    /// Add a reserved prefix on top of the current ones.
    #[must_use]
    pub fn with_reserved_prefix(mut self, prefix: &str) -> Self {
        self.reserved_prefixes.push(prefix.to_string());
        self
    }

    #[must_use]
    pub fn with_marker_suffix(mut self, suffix: &str) -> Self {
        self.marker_suffix = suffix.to_string();
        self
    }
}

/// A unit that could not be rewritten. Loading it must fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected {identifier}: {source}")]
pub struct RewriteError {
    pub identifier: String,
    #[source]
    pub source: ClassFileError,
}

/// What happened to a unit as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Identifier matched a reserved prefix; bytes were not parsed.
    Reserved,
    /// Parsed, no call site replaced; output is byte-identical.
    Unchanged,
    /// At least one call site replaced.
    Rewritten,
}

impl Disposition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Unchanged => "unchanged",
            Self::Rewritten => "rewritten",
        }
    }
}

/// What happened at one matching call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteAction {
    Replaced,
    /// Left alone because of a class- or method-level exemption marker.
    Exempt,
}

/// One matching call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRecord {
    pub method: String,
    pub descriptor: String,
    /// Bytecode offset of the `invokestatic` within the method.
    pub offset: usize,
    pub action: SiteAction,
}

/// Summary of one rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    pub identifier: String,
    pub disposition: Disposition,
    /// True when the class carried the exemption marker.
    pub class_exempt: bool,
    pub sites: Vec<SiteRecord>,
    /// BLAKE3 hex digest of the output bytes.
    pub fingerprint: String,
}

impl RewriteReport {
    #[must_use]
    pub fn replaced(&self) -> usize {
        self.sites
            .iter()
            .filter(|s| s.action == SiteAction::Replaced)
            .count()
    }

    #[must_use]
    pub fn exempt(&self) -> usize {
        self.sites.len() - self.replaced()
    }
}

/// Output bytes plus report. Borrows the input when nothing changed.
#[derive(Debug, Clone)]
pub struct RewriteOutcome<'b> {
    pub bytes: Cow<'b, [u8]>,
    pub report: RewriteReport,
}

impl RewriteOutcome<'_> {
    #[must_use]
    pub fn is_modified(&self) -> bool {
        matches!(self.bytes, Cow::Owned(_))
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes.into_owned()
    }
}

/// Stateless call rewriter; safe to share across loader threads.
#[derive(Debug, Clone)]
pub struct ExitCallRewriter {
    config: RewriteConfig,
    exclusions: RewriteExclusionSet,
}

impl Default for ExitCallRewriter {
    fn default() -> Self {
        Self::new(RewriteConfig::default())
    }
}

impl ExitCallRewriter {
    /// Build a rewriter. The redirect owner is always excluded so its own
    /// call to the real primitive is never redirected back into itself.
    #[must_use]
    pub fn new(config: RewriteConfig) -> Self {
        let exclusions =
            RewriteExclusionSet::new(config.reserved_prefixes.iter().cloned(), &config.marker_suffix)
                .with_protected_class(&config.redirect.owner);
        Self { config, exclusions }
    }

    #[must_use]
    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    #[must_use]
    pub fn exclusions(&self) -> &RewriteExclusionSet {
        &self.exclusions
    }

    /// Rewrite one unit.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError`] when the bytes are not a well-formed class
    /// file, or when the redirect entries do not fit in the constant pool.
    pub fn rewrite<'b>(
        &self,
        bytes: &'b [u8],
        identifier: &str,
    ) -> Result<RewriteOutcome<'b>, RewriteError> {
        let id = normalize_identifier(identifier);
        let reject = |source| RewriteError {
            identifier: id.to_string(),
            source,
        };

        if self.exclusions.is_reserved(&id) {
            return Ok(RewriteOutcome {
                bytes: Cow::Borrowed(bytes),
                report: RewriteReport {
                    identifier: id.to_string(),
                    disposition: Disposition::Reserved,
                    class_exempt: false,
                    sites: Vec::new(),
                    fingerprint: fingerprint(bytes),
                },
            });
        }

        let class = ClassFile::parse(bytes).map_err(reject)?;
        let class_exempt = self.exclusions.has_marker(&class.annotations);
        let term_owner = self.config.termination.owner.as_bytes();
        let term_name = self.config.termination.name.as_bytes();

        let mut appender = PoolAppender::new(&class.constant_pool);
        let mut patches = Vec::new();
        let mut sites = Vec::new();

        for method in &class.methods {
            let Some(span) = method.code else { continue };
            let exempt = class_exempt || self.exclusions.has_marker(&method.annotations);
            let code = span.slice(bytes);

            for insn in InstructionWalker::new(code) {
                let insn = insn.map_err(reject)?;
                if insn.opcode != opcode::INVOKESTATIC {
                    continue;
                }
                let Some(index) = insn.operand_u16(code) else {
                    continue;
                };
                let target = class.constant_pool.method_ref(index).map_err(reject)?;
                if target.owner != term_owner || target.name != term_name {
                    continue;
                }

                let action = if exempt {
                    SiteAction::Exempt
                } else {
                    let redirect = appender
                        .method_ref(
                            self.config.redirect.owner.as_bytes(),
                            self.config.redirect.name.as_bytes(),
                            target.descriptor,
                            target.descriptor_index,
                        )
                        .map_err(reject)?;
                    patches.push((span.offset + insn.pc + 1, redirect));
                    SiteAction::Replaced
                };
                sites.push(SiteRecord {
                    method: method.display_name(),
                    descriptor: method.display_descriptor(),
                    offset: insn.pc,
                    action,
                });
            }
        }

        let (bytes, disposition) = if patches.is_empty() && appender.is_empty() {
            (Cow::Borrowed(bytes), Disposition::Unchanged)
        } else {
            (Cow::Owned(appender.splice(&class, &patches)), Disposition::Rewritten)
        };

        Ok(RewriteOutcome {
            report: RewriteReport {
                identifier: id.to_string(),
                disposition,
                class_exempt,
                sites,
                fingerprint: fingerprint(&bytes),
            },
            bytes,
        })
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
