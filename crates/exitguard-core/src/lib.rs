//! # exitguard-core
//!
//! Class-file model and the termination-call rewriter.
//!
//! The rewriter is a pure function of its input bytes and immutable
//! configuration. It never logs; callers turn the returned
//! [`rewrite::RewriteReport`] into log lines.

#![deny(unsafe_code)]

pub mod classfile;
pub mod rewrite;

pub use classfile::{ClassFile, ClassFileError, ClassFileResult};
pub use rewrite::{
    Disposition, ExitCallRewriter, MethodSymbol, RewriteConfig, RewriteError,
    RewriteExclusionSet, RewriteOutcome, RewriteReport, SiteAction, SiteRecord,
};
