//! Which units and members the rewriter must leave alone.

use std::borrow::Cow;

/// Namespaces that are never rewritten: the runtime's own bootstrap code and
/// the build tool's worker classes.
pub const DEFAULT_RESERVED_PREFIXES: [&str; 5] =
    ["com/sun/", "java/", "jdk/", "sun/", "worker/org/gradle/"];

/// Suffix of the exemption annotation's type descriptor.
pub const DEFAULT_MARKER_SUFFIX: &str = "/DoNotRewriteExitCalls;";

/// Convert a dotted binary name (`com.example.App`) to the internal form
/// (`com/example/App`). Slash-form input is returned borrowed.
#[must_use]
pub fn normalize_identifier(identifier: &str) -> Cow<'_, str> {
    if identifier.contains('.') {
        Cow::Owned(identifier.replace('.', "/"))
    } else {
        Cow::Borrowed(identifier)
    }
}

/// Immutable exclusion rules fixed when the rewriter is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteExclusionSet {
    prefixes: Vec<String>,
    protected_classes: Vec<String>,
    marker_suffix: Vec<u8>,
}

impl Default for RewriteExclusionSet {
    fn default() -> Self {
        Self::new(
            DEFAULT_RESERVED_PREFIXES.iter().map(|p| (*p).to_string()),
            DEFAULT_MARKER_SUFFIX,
        )
    }
}

impl RewriteExclusionSet {
    /// Build a set from explicit prefixes and marker suffix. Prefixes are
    /// normalized to slash form.
    pub fn new(prefixes: impl IntoIterator<Item = String>, marker_suffix: &str) -> Self {
        let mut prefixes: Vec<String> = prefixes
            .into_iter()
            .map(|p| normalize_identifier(&p).into_owned())
            .filter(|p| !p.is_empty())
            .collect();
        prefixes.sort();
        prefixes.dedup();
        Self {
            prefixes,
            protected_classes: Vec::new(),
            marker_suffix: marker_suffix.as_bytes().to_vec(),
        }
    }

    /// Add a reserved prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let prefix = normalize_identifier(prefix).into_owned();
        if !prefix.is_empty() && !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
            self.prefixes.sort();
        }
        self
    }

    /// Exclude one class and its nested classes (`Owner$Inner`).
    #[must_use]
    pub fn with_protected_class(mut self, internal_name: &str) -> Self {
        let name = normalize_identifier(internal_name).into_owned();
        if !name.is_empty() && !self.protected_classes.contains(&name) {
            self.protected_classes.push(name);
        }
        self
    }

    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    #[must_use]
    pub fn protected_classes(&self) -> &[String] {
        &self.protected_classes
    }

    #[must_use]
    pub fn marker_suffix(&self) -> &[u8] {
        &self.marker_suffix
    }

    /// True when the (already normalized) identifier must not be parsed or
    /// rewritten at all.
    #[must_use]
    pub fn is_reserved(&self, identifier: &str) -> bool {
        self.prefixes.iter().any(|p| identifier.starts_with(p.as_str()))
            || self.protected_classes.iter().any(|c| {
                identifier
                    .strip_prefix(c.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('$'))
            })
    }

    /// True when an annotation type descriptor is the exemption marker.
    #[must_use]
    pub fn is_marker(&self, descriptor: &[u8]) -> bool {
        !self.marker_suffix.is_empty() && descriptor.ends_with(&self.marker_suffix)
    }

    /// True when any descriptor in `annotations` is the exemption marker.
    #[must_use]
    pub fn has_marker(&self, annotations: &[&[u8]]) -> bool {
        annotations.iter().any(|d| self.is_marker(d))
    }
}
