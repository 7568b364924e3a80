use regex::Regex;

use crate::error::Error;

/// Compiled form of `default.namespace_patterns` (spec.md §6, §3 invariant 4).
///
/// An empty pattern list matches every namespace. Shared by the Store's
/// ingest filter and the deprecated HTTP list endpoints so both apply
/// the exact same policy.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    patterns: Vec<Regex>,
}

impl NamespaceFilter {
    pub fn compile(patterns: &[String]) -> Result<Self, Error> {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|source| Error::InvalidNamespacePattern { pattern: pattern.clone(), source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns: compiled })
    }

    /// An unrestricted filter, matching every namespace.
    pub fn allow_all() -> Self {
        Self { patterns: Vec::new() }
    }

    /// A namespace matches if any pattern matches its name, or if no
    /// patterns are configured at all.
    pub fn matches(&self, namespace: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_list_allows_everything() {
        let filter = NamespaceFilter::compile(&[]).unwrap();
        assert!(filter.matches("anything"));
        assert!(filter.matches(""));
    }

    #[test]
    fn matches_any_configured_pattern() {
        let filter =
            NamespaceFilter::compile(&["^prod-.*$".to_string(), "^kube-system$".to_string()]).unwrap();
        assert!(filter.matches("prod-a"));
        assert!(filter.matches("kube-system"));
        assert!(!filter.matches("dev-a"));
    }

    #[test]
    fn rejects_invalid_regex_at_compile_time() {
        let err = NamespaceFilter::compile(&["(unterminated".to_string()]).unwrap_err();
        assert!(matches!(err, Error::InvalidNamespacePattern { .. }));
    }
}
