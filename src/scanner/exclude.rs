//! Substring exclusion list.
//!
//! A path is excluded if it contains any listed pattern as a plain substring.
//! Patterns come from the per-user `excludes.conf`, one per line. Text after
//! `#` is a comment, surrounding whitespace is trimmed, and blank lines are
//! skipped.
//!
//! Matching is done on the raw path bytes with a [`regex::bytes::RegexSet`]
//! built from escaped literals, so every pattern is tested in a single pass.

use std::path::Path;

use regex::bytes::RegexSet;

use crate::records::path_to_bytes;

/// Errors that can occur while building an exclusion list.
#[derive(thiserror::Error, Debug)]
pub enum ExcludeError {
    /// The pattern set could not be compiled.
    #[error("Invalid exclusion patterns: {0}")]
    Build(#[from] regex::Error),
}

/// Compiled set of exclusion substrings.
#[derive(Debug, Clone)]
pub struct ExclusionList {
    patterns: Vec<String>,
    set: RegexSet,
}

impl Default for ExclusionList {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: RegexSet::empty(),
        }
    }
}

impl ExclusionList {
    /// Parse the contents of an exclusion file.
    ///
    /// # Errors
    ///
    /// Returns [`ExcludeError`] if the pattern set cannot be compiled.
    pub fn parse(contents: &str) -> Result<Self, ExcludeError> {
        Self::from_patterns(parse_lines(contents))
    }

    /// Build a list from already-cleaned patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ExcludeError`] if the pattern set cannot be compiled.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, ExcludeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: Vec<String> = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.is_empty())
            .collect();
        patterns.dedup();

        let set = RegexSet::new(patterns.iter().map(|p| regex::escape(p)))?;
        log::debug!("Loaded {} exclusion pattern(s)", patterns.len());
        Ok(Self { patterns, set })
    }

    /// Whether the path contains any excluded substring.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        !self.patterns.is_empty() && self.set.is_match(&path_to_bytes(path))
    }

    /// The patterns in file order.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the list has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| match line.find('#') {
            Some(i) => &line[..i],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
