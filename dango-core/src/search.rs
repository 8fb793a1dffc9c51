//! In-buffer regex search state
//!
//! A search holds a compiled pattern and the paragraph currently under
//! examination. The buffer walks paragraph-by-paragraph through the
//! unified history+active stream, matching against each paragraph's full
//! pre-wrap text.

use regex::Regex;
use thiserror::Error;

use crate::APos;

/// Search entry failure
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("bad search pattern: {0}")]
    BadPattern(#[from] regex::Error),
}

/// An in-progress search
#[derive(Debug)]
pub struct Search {
    pub(crate) regex: Regex,
    pattern: String,
    /// First row of the paragraph under examination, in absolute rows
    pub(crate) row: isize,
    /// Matches within the current paragraph, as position pairs
    matches: Vec<(APos, APos)>,
}

impl Search {
    pub fn new(pattern: &str, start_row: isize) -> Result<Self, SearchError> {
        let regex = Regex::new(pattern)?;
        Ok(Self { regex, pattern: pattern.to_owned(), row: start_row, matches: Vec::new() })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Matches of the paragraph most recently examined
    pub fn matches(&self) -> &[(APos, APos)] {
        &self.matches
    }

    pub(crate) fn set_matches(&mut self, matches: Vec<(APos, APos)>) {
        self.matches = matches;
    }
}
