//! Runtime tunables

use serde::Deserialize;

/// Terminal configuration
///
/// Deserializable so hosts can load it from their own config files; every
/// field has a sensible default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial geometry
    pub rows: usize,
    pub cols: usize,
    /// Maximum wrapped rows of scroll-back
    pub history_limit: usize,
    /// Ignore `history_limit` and keep everything
    pub unlimited_history: bool,
    /// Jump to the live bottom when the child produces output
    pub scroll_on_tty_output: bool,
    /// Jump to the live bottom on paste and key input
    pub scroll_on_key_press: bool,
    /// Bytes pulled from the pty per read
    pub read_chunk_size: usize,
    /// Per-pump time budget in milliseconds, to keep rendering responsive
    pub read_budget_ms: u64,
}

impl Config {
    /// The history bound as the buffer wants it
    pub fn history_bound(&self) -> Option<usize> {
        if self.unlimited_history {
            None
        } else {
            Some(self.history_limit)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            history_limit: 10000,
            unlimited_history: false,
            scroll_on_tty_output: false,
            scroll_on_key_press: true,
            read_chunk_size: 4096,
            read_budget_ms: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.rows, 24);
        assert_eq!(config.cols, 80);
        assert_eq!(config.history_bound(), Some(10000));
    }

    #[test]
    fn test_unlimited_history() {
        let config = Config { unlimited_history: true, ..Config::default() };
        assert_eq!(config.history_bound(), None);
    }
}
