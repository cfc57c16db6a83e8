#![forbid(unsafe_code)]

//! Graph configuration.

/// Tunables for a [`Graph`](crate::Graph).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GraphConfig {
    /// Upper bound on ticks run by [`Graph::run_until_idle`](crate::Graph::run_until_idle)
    /// before giving up on a handler that keeps rescheduling itself.
    pub max_flush_rounds: usize,
    /// Largest length an array may reach through an index write or
    /// [`Graph::set_len`](crate::Graph::set_len).
    pub max_array_len: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: 64,
            max_array_len: 1 << 24,
        }
    }
}

impl GraphConfig {
    /// Override the flush round limit. Zero is clamped to one.
    #[must_use]
    pub fn with_max_flush_rounds(mut self, rounds: usize) -> Self {
        self.max_flush_rounds = rounds.max(1);
        self
    }

    /// Override the array length limit.
    #[must_use]
    pub fn with_max_array_len(mut self, len: usize) -> Self {
        self.max_array_len = len;
        self
    }
}
