use tracing::warn;

/// Monotonic value source for the publisher
///
/// Saturates at `i64::MAX`: the value never wraps and never decreases.
#[derive(Debug)]
pub(crate) struct Counter {
    value: i64,
    saturated: bool,
}

impl Default for Counter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Counter {
    pub(crate) fn new(start: i64) -> Self {
        Self {
            value: start.max(0),
            saturated: false,
        }
    }

    pub(crate) fn current(&self) -> i64 {
        self.value
    }

    pub(crate) fn advance(&mut self) {
        if self.value == i64::MAX {
            if !self.saturated {
                warn!("counter saturated at {}, value will no longer increase", i64::MAX);
                self.saturated = true;
            }
            return;
        }
        self.value += 1;
    }
}
