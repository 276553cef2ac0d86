/// Decides which transient probe errors are worth a log line.
///
/// Logs the first error, every `every`th error after that, and any error whose
/// message differs from the last logged one.
#[derive(Debug)]
pub struct ErrorThrottle {
    every: u64,
    count: u64,
    last_message: Option<String>,
}

impl ErrorThrottle {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: 0,
            last_message: None,
        }
    }

    /// Record one error. Returns the running count when it should be logged.
    pub fn record(&mut self, message: &str) -> Option<u64> {
        self.count = self.count.saturating_add(1);
        let changed = self.last_message.as_deref() != Some(message);
        if self.count == 1 || self.count % self.every == 0 || changed {
            if changed {
                self.last_message = Some(message.to_string());
            }
            Some(self.count)
        } else {
            None
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
