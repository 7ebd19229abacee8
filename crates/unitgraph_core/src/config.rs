//! Transaction hierarchy configuration.

/// Configuration for a transaction hierarchy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether commit verifies that mandatory relations are set.
    pub validate_mandatory_relations: bool,

    /// Upper bound on repeated "unloading"/"committing" notification passes.
    ///
    /// Listeners may load or change further objects while being notified; the
    /// notification is repeated for those objects until no new ones appear.
    pub max_notification_passes: usize,

    /// Whether every transaction gets a [`crate::LoggingTransactionListener`].
    pub log_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validate_mandatory_relations: true,
            max_notification_passes: 64,
            log_events: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether commit validates mandatory relations.
    #[must_use]
    pub const fn validate_mandatory_relations(mut self, value: bool) -> Self {
        self.validate_mandatory_relations = value;
        self
    }

    /// Sets the notification pass bound.
    #[must_use]
    pub const fn max_notification_passes(mut self, passes: usize) -> Self {
        self.max_notification_passes = passes;
        self
    }

    /// Sets whether transaction events are logged.
    #[must_use]
    pub const fn log_events(mut self, value: bool) -> Self {
        self.log_events = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.validate_mandatory_relations);
        assert!(!config.log_events);
        assert_eq!(config.max_notification_passes, 64);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .validate_mandatory_relations(false)
            .log_events(true)
            .max_notification_passes(3);

        assert!(!config.validate_mandatory_relations);
        assert!(config.log_events);
        assert_eq!(config.max_notification_passes, 3);
    }
}
