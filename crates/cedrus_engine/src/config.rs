//! Engine configuration.

/// Configuration for opening an engine session.
///
/// The access layer treats this as opaque: it is built with
/// [`Config::default`] and the builder methods, and handed straight to the
/// engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to flush the log after every record (safer but slower).
    pub sync_on_write: bool,

    /// Expected number of keys, used to presize the slot table.
    pub initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            initial_capacity: 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush the log after every record.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the initial slot table capacity.
    #[must_use]
    pub const fn initial_capacity(mut self, value: usize) -> Self {
        self.initial_capacity = value;
        self
    }
}
