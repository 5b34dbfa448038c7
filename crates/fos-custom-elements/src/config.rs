//! Registry Configuration

use std::fmt;
use std::rc::Rc;

use crate::error::UpgradeError;

/// Runs one scheduled flush
pub type FlushTrigger = Box<dyn FnOnce()>;

/// Decides when a scheduled flush runs. Receives the trigger once per batch.
pub type FlushCallback = Rc<dyn Fn(FlushTrigger)>;

/// Receives upgrade failures that have no caller to return to
pub type ErrorReporter = Rc<dyn Fn(&UpgradeError)>;

/// Custom element registry options
#[derive(Clone, Default)]
pub struct RegistryConfig {
    /// Flush scheduling strategy (synchronous when unset)
    pub flush_callback: Option<FlushCallback>,

    /// Sink for errors raised inside walks and flushes (logged when unset)
    pub error_reporter: Option<ErrorReporter>,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flush_callback(mut self, callback: impl Fn(FlushTrigger) + 'static) -> Self {
        self.flush_callback = Some(Rc::new(callback));
        self
    }

    pub fn with_error_reporter(mut self, reporter: impl Fn(&UpgradeError) + 'static) -> Self {
        self.error_reporter = Some(Rc::new(reporter));
        self
    }

    pub(crate) fn flush_callback(&self) -> FlushCallback {
        self.flush_callback
            .clone()
            .unwrap_or_else(|| Rc::new(|flush: FlushTrigger| flush()))
    }

    pub(crate) fn error_reporter(&self) -> ErrorReporter {
        self.error_reporter.clone().unwrap_or_else(|| {
            Rc::new(|error: &UpgradeError| {
                tracing::error!("Uncaught custom element error: {}", error);
            })
        })
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("flush_callback", &self.flush_callback.is_some())
            .field("error_reporter", &self.error_reporter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_default_flush_is_synchronous() {
        let config = RegistryConfig::default();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        (config.flush_callback())(Box::new(move || flag.set(true)));
        assert!(ran.get());
    }

    #[test]
    fn test_custom_flush_callback() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let config = RegistryConfig::new().with_flush_callback(move |_flush| {
            counter.set(counter.get() + 1);
        });
        (config.flush_callback())(Box::new(|| {}));
        assert_eq!(calls.get(), 1);
        assert_eq!(
            format!("{:?}", config),
            "RegistryConfig { flush_callback: true, error_reporter: false }"
        );
    }
}
