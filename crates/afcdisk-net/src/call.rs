use afcdisk_types::{Status, StatusCode};

/// Per-call controller recording whether a call failed and why.
///
/// A fresh call is "not failed, no message". Failures overwrite each other;
/// the last one wins. Individual calls cannot be canceled: `is_canceled` is
/// always false and the cancel hooks do nothing. The only cancellation in
/// the system is tearing down a whole mount session.
#[derive(Debug, Default, Clone)]
pub struct RpcCall {
    failure: Option<Status>,
}

impl RpcCall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.failure = None;
    }

    pub fn set_failed(&mut self, reason: impl Into<String>) {
        self.failure = Some(Status::with_message(StatusCode::UNKNOWN, reason));
    }

    /// Like [`set_failed`](Self::set_failed) but keeps the backend's code.
    pub fn set_failed_status(&mut self, status: Status) {
        self.failure = Some(status);
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Diagnostic of the last failure, empty when the call succeeded.
    pub fn error_text(&self) -> String {
        match &self.failure {
            Some(status) => status
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| status.describe()),
            None => String::new(),
        }
    }

    pub fn status(&self) -> Option<&Status> {
        self.failure.as_ref()
    }

    pub fn start_cancel(&mut self) {}

    pub fn is_canceled(&self) -> bool {
        false
    }

    /// Accepts a cancellation callback and drops it without running it.
    pub fn notify_on_cancel<F: FnOnce()>(&mut self, callback: F) {
        drop(callback);
    }

    /// Record the outcome of a service call, returning the value on success.
    pub fn record<T>(&mut self, result: Result<T, Status>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(status) => {
                self.set_failed_status(status);
                None
            }
        }
    }
}
