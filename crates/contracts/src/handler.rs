//! RecordHandler trait - user-supplied per-record processing
//!
//! Supplied once at startup and shared by every partition worker.

use std::sync::Arc;

use crate::ContractError;

/// Per-record handler
///
/// Called once per record, in offset order within a partition. Failures are
/// logged by the worker and never retried.
pub trait RecordHandler: Send + Sync + 'static {
    /// Process one record
    ///
    /// # Errors
    /// Returns a handler error; the worker logs it and moves on.
    fn handle(&self, key: &[u8], value: &[u8]) -> Result<(), ContractError>;
}

impl<F> RecordHandler for F
where
    F: Fn(&[u8], &[u8]) -> Result<(), ContractError> + Send + Sync + 'static,
{
    fn handle(&self, key: &[u8], value: &[u8]) -> Result<(), ContractError> {
        self(key, value)
    }
}

/// Handler shared across worker tasks
pub type SharedHandler = Arc<dyn RecordHandler>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_handler() {
        let handler = |_key: &[u8], value: &[u8]| -> Result<(), ContractError> {
            if value.is_empty() {
                Err(ContractError::handler("empty value"))
            } else {
                Ok(())
            }
        };
        let shared: SharedHandler = Arc::new(handler);
        assert!(shared.handle(b"k", b"v").is_ok());
        assert!(shared.handle(b"k", b"").is_err());
    }
}
