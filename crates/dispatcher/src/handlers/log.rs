//! LogHandler - logs a summary of every record via tracing

use contracts::{ContractError, RecordHandler};
use tracing::info;

const PREVIEW_CHARS: usize = 64;

/// Handler that logs record summaries, for demos and debugging
#[derive(Debug, Clone)]
pub struct LogHandler {
    name: String,
}

impl LogHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// First `PREVIEW_CHARS` characters of the value, lossily decoded
fn preview(value: &[u8]) -> String {
    let text = String::from_utf8_lossy(value);
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

impl RecordHandler for LogHandler {
    fn handle(&self, key: &[u8], value: &[u8]) -> Result<(), ContractError> {
        info!(
            handler = %self.name,
            key = %String::from_utf8_lossy(key),
            value_len = value.len(),
            preview = %preview(value),
            "Record received"
        );
        Ok(())
    }
}
