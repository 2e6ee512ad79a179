use anyhow::{anyhow, Result};
use std::sync::Mutex;

/// Destination of the share action.
pub trait Clipboard: Send + Sync + 'static {
    fn write_text(&self, text: &str) -> Result<()>;
}

/// Clipboard that keeps the last copied text in memory.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        let mut guard = self
            .contents
            .lock()
            .map_err(|_| anyhow!("clipboard lock poisoned"))?;
        *guard = Some(text.to_string());
        Ok(())
    }
}
