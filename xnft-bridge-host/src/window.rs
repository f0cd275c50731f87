//! Opening external windows on behalf of a plugin

use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("window open not supported")]
    Unsupported,
}

/// Host hook behind the `window-open` RPC
pub trait WindowOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), WindowError>;
}

/// Refuses every request
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyWindowOpener;

impl WindowOpener for DenyWindowOpener {
    fn open(&self, _url: &str) -> Result<(), WindowError> {
        Err(WindowError::Unsupported)
    }
}

/// Records requested URLs without opening anything
#[derive(Debug, Default)]
pub struct RecordingWindowOpener {
    urls: Mutex<Vec<String>>,
}

impl RecordingWindowOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs requested so far, oldest first
    pub fn urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WindowOpener for RecordingWindowOpener {
    fn open(&self, url: &str) -> Result<(), WindowError> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        Ok(())
    }
}
