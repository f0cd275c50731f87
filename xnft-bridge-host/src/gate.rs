//! User-interaction gate for sensitive requests
//!
//! Signing requests are only forwarded to the approval provider when a
//! click or change notification was delivered to the plugin shortly before.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ApprovalError;

/// Default time a delivered interaction keeps the gate open
pub const DEFAULT_INTERACTION_WINDOW: Duration = Duration::from_millis(1000);

/// Tracks the last user interaction delivered to the plugin
#[derive(Debug)]
pub struct ApprovalGate {
    window: Duration,
    last_interaction: Mutex<Option<Instant>>,
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new(DEFAULT_INTERACTION_WINDOW)
    }
}

impl ApprovalGate {
    /// Gate admitting requests made within `window` of an interaction
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_interaction: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record that a click or change was delivered now
    pub fn record_interaction(&self) {
        self.record_interaction_at(Instant::now());
    }

    pub fn record_interaction_at(&self, at: Instant) {
        *self
            .last_interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    /// Pass if an interaction was recorded strictly less than the window ago
    pub fn check(&self) -> Result<(), ApprovalError> {
        self.check_at(Instant::now())
    }

    pub fn check_at(&self, now: Instant) -> Result<(), ApprovalError> {
        match self.last_interaction() {
            Some(at) if now.saturating_duration_since(at) < self.window => Ok(()),
            _ => Err(ApprovalError::InteractionRequired),
        }
    }

    /// When the last interaction was recorded
    pub fn last_interaction(&self) -> Option<Instant> {
        *self
            .last_interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the last interaction
    pub fn reset(&self) {
        *self
            .last_interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
