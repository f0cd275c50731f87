//! renderId reordering
//!
//! The transport may deliver bridge messages out of order. The buffer holds
//! each message under its renderId and releases them strictly in
//! consecutive order starting at 0. A message whose predecessor never
//! arrives is held indefinitely; [`ReorderBuffer::stall`] reports that case.

use std::collections::BTreeMap;

use crate::error::ProtocolError;

/// A gap the buffer is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stall {
    /// The renderId that has not arrived
    pub missing: u64,
    /// Messages held behind the gap
    pub buffered: usize,
    /// Smallest renderId held
    pub lowest_buffered: u64,
}

/// Holds out-of-order items until every lower renderId has been released
///
/// Items are released strictly in renderId order starting at 0. Ids that
/// were already released, or are already buffered, are refused.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    pending: BTreeMap<u64, T>,
    expected_next: u64,
    max_pending: Option<usize>,
    warn_threshold: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    /// Unbounded buffer without stall warnings
    pub fn new() -> Self {
        Self::with_limits(None, 0)
    }

    /// Buffer with an optional capacity and a stall warning threshold
    ///
    /// A `warn_threshold` of 0 disables the warning.
    pub fn with_limits(max_pending: Option<usize>, warn_threshold: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            expected_next: 0,
            max_pending,
            warn_threshold,
        }
    }

    /// Hold `item` under `render_id`
    ///
    /// The message equal to the next expected id is always accepted, so a
    /// full buffer can still drain.
    pub fn insert(&mut self, render_id: u64, item: T) -> Result<(), ProtocolError> {
        if render_id < self.expected_next {
            return Err(ProtocolError::StaleRenderId {
                render_id,
                expected: self.expected_next,
            });
        }
        if self.pending.contains_key(&render_id) {
            return Err(ProtocolError::DuplicateRenderId(render_id));
        }
        if let Some(capacity) = self.max_pending {
            if render_id != self.expected_next && self.pending.len() >= capacity {
                return Err(ProtocolError::BufferFull { capacity });
            }
        }

        self.pending.insert(render_id, item);

        if self.warn_threshold > 0 && self.pending.len() == self.warn_threshold {
            if let Some(stall) = self.stall() {
                tracing::warn!(
                    missing = stall.missing,
                    buffered = stall.buffered,
                    lowest_buffered = stall.lowest_buffered,
                    "Bridge mutations are stalled behind a missing renderId"
                );
            }
        }
        Ok(())
    }

    /// Release the next message if it is ready
    pub fn pop_ready(&mut self) -> Option<(u64, T)> {
        let entry = self.pending.first_entry()?;
        if *entry.key() != self.expected_next {
            return None;
        }
        let item = entry.remove();
        let render_id = self.expected_next;
        self.expected_next += 1;
        Some((render_id, item))
    }

    /// The renderId the buffer is waiting for
    pub fn expected_next(&self) -> u64 {
        self.expected_next
    }

    /// Number of buffered items not yet released
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Describe the gap if messages are held behind a missing renderId
    pub fn stall(&self) -> Option<Stall> {
        let (&lowest_buffered, _) = self.pending.first_key_value()?;
        if lowest_buffered == self.expected_next {
            return None;
        }
        Some(Stall {
            missing: self.expected_next,
            buffered: self.pending.len(),
            lowest_buffered,
        })
    }

    /// Drop held messages and restart numbering at 0
    pub fn reset(&mut self) {
        self.pending.clear();
        self.expected_next = 0;
    }
}
