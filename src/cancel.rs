// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cooperative cancellation checked between blocking calls.

use crate::error::{AirliftError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Cloning yields a handle to the same flag.
///
/// Cancellation never interrupts a call in flight; it is observed at the next
/// call boundary through [`CancelSignal::check`].
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` once the signal has fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AirliftError::Cancelled)
        } else {
            Ok(())
        }
    }
}
