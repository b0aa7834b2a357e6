// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Submission guard
//!
//! At most one cycle (or compaction) runs per conversation at a time. A
//! second submission while one is in flight is rejected rather than queued,
//! and identical text resent within a short window is rejected outright.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::OwnedMutexGuard;

use crate::error::{ColloquyError, Result};
use crate::history::ConversationId;

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(
                target: "colloquy.chat.guard",
                "guard lock was poisoned, recovering"
            );
            poisoned.into_inner()
        }
    }
}

/// Proof that the holder owns the conversation's single flight.
/// Dropping it releases the flight.
#[derive(Debug)]
pub struct FlightPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Single-flight lock plus short-window duplicate check for one conversation
#[derive(Debug)]
pub struct DedupGuard {
    flight: Arc<tokio::sync::Mutex<()>>,
    last_submission: Mutex<Option<(String, Instant)>>,
    window: Duration,
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            flight: Arc::new(tokio::sync::Mutex::new(())),
            last_submission: Mutex::new(None),
            window,
        }
    }

    /// Take the flight or fail with [`ColloquyError::Busy`].
    pub fn try_acquire(&self) -> Result<FlightPermit> {
        match Arc::clone(&self.flight).try_lock_owned() {
            Ok(guard) => Ok(FlightPermit { _guard: guard }),
            Err(_) => {
                tracing::debug!(target: "colloquy.chat.guard", "rejected: cycle in flight");
                Err(ColloquyError::Busy(
                    "a submission is already in progress".to_string(),
                ))
            }
        }
    }

    /// Whether a cycle currently holds the flight
    pub fn is_busy(&self) -> bool {
        self.flight.try_lock().is_err()
    }

    /// Reject `text` if it repeats the previous submission within the window;
    /// otherwise remember it as the latest submission.
    pub fn check_duplicate(&self, text: &str) -> Result<()> {
        let now = Instant::now();
        let mut last = lock_or_recover(&self.last_submission);
        if let Some((previous, at)) = last.as_ref() {
            if previous == text && now.duration_since(*at) < self.window {
                tracing::debug!(
                    target: "colloquy.chat.guard",
                    window_ms = self.window.as_millis() as u64,
                    "rejected: duplicate submission"
                );
                return Err(ColloquyError::Duplicate(format!(
                    "identical text was submitted less than {}ms ago",
                    self.window.as_millis()
                )));
            }
        }
        *last = Some((text.to_string(), now));
        Ok(())
    }

    /// Admit a submission: take the flight, then run the duplicate check.
    pub fn admit(&self, text: &str) -> Result<FlightPermit> {
        let permit = self.try_acquire()?;
        self.check_duplicate(text)?;
        Ok(permit)
    }
}

/// Hands out one shared guard per conversation
#[derive(Debug)]
pub struct GuardRegistry {
    guards: Mutex<HashMap<ConversationId, Arc<DedupGuard>>>,
    window: Duration,
}

impl GuardRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            guards: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// The guard for `id`, created on first use
    pub fn guard_for(&self, id: ConversationId) -> Arc<DedupGuard> {
        let mut guards = lock_or_recover(&self.guards);
        Arc::clone(
            guards
                .entry(id)
                .or_insert_with(|| Arc::new(DedupGuard::new(self.window))),
        )
    }
}
