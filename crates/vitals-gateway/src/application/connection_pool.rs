//! ConnectionPool: the ordered list of live sessions.
//!
//! The pool is the only owner of live sessions.  Sample-cycle tasks get an
//! `Arc<Session>` clone from [`ConnectionPool::select_next`] and do their
//! I/O after the pool lock is released; the prober removes failed sessions
//! with a single [`ConnectionPool::remove_sessions`] call per sweep.
//!
//! # Round robin (for beginners)
//!
//! The cursor is the index of the session the next selection will return.
//! Each selection advances it by one, wrapping at the end of the list, so
//! with N sessions and no changes every session is picked exactly once in
//! N selections.  When sessions are removed the cursor is shifted so it
//! keeps pointing at the same "next" session where possible and is then
//! clamped back into range.
//!
//! A session whose sample cycle failed is flagged and skipped by
//! [`ConnectionPool::select_next`].  It stays in the pool, and is still
//! probed, until the prober retires it.

use std::sync::Arc;

use thiserror::Error;
use vitals_core::DeviceId;

use super::session::{Session, SessionId};

/// Error type for connection pool operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// A session for this device id is already in the pool.
    #[error("device {0} already has a live session")]
    DuplicateDevice(DeviceId),
}

/// Live sessions plus the round-robin cursor.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    sessions: Vec<Arc<Session>>,
    cursor: usize,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Appends a session.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::DuplicateDevice`] if a session for the same device
    /// id is already live; the rejected session is dropped, closing it.
    pub fn insert(&mut self, session: Session) -> Result<Arc<Session>, PoolError> {
        if self.contains_device(session.device_id()) {
            return Err(PoolError::DuplicateDevice(session.device_id().clone()));
        }
        let session = Arc::new(session);
        self.sessions.push(Arc::clone(&session));
        Ok(session)
    }

    /// Returns the first readable session at or after the cursor and moves
    /// the cursor just past it.
    ///
    /// Returns `None`, leaving the cursor alone, when no session is readable.
    pub fn select_next(&mut self) -> Option<Arc<Session>> {
        let len = self.sessions.len();
        for offset in 0..len {
            let index = (self.cursor + offset) % len;
            if !self.sessions[index].read_failed() {
                self.cursor = (index + 1) % len;
                return Some(Arc::clone(&self.sessions[index]));
            }
        }
        None
    }

    /// `true` if [`select_next`](Self::select_next) would return a session.
    pub fn has_readable(&self) -> bool {
        self.sessions.iter().any(|s| !s.read_failed())
    }

    /// Removes every session whose id is in `ids`, in one pass.
    ///
    /// Returns the device ids of the sessions actually removed, in pool order.
    pub fn remove_sessions(&mut self, ids: &[SessionId]) -> Vec<DeviceId> {
        if ids.is_empty() || self.sessions.is_empty() {
            return Vec::new();
        }

        let cursor = self.cursor;
        let mut removed = Vec::new();
        let mut removed_before_cursor = 0;
        let mut index = 0;
        self.sessions.retain(|session| {
            let keep = !ids.contains(&session.id());
            if !keep {
                removed.push(session.device_id().clone());
                if index < cursor {
                    removed_before_cursor += 1;
                }
            }
            index += 1;
            keep
        });

        self.cursor = self.cursor.saturating_sub(removed_before_cursor);
        if self.sessions.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor %= self.sessions.len();
        }
        removed
    }

    /// Clones the current session list for a sweep outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.clone()
    }

    pub fn contains_device(&self, id: &DeviceId) -> bool {
        self.sessions.iter().any(|s| s.device_id() == id)
    }

    /// Device ids of all live sessions, in pool order.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.sessions.iter().map(|s| s.device_id().clone()).collect()
    }

    /// Index the next selection will use.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
