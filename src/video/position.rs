//! Ground-truth ball position tracking
//!
//! Every frame source publishes the post-update ball center through a
//! [`PositionHandle`]. The [`PositionRegistry`] exposes both the latest value
//! published by any session (process-wide view) and the latest value per
//! session. Reads are lock-free and never block the frame producer.

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Position as reported to callers; `None` until a frame has been produced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }
}

type PositionCell = Arc<ArcSwapOption<(f64, f64)>>;

fn read_cell(cell: &ArcSwapOption<(f64, f64)>) -> Position {
    match cell.load_full() {
        Some(p) => Position::new(p.0, p.1),
        None => Position::default(),
    }
}

/// Write side held by one frame source
#[derive(Debug, Clone)]
pub struct PositionHandle {
    session_id: String,
    session: PositionCell,
    latest: PositionCell,
}

impl PositionHandle {
    /// A handle not attached to any registry
    #[cfg(test)]
    pub fn detached(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            session: Arc::new(ArcSwapOption::empty()),
            latest: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Publish the latest ball center
    pub fn publish(&self, x: f64, y: f64) {
        let value = Arc::new((x, y));
        self.session.store(Some(value.clone()));
        self.latest.store(Some(value));
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Registry of ball positions, shared across the application
#[derive(Debug, Default)]
pub struct PositionRegistry {
    latest: PositionCell,
    sessions: RwLock<HashMap<String, PositionCell>>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the handle for a session
    pub fn register(&self, session_id: &str) -> PositionHandle {
        let cell: PositionCell = Arc::new(ArcSwapOption::empty());
        self.sessions
            .write()
            .insert(session_id.to_string(), cell.clone());
        PositionHandle {
            session_id: session_id.to_string(),
            session: cell,
            latest: self.latest.clone(),
        }
    }

    /// Forget a session. The process-wide latest value is kept.
    pub fn unregister(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    /// Most recently published position from any session
    pub fn current(&self) -> Position {
        read_cell(&self.latest)
    }

    /// Most recently published position of one session
    pub fn session(&self, session_id: &str) -> Option<Position> {
        self.sessions
            .read()
            .get(session_id)
            .map(|cell| read_cell(cell))
    }
}
