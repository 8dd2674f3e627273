use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use uuid::Uuid;

/// Per-query correlation object: a time-ordered id, the moment the query
/// started, and how many times the engine has re-entered itself (CNAME
/// follow-ups, enrichment lookups).
#[derive(Debug)]
pub struct Trace {
    id: Uuid,
    start: Instant,
    iterations: AtomicU32,
}

impl Trace {
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    pub fn with_start(start: Instant) -> Self {
        Self {
            id: Uuid::now_v7(),
            start,
            iterations: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// The last seven characters of the id. Unique enough for log lines.
    pub fn short_id(&self) -> String {
        let id = self.id.to_string();
        id[id.len() - 7..].to_string()
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn iteration(&self) -> u32 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn next_iteration(&self) -> u32 {
        self.iterations.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}
