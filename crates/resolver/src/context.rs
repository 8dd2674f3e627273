use hickory_proto::rr::Name;
use rootward_domain::Trace;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Instant;

/// State that rides along with a single client query through every
/// exchange: the trace, the shared loop-guard counter, an optional
/// deadline, and the zone currently being asked (for error context).
///
/// Cloning is cheap; the trace and counter are shared, the zone slot is
/// per-hop.
#[derive(Clone, Debug)]
pub struct QueryContext {
    pub start: Instant,
    pub trace: Arc<Trace>,
    pub session_queries: Arc<AtomicU32>,
    pub deadline: Option<Instant>,
    pub zone_name: Option<Name>,
}

impl QueryContext {
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            start,
            trace: Arc::new(Trace::with_start(start)),
            session_queries: Arc::new(AtomicU32::new(0)),
            deadline: None,
            zone_name: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A copy of this context scoped to an exchange with `zone`.
    pub fn for_zone(&self, zone: &Name) -> Self {
        let mut ctx = self.clone();
        ctx.zone_name = Some(zone.clone());
        ctx
    }

    /// The zone name for log and error text; `unknown` outside a zone.
    pub fn zone_label(&self) -> String {
        self.zone_name
            .as_ref()
            .map(Name::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Clamps a per-attempt timeout to whatever remains of the deadline.
    pub fn clamp_timeout(&self, timeout: std::time::Duration) -> std::time::Duration {
        match self.deadline {
            Some(deadline) => timeout.min(deadline.saturating_duration_since(Instant::now())),
            None => timeout,
        }
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}
