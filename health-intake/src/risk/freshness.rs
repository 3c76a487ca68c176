use serde::Serialize;
use tracing::debug;

use super::RiskAssessment;

/// Whether the latest assessment reflects the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Freshness {
    Stale,
    Calculating,
    Fresh,
}

/// Generation number of one risk computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Per-session recomputation policy: counts newly answered fields, decides
/// when to score, and accepts only the result of the latest computation.
#[derive(Debug, Clone)]
pub struct RiskTracker {
    threshold: usize,
    new_fields: usize,
    freshness: Freshness,
    generation: u64,
    in_flight: Option<Ticket>,
    latest: Option<RiskAssessment>,
}

impl RiskTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            new_fields: 0,
            freshness: Freshness::Stale,
            generation: 0,
            in_flight: None,
            latest: None,
        }
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn new_fields(&self) -> usize {
        self.new_fields
    }

    pub fn in_flight(&self) -> Option<Ticket> {
        self.in_flight
    }

    pub fn latest(&self) -> Option<&RiskAssessment> {
        self.latest.as_ref()
    }

    pub fn note_new_fields(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.new_fields += count;
        if self.freshness == Freshness::Fresh {
            self.freshness = Freshness::Stale;
        }
    }

    /// True once enough fields have arrived, or when intake just completed
    /// with fields not yet scored.
    pub fn should_recompute(&self, complete: bool) -> bool {
        self.new_fields >= self.threshold || (complete && self.new_fields > 0)
    }

    /// Starts a computation. Any ticket issued earlier becomes stale, and the
    /// new-field counter resets whatever the outcome.
    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        let ticket = Ticket(self.generation);
        if let Some(previous) = self.in_flight.replace(ticket) {
            debug!(
                superseded = previous.generation(),
                current = ticket.generation(),
                "superseding in-flight risk computation"
            );
        }
        self.new_fields = 0;
        self.freshness = Freshness::Calculating;
        ticket
    }

    /// Applies a finished computation. Returns false, discarding the
    /// assessment, when `ticket` is not the current one.
    pub fn finish(&mut self, ticket: Ticket, assessment: RiskAssessment) -> bool {
        if self.in_flight != Some(ticket) {
            debug!(
                ticket = ticket.generation(),
                current = self.generation,
                "discarding stale risk assessment"
            );
            return false;
        }
        self.in_flight = None;
        self.latest = Some(assessment);
        self.freshness = if self.new_fields > 0 {
            Freshness::Stale
        } else {
            Freshness::Fresh
        };
        true
    }

    /// Drops the current computation without a result.
    pub fn abandon(&mut self, ticket: Ticket) {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
            self.freshness = Freshness::Stale;
        }
    }
}

impl Default for RiskTracker {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RISK_THRESHOLD)
    }
}
