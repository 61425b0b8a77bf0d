//! Single-slot tracker serializing narrative analysis requests.
//!
//! At most one analysis is in flight. A request made while another is
//! pending is ignored rather than queued.

use super::analyst::{AnalysisOutcome, NarrativeAnalyst};
use super::ollama::TextGenerator;
use crate::models::{AiAnalysis, SurveyRecord};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Lifecycle of the analysis slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AnalysisState {
    #[default]
    Idle,
    Pending,
    Done(AiAnalysis),
    /// The call failed and the fallback analysis was applied.
    Failed(AiAnalysis),
}

#[derive(Debug, Default)]
pub struct AnalysisTracker {
    state: Mutex<AnalysisState>,
}

/// Resets a pending slot to idle if the request future is dropped early.
struct PendingGuard<'a> {
    tracker: &'a AnalysisTracker,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.tracker.lock();
            if *state == AnalysisState::Pending {
                debug!("Analysis cancelled, slot returned to idle");
                *state = AnalysisState::Idle;
            }
        }
    }
}

impl AnalysisTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AnalysisState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AnalysisState {
        self.lock().clone()
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        *self.lock() == AnalysisState::Pending
    }

    /// Latest finished analysis, fallback included.
    #[cfg(test)]
    pub fn latest(&self) -> Option<AiAnalysis> {
        match &*self.lock() {
            AnalysisState::Done(analysis) | AnalysisState::Failed(analysis) => {
                Some(analysis.clone())
            }
            AnalysisState::Idle | AnalysisState::Pending => None,
        }
    }

    /// Run one analysis through the slot.
    ///
    /// Returns `None` without contacting the service when another request
    /// is still pending.
    pub async fn run<G: TextGenerator>(
        &self,
        analyst: &NarrativeAnalyst<G>,
        records: &[SurveyRecord],
    ) -> Option<AiAnalysis> {
        {
            let mut state = self.lock();
            if *state == AnalysisState::Pending {
                info!("Analysis already in progress, ignoring request");
                return None;
            }
            *state = AnalysisState::Pending;
        }

        let mut guard = PendingGuard {
            tracker: self,
            armed: true,
        };

        let outcome = analyst.analyze(records).await;
        guard.armed = false;

        let analysis = outcome.analysis().clone();
        *self.lock() = match outcome {
            AnalysisOutcome::Completed(analysis) => AnalysisState::Done(analysis),
            AnalysisOutcome::Fallback { analysis, .. } => AnalysisState::Failed(analysis),
        };

        Some(analysis)
    }
}
