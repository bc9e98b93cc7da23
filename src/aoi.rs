//! Boundary candidates and the reconciliation state machine.
//!
//! A boundary can arrive three ways: loaded from a previously saved permit
//! (`Persisted`), drawn on the map (`Drawn`), or converted from an uploaded
//! file (`Uploaded`). At most one candidate of each kind exists; a newer one
//! of the same kind replaces the older.
//!
//! The reconciler decides when a new candidate may take over directly and
//! when the user must be asked first:
//!
//! - replacing a `Persisted` boundary needs an explicit override confirmation;
//! - a `Drawn` and an `Uploaded` candidate competing needs an explicit choice;
//! - anything on a blank slate, or a same-kind replacement, is adopted at once.
//!
//! This is the only module that inspects `CandidateKind`.

#[cfg(test)]
#[path = "aoi_test.rs"]
mod aoi_test;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::geom::Geometry;

/// Where a boundary candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    /// Previously saved with the permit.
    Persisted,
    /// Drawn with the map's polygon tool.
    Drawn,
    /// Converted from an uploaded geographic file.
    Uploaded,
}

/// A proposed area of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub geometry: Geometry,
}

impl Candidate {
    #[must_use]
    pub fn new(kind: CandidateKind, geometry: Geometry) -> Self {
        Self { kind, geometry }
    }
}

/// Reconciliation state.
///
/// While a decision is pending the previously authoritative candidate stays
/// in force, so a cancelled dialog never loses the saved boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AoiState {
    /// No boundary.
    #[default]
    Empty,
    /// The only candidate, adopted without a decision.
    SingleCandidate(Candidate),
    /// A fresh candidate wants to replace a persisted one.
    AwaitingOverrideDecision {
        /// The persisted boundary, still authoritative.
        existing: Candidate,
        /// The drawn or uploaded replacement.
        incoming: Candidate,
    },
    /// A drawn and an uploaded candidate compete.
    AwaitingChoiceDecision {
        drawn: Candidate,
        uploaded: Candidate,
        /// The candidate that was authoritative when the competition began.
        incumbent: Candidate,
    },
    /// The outcome of a decision.
    Resolved(Candidate),
}

/// What a reconciler call means for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The authoritative boundary changed to this candidate.
    Adopted(Candidate),
    /// Ask the user whether `incoming` may replace the saved boundary.
    OverrideRequested { incoming: CandidateKind },
    /// Ask the user to pick between the drawn and uploaded candidates.
    ChoiceRequested,
    /// A decision closed without changing the authoritative boundary.
    Kept,
    /// The boundary was removed.
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("a boundary decision is already pending")]
    DecisionPending,
    #[error("no boundary decision is pending")]
    NoPendingDecision,
    #[error("{0:?} is not one of the pending candidates")]
    NotACandidate(CandidateKind),
    #[error("there is no boundary to delete")]
    NothingToDelete,
}

impl ErrorCode for ReconcileError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DecisionPending => "E_AOI_DECISION_PENDING",
            Self::NoPendingDecision => "E_AOI_NO_PENDING_DECISION",
            Self::NotACandidate(_) => "E_AOI_NOT_A_CANDIDATE",
            Self::NothingToDelete => "E_AOI_NOTHING_TO_DELETE",
        }
    }
}

type Step = (AoiState, Result<Transition, ReconcileError>);

/// Owner of the authoritative-boundary selection.
#[derive(Debug, Default)]
pub struct Reconciler {
    state: AoiState,
}

impl Reconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &AoiState {
        &self.state
    }

    /// The candidate currently in force, including while a decision is pending.
    #[must_use]
    pub fn authoritative(&self) -> Option<&Candidate> {
        match &self.state {
            AoiState::Empty => None,
            AoiState::SingleCandidate(c) | AoiState::Resolved(c) => Some(c),
            AoiState::AwaitingOverrideDecision { existing, .. } => Some(existing),
            AoiState::AwaitingChoiceDecision { incumbent, .. } => Some(incumbent),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, AoiState::AwaitingOverrideDecision { .. } | AoiState::AwaitingChoiceDecision { .. })
    }

    /// Offer a new candidate.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DecisionPending`] when a decision is open and
    /// the candidate is not a same-kind replacement for one of its parties.
    pub fn propose(&mut self, incoming: Candidate) -> Result<Transition, ReconcileError> {
        let (next, outcome) = match std::mem::take(&mut self.state) {
            AoiState::Empty => adopt_single(incoming),
            AoiState::SingleCandidate(current) | AoiState::Resolved(current) => against_authoritative(current, incoming),
            AoiState::AwaitingOverrideDecision { existing, incoming: pending } => {
                if pending.kind == incoming.kind {
                    let kind = incoming.kind;
                    (
                        AoiState::AwaitingOverrideDecision { existing, incoming },
                        Ok(Transition::OverrideRequested { incoming: kind }),
                    )
                } else {
                    (
                        AoiState::AwaitingOverrideDecision { existing, incoming: pending },
                        Err(ReconcileError::DecisionPending),
                    )
                }
            }
            AoiState::AwaitingChoiceDecision { drawn, uploaded, incumbent } => match incoming.kind {
                CandidateKind::Drawn => (
                    AoiState::AwaitingChoiceDecision { drawn: incoming, uploaded, incumbent },
                    Ok(Transition::ChoiceRequested),
                ),
                CandidateKind::Uploaded => (
                    AoiState::AwaitingChoiceDecision { drawn, uploaded: incoming, incumbent },
                    Ok(Transition::ChoiceRequested),
                ),
                CandidateKind::Persisted => (
                    AoiState::AwaitingChoiceDecision { drawn, uploaded, incumbent },
                    Err(ReconcileError::DecisionPending),
                ),
            },
        };
        self.state = next;
        outcome
    }

    /// Answer the override dialog. `true` adopts the incoming candidate,
    /// `false` keeps the persisted one.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NoPendingDecision`] when no override is pending.
    pub fn decide_override(&mut self, confirm: bool) -> Result<Transition, ReconcileError> {
        let (next, outcome) = match std::mem::take(&mut self.state) {
            AoiState::AwaitingOverrideDecision { existing, incoming } => {
                if confirm {
                    (AoiState::Resolved(incoming.clone()), Ok(Transition::Adopted(incoming)))
                } else {
                    (AoiState::Resolved(existing), Ok(Transition::Kept))
                }
            }
            other => (other, Err(ReconcileError::NoPendingDecision)),
        };
        self.state = next;
        outcome
    }

    /// Answer the drawn-vs-uploaded dialog. The unchosen candidate is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NoPendingDecision`] when no choice is pending,
    /// or [`ReconcileError::NotACandidate`] for `Persisted`.
    pub fn choose(&mut self, kind: CandidateKind) -> Result<Transition, ReconcileError> {
        let (next, outcome): Step = match std::mem::take(&mut self.state) {
            AoiState::AwaitingChoiceDecision { drawn, uploaded, incumbent } => {
                let chosen = match kind {
                    CandidateKind::Drawn => drawn,
                    CandidateKind::Uploaded => uploaded,
                    CandidateKind::Persisted => {
                        self.state = AoiState::AwaitingChoiceDecision { drawn, uploaded, incumbent };
                        return Err(ReconcileError::NotACandidate(kind));
                    }
                };
                if chosen == incumbent {
                    (AoiState::Resolved(chosen), Ok(Transition::Kept))
                } else {
                    (AoiState::Resolved(chosen.clone()), Ok(Transition::Adopted(chosen)))
                }
            }
            other => (other, Err(ReconcileError::NoPendingDecision)),
        };
        self.state = next;
        outcome
    }

    /// Remove the boundary and any pending candidates.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NothingToDelete`] when already empty.
    pub fn delete(&mut self) -> Result<Transition, ReconcileError> {
        if matches!(self.state, AoiState::Empty) {
            return Err(ReconcileError::NothingToDelete);
        }
        self.state = AoiState::Empty;
        Ok(Transition::Cleared)
    }
}

fn adopt_single(candidate: Candidate) -> Step {
    (AoiState::SingleCandidate(candidate.clone()), Ok(Transition::Adopted(candidate)))
}

fn against_authoritative(current: Candidate, incoming: Candidate) -> Step {
    match (current.kind, incoming.kind) {
        (_, CandidateKind::Persisted) | (CandidateKind::Drawn, CandidateKind::Drawn) | (CandidateKind::Uploaded, CandidateKind::Uploaded) => {
            adopt_single(incoming)
        }
        (CandidateKind::Persisted, kind) => (
            AoiState::AwaitingOverrideDecision { existing: current, incoming },
            Ok(Transition::OverrideRequested { incoming: kind }),
        ),
        (CandidateKind::Drawn, CandidateKind::Uploaded) => (
            AoiState::AwaitingChoiceDecision { drawn: current.clone(), uploaded: incoming, incumbent: current },
            Ok(Transition::ChoiceRequested),
        ),
        (CandidateKind::Uploaded, CandidateKind::Drawn) => (
            AoiState::AwaitingChoiceDecision { drawn: incoming, uploaded: current.clone(), incumbent: current },
            Ok(Transition::ChoiceRequested),
        ),
    }
}
