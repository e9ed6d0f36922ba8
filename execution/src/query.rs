//! Read-only round queries.
//!
//! Round state is read from storage; indexes by status and address are rebuilt from emitted
//! outputs, since storage is keyed by game id only.
//!
//! ```rust,ignore
//! use blackwhite_execution::query::{query_round, rounds_by_status};
//!
//! let round = query_round(&state, &game_id).await?;
//! let revealing = rounds_by_status(&outputs, RoundStatus::Revealing);
//! ```

use blackwhite_types::{
    blackwhite::{LoopResult, Round, RoundStatus},
    execution::{Event, Instruction, Output},
};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};
use std::collections::BTreeMap;

use crate::resolution::resolve;
use crate::state::{load_round, State};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    RoundNotFound(Digest),
    /// The round has not been settled yet.
    NotSettled(RoundStatus),
    StateError(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundNotFound(game_id) => write!(f, "round not found: {game_id:?}"),
            Self::NotSettled(status) => write!(f, "round not settled (status={status:?})"),
            Self::StateError(msg) => write!(f, "state error: {msg}"),
        }
    }
}

impl std::error::Error for QueryError {}

pub async fn query_round<S: State>(state: &S, game_id: &Digest) -> Result<Round, QueryError> {
    load_round(state, game_id)
        .await
        .map_err(|err| QueryError::StateError(format!("{err:#}")))?
        .ok_or(QueryError::RoundNotFound(*game_id))
}

/// Re-derives the elimination trace of a settled round.
pub async fn query_loop_results<S: State>(
    state: &S,
    game_id: &Digest,
) -> Result<Vec<LoopResult>, QueryError> {
    let round = query_round(state, game_id).await?;
    if round.status != RoundStatus::Done {
        return Err(QueryError::NotSettled(round.status));
    }
    Ok(resolve(&round.participants, round.loop_count).trace)
}

/// Latest status of every round seen in `outputs`, in first-seen order.
fn latest_statuses(outputs: &[Output]) -> Vec<(Digest, RoundStatus)> {
    let mut order = Vec::new();
    let mut latest = BTreeMap::new();
    for output in outputs {
        if let Output::Event(Event::RoundStatusChanged {
            game_id, status, ..
        }) = output
        {
            if latest.insert(*game_id, *status).is_none() {
                order.push(*game_id);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|game_id| latest.get(&game_id).map(|status| (game_id, *status)))
        .collect()
}

/// Rounds whose latest recorded status is `status`.
pub fn rounds_by_status(outputs: &[Output], status: RoundStatus) -> Vec<Digest> {
    latest_statuses(outputs)
        .into_iter()
        .filter(|(_, current)| *current == status)
        .map(|(game_id, _)| game_id)
        .collect()
}

/// Rounds `address` created or joined, in first-seen order.
///
/// A join counts only if the play was accepted, i.e. its transaction is preceded by a status
/// entry for the same round.
pub fn rounds_for_address(outputs: &[Output], address: &PublicKey) -> Vec<Digest> {
    let mut rounds = Vec::new();
    let mut touched: Vec<Digest> = Vec::new();
    for output in outputs {
        match output {
            Output::Event(Event::RoundStatusChanged {
                game_id, creator, ..
            }) => {
                touched.push(*game_id);
                if creator == address && !rounds.contains(game_id) {
                    rounds.push(*game_id);
                }
            }
            Output::Event(_) => {}
            Output::Transaction(tx) => {
                if let Instruction::BlackwhitePlay { game_id, .. } = &tx.instruction {
                    if &tx.public == address
                        && touched.contains(game_id)
                        && !rounds.contains(game_id)
                    {
                        rounds.push(*game_id);
                    }
                }
                touched.clear();
            }
        }
    }
    rounds
}
