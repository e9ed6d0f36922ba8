//! Round state machine.
//!
//! ```text
//! Created --Play--> Collecting --Play (full)--> Revealing --Show (all revealed)--> Done
//!                       |                           |
//!                       |                           +--TimeoutDone (reveal deadline)--> Done
//!                       +--TimeoutDone (play deadline)--> TimedOut
//! ```
//!
//! Every handler validates before touching the ledger, so a rejected action writes nothing. Once
//! the ledger has been touched, any failure is unwound through the action's [`Session`] and the
//! round is not persisted.

use blackwhite_types::{
    blackwhite::{
        Participant, Round, RoundInvariantError, RoundStatus, ERROR_ALREADY_REVEALED,
        ERROR_DUPLICATE_PARTICIPANT, ERROR_INSUFFICIENT_FUNDS, ERROR_INVALID_PARAMETER,
        ERROR_INVALID_STATE, ERROR_LEDGER, ERROR_NOT_FROZEN, ERROR_PARTICIPANT_NOT_FOUND,
        ERROR_ROUND_NOT_FOUND, ERROR_TIMEOUT_NOT_REACHED, MAX_SECRET_LENGTH,
    },
    execution::Event,
};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::{
    config::{BlockContext, GameConfig},
    ledger::LedgerError,
    settlement::{refund, settle},
    state::{load_round, store_round, State},
    undo::{Journal, RollbackError, Session},
};

#[derive(Debug, ThisError)]
pub enum GameError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("round is {status:?}")]
    InvalidState { status: RoundStatus },
    #[error("round not found")]
    NotFound,
    #[error("address already joined the round")]
    DuplicateParticipant,
    #[error("address is not a participant")]
    ParticipantNotFound,
    #[error("participant already revealed")]
    AlreadyRevealed,
    #[error("deadline not reached (deadline={deadline}, now={now})")]
    TimeoutNotReached { deadline: u64, now: u64 },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("stored round is corrupt: {0}")]
    Corrupt(RoundInvariantError),
    #[error("rollback failed after `{original}`: {rollback}")]
    RollbackFailed {
        original: Box<GameError>,
        rollback: RollbackError,
    },
    #[error("state: {0:#}")]
    State(anyhow::Error),
}

impl GameError {
    /// Errors that indicate storage or ledger inconsistency rather than a rejected action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GameError::Corrupt(_)
                | GameError::RollbackFailed { .. }
                | GameError::State(_)
                | GameError::Ledger(LedgerError::State(_))
        )
    }

    pub fn code(&self) -> u8 {
        match self {
            GameError::InvalidParameter(_) => ERROR_INVALID_PARAMETER,
            GameError::InvalidState { .. } => ERROR_INVALID_STATE,
            GameError::NotFound => ERROR_ROUND_NOT_FOUND,
            GameError::DuplicateParticipant => ERROR_DUPLICATE_PARTICIPANT,
            GameError::ParticipantNotFound => ERROR_PARTICIPANT_NOT_FOUND,
            GameError::AlreadyRevealed => ERROR_ALREADY_REVEALED,
            GameError::TimeoutNotReached { .. } => ERROR_TIMEOUT_NOT_REACHED,
            GameError::Ledger(LedgerError::InsufficientFunds { .. }) => ERROR_INSUFFICIENT_FUNDS,
            GameError::Ledger(LedgerError::NotFrozen { .. }) => ERROR_NOT_FROZEN,
            GameError::Ledger(_)
            | GameError::Corrupt(_)
            | GameError::RollbackFailed { .. }
            | GameError::State(_) => ERROR_LEDGER,
        }
    }
}

/// Undoes the session's ledger calls and reports `original`, unless the undo itself fails.
async fn abort<S: State>(session: Session<'_, S>, original: GameError) -> GameError {
    warn!(error = %original, "unwinding action");
    match session.abort().await {
        Ok(_) => original,
        Err(rollback) => GameError::RollbackFailed {
            original: Box::new(original),
            rollback,
        },
    }
}

/// Executes round actions against a [`State`] for one block.
pub struct Blackwhite<'a> {
    config: &'a GameConfig,
    block: BlockContext,
}

impl<'a> Blackwhite<'a> {
    pub fn new(config: &'a GameConfig, block: BlockContext) -> Self {
        Self { config, block }
    }

    async fn load<S: State>(&self, state: &S, game_id: &Digest) -> Result<Round, GameError> {
        let round = load_round(state, game_id)
            .await
            .map_err(GameError::State)?
            .ok_or(GameError::NotFound)?;
        round.validate_invariants().map_err(GameError::Corrupt)?;
        Ok(round)
    }

    /// Persists `round`, appends its status entry and releases the journal.
    async fn persist<S: State>(
        &self,
        mut session: Session<'_, S>,
        round: Round,
        prev_status: Option<RoundStatus>,
    ) -> Result<Journal, GameError> {
        let event = Event::RoundStatusChanged {
            game_id: round.game_id,
            prev_status,
            status: round.status,
            creator: round.creator.clone(),
        };
        match store_round(session.state(), round).await {
            Ok((key, value)) => {
                let journal = session.journal();
                journal.record(key, value);
                journal.emit(event);
                Ok(session.finish())
            }
            Err(err) => Err(abort(session, GameError::State(err)).await),
        }
    }

    pub async fn create<S: State>(
        &self,
        state: &mut S,
        creator: &PublicKey,
        game_id: Digest,
        play_amount: u64,
        player_count: u32,
        timeout: u64,
    ) -> Result<Journal, GameError> {
        let limits = &self.config.limits;
        if !limits.amount_in_range(play_amount) {
            return Err(GameError::InvalidParameter("play amount out of range"));
        }
        if !limits.player_count_in_range(player_count) {
            return Err(GameError::InvalidParameter("player count out of range"));
        }
        if !limits.timeout_in_range(timeout) {
            return Err(GameError::InvalidParameter("timeout out of range"));
        }
        if load_round(state, &game_id)
            .await
            .map_err(GameError::State)?
            .is_some()
        {
            return Err(GameError::InvalidParameter("game id already in use"));
        }

        let mut session = Session::new(state, self.config.contract);
        session.freeze(creator, limits.creation_deposit).await?;
        let round = Round::new(
            game_id,
            creator.clone(),
            play_amount,
            player_count,
            timeout,
            self.block.timestamp,
        );
        debug!(
            ?game_id,
            creator = ?creator,
            play_amount,
            player_count,
            loop_count = round.loop_count,
            "round created"
        );
        self.persist(session, round, None).await
    }

    pub async fn play<S: State>(
        &self,
        state: &mut S,
        player: &PublicKey,
        game_id: Digest,
        amount: u64,
        commitments: Vec<Digest>,
    ) -> Result<Journal, GameError> {
        let mut round = self.load(state, &game_id).await?;
        let prev_status = round.status;
        if !matches!(prev_status, RoundStatus::Created | RoundStatus::Collecting) {
            return Err(GameError::InvalidState {
                status: prev_status,
            });
        }
        if round.participant_index(player).is_some() {
            return Err(GameError::DuplicateParticipant);
        }
        if player == &self.config.pool {
            return Err(GameError::InvalidParameter("pool cannot play"));
        }
        if amount < round.play_amount {
            return Err(GameError::InvalidParameter("amount below play amount"));
        }
        if commitments.len() != round.loop_count as usize {
            return Err(GameError::InvalidParameter("commitment count mismatch"));
        }

        let mut session = Session::new(state, self.config.contract);
        session.freeze(player, amount).await?;
        round
            .participants
            .push(Participant::new(player.clone(), amount, commitments));
        round.cur_player_count += 1;
        round.status = RoundStatus::Collecting;
        if round.cur_player_count >= round.player_count {
            let show_deadline = self
                .block
                .timestamp
                .saturating_add(self.config.limits.show_timeout);
            round.status = RoundStatus::Revealing;
            round.show_deadline = Some(show_deadline);
            debug!(?game_id, show_deadline, "round full; reveals open");
        }
        debug!(
            ?game_id,
            player = ?player,
            amount,
            joined = round.cur_player_count,
            "player joined"
        );
        self.persist(session, round, Some(prev_status)).await
    }

    pub async fn show<S: State>(
        &self,
        state: &mut S,
        player: &PublicKey,
        game_id: Digest,
        secret: Vec<u8>,
    ) -> Result<Journal, GameError> {
        let mut round = self.load(state, &game_id).await?;
        let prev_status = round.status;
        if prev_status != RoundStatus::Revealing {
            return Err(GameError::InvalidState {
                status: prev_status,
            });
        }
        let index = round
            .participant_index(player)
            .ok_or(GameError::ParticipantNotFound)?;
        if secret.is_empty() || secret.len() > MAX_SECRET_LENGTH {
            return Err(GameError::InvalidParameter("secret length out of range"));
        }
        if round.participants[index].is_revealed() {
            return Err(GameError::AlreadyRevealed);
        }

        round.participants[index].secret = secret;
        round.cur_show_count += 1;
        debug!(
            ?game_id,
            player = ?player,
            revealed = round.cur_show_count,
            "secret revealed"
        );

        let mut session = Session::new(state, self.config.contract);
        if round.cur_show_count >= round.player_count {
            match settle(&mut session, self.config, &round).await {
                Ok(settlement) => {
                    round.winners = settlement.winners;
                    round.status = RoundStatus::Done;
                }
                Err(err) => return Err(abort(session, err.into()).await),
            }
        }
        self.persist(session, round, Some(prev_status)).await
    }

    pub async fn timeout_done<S: State>(
        &self,
        state: &mut S,
        game_id: Digest,
    ) -> Result<Journal, GameError> {
        let mut round = self.load(state, &game_id).await?;
        let prev_status = round.status;
        let now = self.block.timestamp;
        let mut session = Session::new(state, self.config.contract);
        match prev_status {
            RoundStatus::Collecting => {
                let deadline = round.play_deadline();
                if now < deadline {
                    return Err(GameError::TimeoutNotReached { deadline, now });
                }
                if let Err(err) = refund(&mut session, self.config, &round).await {
                    return Err(abort(session, err.into()).await);
                }
                round.status = RoundStatus::TimedOut;
                debug!(?game_id, deadline, "play phase timed out");
            }
            RoundStatus::Revealing => {
                let deadline = round.show_deadline.unwrap_or(round.play_deadline());
                if now < deadline {
                    return Err(GameError::TimeoutNotReached { deadline, now });
                }
                match settle(&mut session, self.config, &round).await {
                    Ok(settlement) => {
                        round.winners = settlement.winners;
                        round.status = RoundStatus::Done;
                    }
                    Err(err) => return Err(abort(session, err.into()).await),
                }
                debug!(
                    ?game_id,
                    deadline,
                    revealed = round.cur_show_count,
                    "reveal phase timed out"
                );
            }
            status => return Err(GameError::InvalidState { status }),
        }
        self.persist(session, round, Some(prev_status)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_fatality() {
        assert_eq!(
            GameError::InvalidParameter("x").code(),
            ERROR_INVALID_PARAMETER
        );
        assert_eq!(
            GameError::Ledger(LedgerError::InsufficientFunds {
                available: 0,
                required: 1
            })
            .code(),
            ERROR_INSUFFICIENT_FUNDS
        );
        assert_eq!(
            GameError::Ledger(LedgerError::NotFrozen {
                frozen: 0,
                required: 1
            })
            .code(),
            ERROR_NOT_FROZEN
        );
        assert!(!GameError::NotFound.is_fatal());
        assert!(!GameError::Ledger(LedgerError::InvalidAmount).is_fatal());
        assert!(GameError::State(anyhow::anyhow!("disk")).is_fatal());
        assert!(GameError::Ledger(LedgerError::State(anyhow::anyhow!("disk"))).is_fatal());
        assert!(GameError::Corrupt(RoundInvariantError::DuplicateParticipant).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = GameError::TimeoutNotReached {
            deadline: 10,
            now: 9,
        };
        assert_eq!(err.to_string(), "deadline not reached (deadline=10, now=9)");
        let err = GameError::InvalidState {
            status: RoundStatus::Done,
        };
        assert_eq!(err.to_string(), "round is Done");
    }
}
