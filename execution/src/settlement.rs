//! Fund movements that close a round.
//!
//! Both entry points run inside an action's [`Session`], so a failed step is unwound by the caller
//! through [`Session::abort`]. The forward order below is the order inverses are replayed in
//! reverse:
//!
//! 1. losers' escrow moves from frozen to the pool's available balance,
//! 2. the pot is split evenly and transferred from the pool to each winner,
//! 3. each winner's own escrow is unfrozen,
//! 4. the creator's deposit is unfrozen.
//!
//! With no winners every escrow is refunded before the creator's deposit is released.

use blackwhite_types::{
    blackwhite::{LoopResult, Round},
    execution::Event,
};
use commonware_cryptography::ed25519::PublicKey;
use tracing::debug;

use crate::{
    config::GameConfig,
    ledger::LedgerError,
    resolution::resolve,
    state::State,
    undo::Session,
};

/// Outcome of a settled round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub winners: Vec<PublicKey>,
    pub losers: Vec<PublicKey>,
    /// Sum of losers' escrow moved to the pool.
    pub pot: u64,
    /// Amount paid to each winner out of the pot.
    pub share: u64,
    pub distributed: u64,
    /// Integer-division dust left with the pool.
    pub remainder: u64,
    pub trace: Vec<LoopResult>,
}

/// Resolves the round's winners and moves funds accordingly.
pub async fn settle<S: State>(
    session: &mut Session<'_, S>,
    config: &GameConfig,
    round: &Round,
) -> Result<Settlement, LedgerError> {
    let resolution = resolve(&round.participants, round.loop_count);

    let mut pot = 0u64;
    let mut share = 0u64;
    if resolution.winners.is_empty() {
        for (address, amount) in &resolution.losers {
            session.unfreeze(address, *amount).await?;
        }
    } else {
        for (address, amount) in &resolution.losers {
            session
                .transfer_frozen(address, &config.pool, *amount)
                .await?;
            pot = pot.checked_add(*amount).ok_or(LedgerError::Overflow)?;
        }
        share = pot / resolution.winners.len() as u64;
        if share > 0 {
            for (address, _) in &resolution.winners {
                session.transfer(&config.pool, address, share).await?;
            }
        }
        for (address, amount) in &resolution.winners {
            session.unfreeze(address, *amount).await?;
        }
    }
    session
        .unfreeze(&round.creator, config.limits.creation_deposit)
        .await?;

    let distributed = share * resolution.winners.len() as u64;
    let remainder = pot - distributed;
    session.journal().emit(Event::LoopResults {
        game_id: round.game_id,
        results: resolution.trace.clone(),
    });
    debug!(
        game_id = ?round.game_id,
        winners = resolution.winners.len(),
        losers = resolution.losers.len(),
        pot,
        share,
        remainder,
        "round settled"
    );

    Ok(Settlement {
        winners: resolution.winners.into_iter().map(|(a, _)| a).collect(),
        losers: resolution.losers.into_iter().map(|(a, _)| a).collect(),
        pot,
        share,
        distributed,
        remainder,
        trace: resolution.trace,
    })
}

/// Releases every participant's escrow, then the creator's deposit.
pub async fn refund<S: State>(
    session: &mut Session<'_, S>,
    config: &GameConfig,
    round: &Round,
) -> Result<(), LedgerError> {
    for participant in &round.participants {
        session
            .unfreeze(&participant.address, participant.amount)
            .await?;
    }
    session
        .unfreeze(&round.creator, config.limits.creation_deposit)
        .await?;
    debug!(
        game_id = ?round.game_id,
        participants = round.participants.len(),
        "round refunded"
    );
    Ok(())
}
