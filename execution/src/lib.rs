//! Blackwhite execution layer.
//!
//! This crate contains the deterministic transaction execution logic ([`Layer`]) and the round
//! state machine of the blackwhite commit-reveal wagering game.
//!
//! ## Determinism requirements
//! - Do not use wall-clock time inside execution; block time comes from [`BlockContext`].
//! - Avoid iteration order of hash-based collections influencing outputs.
//!
//! ## Atomicity
//! The ledger only offers single-account atomic calls. Multi-step fund movements run inside an
//! [`undo::Session`]; a failed step replays the inverse of every completed call, newest first, and
//! the round is left as it was. A failed inverse is surfaced as the fatal
//! [`GameError::RollbackFailed`].
//!
//! ## Minimal execution pipeline (example)
//! ```rust,ignore
//! use blackwhite_execution::{BlockContext, GameConfig, Layer, State};
//!
//! # async fn example<S: State>(state: &mut S, config: GameConfig, txs: Vec<Transaction>)
//! #     -> anyhow::Result<()> {
//! let mut layer = Layer::new(state, &config, BlockContext::new(height, timestamp));
//! let (outputs, nonces) = layer.execute(txs).await?;
//! let changes = layer.commit();
//! state.apply(changes).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod game;
pub mod ledger;
pub mod query;
pub mod resolution;
pub mod settlement;
pub mod state;
pub mod undo;

mod layer;
pub use config::{BlockContext, GameConfig};
pub use game::{Blackwhite, GameError};
pub use layer::Layer;
pub use state::{nonce, Adb, State, Status};

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
#[cfg(any(test, feature = "mocks"))]
pub use state::Memory;

#[cfg(test)]
mod settlement_tests;
