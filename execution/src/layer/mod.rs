use anyhow::{Context as _, Result};
use blackwhite_types::{
    blackwhite::MAX_ERROR_MESSAGE_LENGTH,
    execution::{Event, Instruction, Key, Output, Transaction, Value},
};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest, Digestible};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::{BlockContext, GameConfig};
use crate::game::{Blackwhite, GameError};
use crate::state::{load_account, validate_and_increment_nonce, PrepareError, State, Status};
use crate::undo::Journal;

mod handlers;

/// Copy-on-write overlay that executes one block of transactions.
///
/// Reads fall through to the underlying state; writes stay pending until [`Layer::commit`].
pub struct Layer<'a, S: State> {
    state: &'a S,
    pending: BTreeMap<Key, Status>,

    config: &'a GameConfig,
    block: BlockContext,
}

impl<'a, S: State> Layer<'a, S> {
    pub fn new(state: &'a S, config: &'a GameConfig, block: BlockContext) -> Self {
        Self {
            state,
            pending: BTreeMap::new(),

            config,
            block,
        }
    }

    pub fn block(&self) -> BlockContext {
        self.block
    }

    async fn prepare(&mut self, transaction: &Transaction) -> Result<(), PrepareError> {
        let mut account = load_account(self, &transaction.public)
            .await
            .map_err(PrepareError::State)?;
        validate_and_increment_nonce(&mut account, transaction.nonce)?;
        self.pending.insert(
            Key::Account(transaction.public.clone()),
            Status::Update(Value::Account(account)),
        );

        Ok(())
    }

    async fn apply(&mut self, transaction: &Transaction) -> Result<Vec<Event>> {
        let public = &transaction.public;
        match &transaction.instruction {
            Instruction::BlackwhiteCreate {
                play_amount,
                player_count,
                timeout,
            } => {
                self.handle_blackwhite_create(
                    public,
                    transaction.digest(),
                    *play_amount,
                    *player_count,
                    *timeout,
                )
                .await
            }
            Instruction::BlackwhitePlay {
                game_id,
                amount,
                commitments,
            } => {
                self.handle_blackwhite_play(public, *game_id, *amount, commitments)
                    .await
            }
            Instruction::BlackwhiteShow { game_id, secret } => {
                self.handle_blackwhite_show(public, *game_id, secret).await
            }
            Instruction::BlackwhiteTimeoutDone { game_id } => {
                self.handle_blackwhite_timeout_done(public, *game_id).await
            }
        }
    }

    pub async fn execute(
        &mut self,
        transactions: Vec<Transaction>,
    ) -> Result<(Vec<Output>, BTreeMap<PublicKey, u64>)> {
        let mut processed_nonces = BTreeMap::new();
        let mut outputs = Vec::new();

        for tx in transactions {
            match self.prepare(&tx).await {
                Ok(()) => {}
                Err(PrepareError::NonceMismatch { expected, got }) => {
                    debug!(
                        public = ?tx.public,
                        expected,
                        got,
                        "nonce mismatch; dropping transaction"
                    );
                    continue;
                }
                Err(PrepareError::State(err)) => {
                    return Err(err).context("state error during prepare");
                }
            }
            processed_nonces.insert(tx.public.clone(), tx.nonce.saturating_add(1));
            outputs.extend(self.apply(&tx).await?.into_iter().map(Output::Event));
            outputs.push(Output::Transaction(tx));
        }

        Ok((outputs, processed_nonces))
    }

    pub fn commit(self) -> Vec<(Key, Status)> {
        self.pending.into_iter().collect()
    }
}

impl<'a, S: State> State for Layer<'a, S> {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(key).await?,
        })
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.pending.insert(key, Status::Update(value));
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.pending.insert(key.clone(), Status::Delete);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::load_exec_account;
    use crate::mocks::{
        create_account_keypair, funded_state, make_commitments, test_config, CREATE_TIME,
    };
    use crate::resolution::Color;
    use crate::state::nonce;
    use blackwhite_types::blackwhite::{
        RoundStatus, COIN, ERROR_INVALID_PARAMETER, ERROR_ROUND_NOT_FOUND, MIN_PLAY_TIMEOUT_SECS,
    };
    use commonware_cryptography::{sha256::Sha256, Hasher};
    use commonware_runtime::deterministic::Runner;
    use commonware_runtime::Runner as _;

    fn create_tx(signer: &commonware_cryptography::ed25519::PrivateKey, nonce: u64) -> Transaction {
        Transaction::sign(
            signer,
            nonce,
            Instruction::BlackwhiteCreate {
                play_amount: COIN,
                player_count: 3,
                timeout: MIN_PLAY_TIMEOUT_SECS,
            },
        )
    }

    #[test]
    fn test_nonce_validation() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let config = test_config();
            let (signer, public) = create_account_keypair(1);
            let state = funded_state(&config, &[public.clone()], 10 * COIN).await;
            let mut layer = Layer::new(&state, &config, BlockContext::new(1, CREATE_TIME));

            // Wrong nonce should fail
            assert!(layer.prepare(&create_tx(&signer, 1)).await.is_err());

            // Correct nonce should succeed
            layer.prepare(&create_tx(&signer, 0)).await.unwrap();
            assert_eq!(nonce(&layer, &public).await.unwrap(), 1);

            // Replayed nonce should fail
            assert!(layer.prepare(&create_tx(&signer, 0)).await.is_err());
        });
    }

    #[test]
    fn test_execute_drops_bad_nonce_and_reports_processed() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let config = test_config();
            let (signer, public) = create_account_keypair(1);
            let state = funded_state(&config, &[public.clone()], 10 * COIN).await;
            let mut layer = Layer::new(&state, &config, BlockContext::new(1, CREATE_TIME));

            let good = create_tx(&signer, 0);
            let bad = create_tx(&signer, 5);
            let (outputs, nonces) = layer.execute(vec![good.clone(), bad]).await.unwrap();

            assert_eq!(nonces.get(&public), Some(&1));
            assert_eq!(
                outputs.last(),
                Some(&Output::Transaction(good.clone()))
            );
            assert!(outputs.iter().any(|output| matches!(
                output,
                Output::Event(Event::RoundStatusChanged {
                    game_id,
                    prev_status: None,
                    status: RoundStatus::Created,
                    ..
                }) if *game_id == good.digest()
            )));
        });
    }

    #[test]
    fn test_rejected_action_emits_error_and_consumes_nonce() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let config = test_config();
            let (signer, public) = create_account_keypair(1);
            let state = funded_state(&config, &[public.clone()], 10 * COIN).await;
            let mut layer = Layer::new(&state, &config, BlockContext::new(1, CREATE_TIME));

            let missing = Sha256::hash(b"missing");
            let play = Transaction::sign(
                &signer,
                0,
                Instruction::BlackwhitePlay {
                    game_id: missing,
                    amount: COIN,
                    commitments: make_commitments(b"s", &[Color::White; 3]),
                },
            );
            let too_many = Transaction::sign(
                &signer,
                1,
                Instruction::BlackwhiteCreate {
                    play_amount: COIN,
                    player_count: 2,
                    timeout: MIN_PLAY_TIMEOUT_SECS,
                },
            );
            let (outputs, nonces) = layer.execute(vec![play, too_many]).await.unwrap();
            assert_eq!(nonces.get(&public), Some(&2));

            let codes: Vec<u8> = outputs
                .iter()
                .filter_map(|output| match output {
                    Output::Event(Event::BlackwhiteError { error_code, .. }) => Some(*error_code),
                    _ => None,
                })
                .collect();
            assert_eq!(codes, vec![ERROR_ROUND_NOT_FOUND, ERROR_INVALID_PARAMETER]);

            // Nothing but the nonce was written.
            let account = load_exec_account(&layer, &public, &config.contract)
                .await
                .unwrap();
            assert_eq!(account.frozen, 0);
            let changes = layer.commit();
            assert_eq!(changes.len(), 1);
            assert!(matches!(changes[0].0, Key::Account(_)));
        });
    }

    #[test]
    fn test_commit_applies_to_state() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let config = test_config();
            let (signer, public) = create_account_keypair(1);
            let mut state = funded_state(&config, &[public.clone()], 10 * COIN).await;

            let tx = create_tx(&signer, 0);
            let changes = {
                let mut layer = Layer::new(&state, &config, BlockContext::new(1, CREATE_TIME));
                layer.execute(vec![tx.clone()]).await.unwrap();
                layer.commit()
            };
            state.apply(changes).await.unwrap();

            assert_eq!(nonce(&state, &public).await.unwrap(), 1);
            let account = load_exec_account(&state, &public, &config.contract)
                .await
                .unwrap();
            assert_eq!(account.frozen, config.limits.creation_deposit);
            assert!(state.get(&Key::Round(tx.digest())).await.unwrap().is_some());
        });
    }

    #[test]
    fn test_execution_is_deterministic() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let config = test_config();
            let (signer, public) = create_account_keypair(1);
            let state = funded_state(&config, &[public.clone()], 10 * COIN).await;
            let txs = vec![create_tx(&signer, 0), create_tx(&signer, 1)];

            let mut first = Layer::new(&state, &config, BlockContext::new(1, CREATE_TIME));
            let first_outputs = first.execute(txs.clone()).await.unwrap();
            let mut second = Layer::new(&state, &config, BlockContext::new(1, CREATE_TIME));
            let second_outputs = second.execute(txs).await.unwrap();

            assert_eq!(first_outputs, second_outputs);
            assert_eq!(first.commit(), second.commit());
        });
    }
}
