//! Settlement under ledger failures: every failed step must leave balances and the round exactly
//! as they were before the action, or surface a fatal rollback error.

use crate::config::{BlockContext, GameConfig};
use crate::game::{Blackwhite, GameError};
use crate::layer::Layer;
use crate::ledger::{load_exec_account, LedgerError};
use crate::mocks::{
    create_account_keypair, funded_state, make_commitments, secret_for, set_exec_account,
    test_config, FaultyState, CREATE_TIME,
};
use crate::resolution::Color::{self, Black as B, White as W};
use crate::state::{load_round, store_round, Memory, State};
use crate::undo::LedgerCall;
use blackwhite_types::blackwhite::{loop_count, Round, RoundStatus, COIN, SHOW_TIMEOUT_SECS};
use blackwhite_types::execution::{ExecAccount, Instruction, Transaction};
use commonware_cryptography::{
    ed25519::PublicKey,
    sha256::{Digest, Sha256},
    Hasher,
};
use commonware_runtime::{deterministic::Runner, Runner as _};
use proptest::prelude::*;

const FUNDS: u64 = 100 * COIN;
const TIMEOUT: u64 = 60 * 60;
const JOIN_TIME: u64 = CREATE_TIME + 30;

struct Fixture {
    config: GameConfig,
    creator: PublicKey,
    players: Vec<PublicKey>,
    game_id: Digest,
}

impl Fixture {
    fn new(players: usize) -> Self {
        Self {
            config: test_config(),
            creator: create_account_keypair(10).1,
            players: (0..players)
                .map(|i| create_account_keypair(11 + i as u64).1)
                .collect(),
            game_id: Sha256::hash(b"settlement"),
        }
    }

    fn seed(index: usize) -> u64 {
        11 + index as u64
    }

    async fn funded(&self) -> Memory {
        let mut accounts = self.players.clone();
        accounts.push(self.creator.clone());
        funded_state(&self.config, &accounts, FUNDS).await
    }

    fn engine(&self, timestamp: u64) -> Blackwhite<'_> {
        Blackwhite::new(&self.config, BlockContext::new(1, timestamp))
    }

    /// Creates the round and lets one player join per entry of `colors`.
    async fn open<S: State>(&self, state: &mut S, colors: &[Vec<Color>], amounts: &[u64]) {
        self.engine(CREATE_TIME)
            .create(
                state,
                &self.creator,
                self.game_id,
                COIN,
                self.players.len() as u32,
                TIMEOUT,
            )
            .await
            .unwrap();
        for (i, colors) in colors.iter().enumerate() {
            let amount = amounts.get(i).copied().unwrap_or(COIN);
            self.engine(JOIN_TIME)
                .play(
                    state,
                    &self.players[i],
                    self.game_id,
                    amount,
                    make_commitments(&secret_for(Self::seed(i)), colors),
                )
                .await
                .unwrap();
        }
    }

    async fn show<S: State>(&self, state: &mut S, index: usize) -> Result<(), GameError> {
        self.engine(JOIN_TIME + 1)
            .show(
                state,
                &self.players[index],
                self.game_id,
                secret_for(Self::seed(index)),
            )
            .await
            .map(|_| ())
    }

    async fn round<S: State>(&self, state: &S) -> Round {
        load_round(state, &self.game_id).await.unwrap().unwrap()
    }

    /// Players, then creator, then pool.
    async fn balances<S: State>(&self, state: &S) -> Vec<ExecAccount> {
        let mut owners = self.players.clone();
        owners.push(self.creator.clone());
        owners.push(self.config.pool.clone());
        let mut balances = Vec::with_capacity(owners.len());
        for owner in &owners {
            balances.push(
                load_exec_account(state, owner, &self.config.contract)
                    .await
                    .unwrap(),
            );
        }
        balances
    }

    async fn tamper<S: State>(&self, state: &mut S, owner: &PublicKey, account: ExecAccount) {
        set_exec_account(state, owner, &self.config.contract, account).await;
    }
}

/// `whites` all-white players followed by `blacks` all-black players.
fn split(whites: usize, blacks: usize) -> Vec<Vec<Color>> {
    let loops = loop_count((whites + blacks) as u32) as usize;
    let mut colors = vec![vec![W; loops]; whites];
    colors.extend(vec![vec![B; loops]; blacks]);
    colors
}

const ESCROWED: ExecAccount = ExecAccount {
    balance: FUNDS - COIN,
    frozen: COIN,
};

#[test]
fn test_failed_loser_transfer_restores_everything() {
    let executor = Runner::default();
    executor.start(|_| async move {
        // Three whites are eliminated in the first round; four blacks remain.
        let fx = Fixture::new(7);
        let mut state = fx.funded().await;
        fx.open(&mut state, &split(3, 4), &[]).await;
        for i in 0..6 {
            fx.show(&mut state, i).await.unwrap();
        }

        // The third loser's escrow has gone missing.
        fx.tamper(
            &mut state,
            &fx.players[2],
            ExecAccount {
                balance: FUNDS - COIN,
                frozen: 0,
            },
        )
        .await;
        let balances = fx.balances(&state).await;
        let round = fx.round(&state).await;

        let err = fx.show(&mut state, 6).await.unwrap_err();
        assert!(matches!(
            err,
            GameError::Ledger(LedgerError::NotFrozen { frozen: 0, required }) if required == COIN
        ));
        assert!(!err.is_fatal());
        assert_eq!(fx.balances(&state).await, balances);
        assert_eq!(fx.round(&state).await, round);

        // Once the escrow is back the same reveal settles the round.
        fx.tamper(&mut state, &fx.players[2], ESCROWED).await;
        fx.show(&mut state, 6).await.unwrap();
        let round = fx.round(&state).await;
        assert_eq!(round.status, RoundStatus::Done);
        assert_eq!(round.winners, fx.players[3..].to_vec());
        let share = 3 * COIN / 4;
        for winner in &fx.players[3..] {
            let account = load_exec_account(&state, winner, &fx.config.contract)
                .await
                .unwrap();
            assert_eq!(account.balance, FUNDS + share);
        }
    });
}

#[test]
fn test_failed_winner_transfer_restores_everything() {
    let executor = Runner::default();
    executor.start(|_| async move {
        let fx = Fixture::new(7);
        let mut state = fx.funded().await;
        fx.open(&mut state, &split(3, 4), &[]).await;
        for i in 0..6 {
            fx.show(&mut state, i).await.unwrap();
        }

        // Crediting the first winner's share overflows.
        fx.tamper(
            &mut state,
            &fx.players[3],
            ExecAccount {
                balance: u64::MAX - 1,
                frozen: COIN,
            },
        )
        .await;
        let balances = fx.balances(&state).await;

        let err = fx.show(&mut state, 6).await.unwrap_err();
        assert!(matches!(err, GameError::Ledger(LedgerError::Overflow)));
        assert_eq!(fx.balances(&state).await, balances);
        assert_eq!(fx.round(&state).await.status, RoundStatus::Revealing);
        assert_eq!(fx.round(&state).await.cur_show_count, 6);
    });
}

#[test]
fn test_failed_winner_unfreeze_restores_everything() {
    let executor = Runner::default();
    executor.start(|_| async move {
        let fx = Fixture::new(7);
        let mut state = fx.funded().await;
        fx.open(&mut state, &split(3, 4), &[]).await;
        for i in 0..6 {
            fx.show(&mut state, i).await.unwrap();
        }

        // The last winner's escrow cannot be released.
        fx.tamper(
            &mut state,
            &fx.players[6],
            ExecAccount {
                balance: FUNDS - COIN,
                frozen: COIN / 2,
            },
        )
        .await;
        let balances = fx.balances(&state).await;

        let err = fx.show(&mut state, 6).await.unwrap_err();
        assert!(matches!(
            err,
            GameError::Ledger(LedgerError::NotFrozen { required, .. }) if required == COIN
        ));
        assert_eq!(fx.balances(&state).await, balances);
        let pool = balances.last().copied().unwrap();
        assert_eq!(pool.total(), 0);
    });
}

#[test]
fn test_failed_deposit_release_restores_everything() {
    let executor = Runner::default();
    executor.start(|_| async move {
        let fx = Fixture::new(3);
        let mut state = fx.funded().await;
        fx.open(&mut state, &split(1, 2), &[]).await;
        fx.show(&mut state, 0).await.unwrap();
        fx.show(&mut state, 1).await.unwrap();

        fx.tamper(
            &mut state,
            &fx.creator,
            ExecAccount {
                balance: FUNDS,
                frozen: 0,
            },
        )
        .await;
        let balances = fx.balances(&state).await;

        let err = fx.show(&mut state, 2).await.unwrap_err();
        assert!(matches!(
            err,
            GameError::Ledger(LedgerError::NotFrozen { frozen: 0, .. })
        ));
        assert_eq!(fx.balances(&state).await, balances);
        assert_eq!(fx.round(&state).await.status, RoundStatus::Revealing);
    });
}

#[test]
fn test_failed_refund_without_reveals_restores_everything() {
    let executor = Runner::default();
    executor.start(|_| async move {
        let fx = Fixture::new(3);
        let mut state = fx.funded().await;
        fx.open(&mut state, &split(1, 2), &[]).await;

        fx.tamper(
            &mut state,
            &fx.players[1],
            ExecAccount {
                balance: FUNDS - COIN,
                frozen: 0,
            },
        )
        .await;
        let balances = fx.balances(&state).await;
        let round = fx.round(&state).await;

        let deadline = JOIN_TIME + SHOW_TIMEOUT_SECS;
        let err = fx
            .engine(deadline)
            .timeout_done(&mut state, fx.game_id)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Ledger(LedgerError::NotFrozen { .. })));
        assert_eq!(fx.balances(&state).await, balances);
        assert_eq!(fx.balances(&state).await[0], ESCROWED);
        assert_eq!(fx.round(&state).await, round);
    });
}

#[test]
fn test_failed_play_timeout_restores_everything() {
    let executor = Runner::default();
    executor.start(|_| async move {
        let fx = Fixture::new(3);
        let mut state = fx.funded().await;
        fx.open(&mut state, &split(1, 2)[..2], &[]).await;
        assert_eq!(fx.round(&state).await.status, RoundStatus::Collecting);

        fx.tamper(
            &mut state,
            &fx.creator,
            ExecAccount {
                balance: FUNDS,
                frozen: 0,
            },
        )
        .await;
        let balances = fx.balances(&state).await;

        let err = fx
            .engine(CREATE_TIME + TIMEOUT)
            .timeout_done(&mut state, fx.game_id)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Ledger(LedgerError::NotFrozen { .. })));
        assert_eq!(fx.balances(&state).await, balances);
        assert_eq!(fx.balances(&state).await[..2], [ESCROWED, ESCROWED]);
        assert_eq!(fx.round(&state).await.status, RoundStatus::Collecting);
    });
}

#[test]
fn test_failed_undo_is_fatal() {
    let executor = Runner::default();
    executor.start(|_| async move {
        let fx = Fixture::new(7);
        let mut state = FaultyState::new(fx.funded().await);
        fx.open(&mut state, &split(3, 4), &[]).await;
        for i in 0..6 {
            fx.show(&mut state, i).await.unwrap();
        }
        fx.tamper(
            &mut state,
            &fx.players[2],
            ExecAccount {
                balance: FUNDS - COIN,
                frozen: 0,
            },
        )
        .await;

        // The pool accepts the first two loser transfers, then refuses to pay anything back.
        state.fail_writes_after(&fx.config.pool, &fx.config.contract, 2);
        let err = fx.show(&mut state, 6).await.unwrap_err();
        assert!(err.is_fatal());
        match err {
            GameError::RollbackFailed { original, rollback } => {
                assert!(matches!(
                    *original,
                    GameError::Ledger(LedgerError::NotFrozen { .. })
                ));
                assert_eq!(rollback.undone, 0);
                assert!(matches!(
                    &rollback.call,
                    LedgerCall::TransferFrozen { from, .. } if from == &fx.players[1]
                ));
                assert!(matches!(rollback.source, LedgerError::State(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    });
}

#[test]
fn test_corrupt_round_halts_block() {
    let executor = Runner::default();
    executor.start(|_| async move {
        let fx = Fixture::new(3);
        let mut state = fx.funded().await;
        let mut round = Round::new(
            fx.game_id,
            fx.creator.clone(),
            COIN,
            3,
            TIMEOUT,
            CREATE_TIME,
        );
        round.cur_player_count = 2;
        store_round(&mut state, round).await.unwrap();

        let (signer, _) = create_account_keypair(Fixture::seed(0));
        let tx = Transaction::sign(
            &signer,
            0,
            Instruction::BlackwhiteTimeoutDone {
                game_id: fx.game_id,
            },
        );
        let mut layer = Layer::new(
            &state,
            &fx.config,
            BlockContext::new(1, CREATE_TIME + TIMEOUT),
        );
        let err = layer.execute(vec![tx]).await.unwrap_err();
        assert!(format!("{err:#}").contains("corrupt"));
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_closing_a_round_conserves_value(
        players in 3usize..8,
        colors in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 4), 8),
        revealed in proptest::collection::vec(any::<bool>(), 8),
        extra in proptest::collection::vec(0u64..COIN, 8),
    ) {
        let (before, after, round) = Runner::default().start(|_| async move {
            let fx = Fixture::new(players);
            let mut state = fx.funded().await;
            let loops = loop_count(players as u32) as usize;
            let colors: Vec<Vec<Color>> = colors[..players]
                .iter()
                .map(|bits| bits[..loops].iter().map(|b| if *b { B } else { W }).collect())
                .collect();
            let amounts: Vec<u64> = extra.iter().map(|e| COIN + e).collect();

            let before: u64 = fx.balances(&state).await.iter().map(ExecAccount::total).sum();
            fx.open(&mut state, &colors, &amounts).await;
            for i in (0..players).filter(|i| revealed[*i]) {
                fx.show(&mut state, i).await.unwrap();
            }
            if fx.round(&state).await.status == RoundStatus::Revealing {
                fx.engine(JOIN_TIME + SHOW_TIMEOUT_SECS)
                    .timeout_done(&mut state, fx.game_id)
                    .await
                    .unwrap();
            }
            let after = fx.balances(&state).await;
            (before, after, fx.round(&state).await)
        });

        prop_assert_eq!(round.status, RoundStatus::Done);
        prop_assert_eq!(before, after.iter().map(ExecAccount::total).sum::<u64>());
        prop_assert!(after.iter().all(|account| account.frozen == 0));
        for winner in &round.winners {
            let participant = round.participant(winner).unwrap();
            prop_assert!(participant.is_revealed());
        }
        if round.winners.is_empty() {
            // Nobody forfeits when nobody wins.
            prop_assert_eq!(after.last().unwrap().total(), 0);
        }
    }
}
