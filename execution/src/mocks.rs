//! Deterministic fixtures for tests and simulations.

use crate::config::GameConfig;
use crate::ledger;
use crate::resolution::{commitment, Color};
use crate::state::{Adb, Memory, State};
use anyhow::Result;
use blackwhite_types::{
    blackwhite::{GameLimits, Participant},
    execution::{ExecAccount, Key, Value},
};
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    sha256::Digest,
    Signer,
};
use commonware_math::algebra::Random;
use commonware_runtime::{buffer::PoolRef, Clock, Metrics, Spawner, Storage};
use commonware_storage::{qmdb, translator::EightCap};
use commonware_utils::{NZUsize, NZU64};
use rand::{rngs::StdRng, SeedableRng};

/// Block time used by fixtures when a round is created.
pub const CREATE_TIME: u64 = 1_700_000_000;

/// Seed of the pool account in [`test_config`].
pub const POOL_SEED: u64 = 0;

/// Creates an account keypair for Ed25519 signatures used by users
pub fn create_account_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = PrivateKey::random(&mut rng);
    let public = private.public_key();
    (private, public)
}

pub fn test_config() -> GameConfig {
    let (_, pool) = create_account_keypair(POOL_SEED);
    GameConfig::new(pool, GameLimits::default())
}

/// Secret revealed by the participant created from `seed`.
pub fn secret_for(seed: u64) -> Vec<u8> {
    format!("secret-{seed}").into_bytes()
}

pub fn make_commitments(secret: &[u8], colors: &[Color]) -> Vec<Digest> {
    colors
        .iter()
        .map(|color| commitment(secret, *color))
        .collect()
}

/// A revealed participant committing to `colors`.
pub fn make_participant(seed: u64, amount: u64, colors: &[Color]) -> Participant {
    let (_, address) = create_account_keypair(seed);
    let secret = secret_for(seed);
    let mut participant = Participant::new(address, amount, make_commitments(&secret, colors));
    participant.secret = secret;
    participant
}

/// In-memory state where each of `accounts` holds `amount` available in the game contract.
pub async fn funded_state(config: &GameConfig, accounts: &[PublicKey], amount: u64) -> Memory {
    let mut state = Memory::default();
    for account in accounts {
        ledger::deposit(&mut state, account, &config.contract, amount)
            .await
            .expect("deposit into empty account");
    }
    state
}

/// Creates a state database for testing
pub async fn create_state_adb<E: Spawner + Metrics + Storage + Clock>(
    context: &E,
) -> Adb<E, EightCap> {
    let buffer_pool = PoolRef::new(NZUsize!(1024), NZUsize!(1024));

    Adb::init(
        context.with_label("state"),
        qmdb::any::VariableConfig {
            mmr_journal_partition: String::from("state-mmr-journal"),
            mmr_metadata_partition: String::from("state-mmr-metadata"),
            mmr_items_per_blob: NZU64!(1024),
            mmr_write_buffer: NZUsize!(1024),
            log_partition: String::from("state-log-journal"),
            log_items_per_blob: NZU64!(1024),
            log_write_buffer: NZUsize!(1024),
            log_compression: None,
            log_codec_config: (),
            translator: EightCap,
            thread_pool: None,
            buffer_pool,
        },
    )
    .await
    .expect("Failed to initialize state ADB")
}

/// In-memory state whose writes to selected execution accounts fail.
///
/// Used to drive a ledger call, or the undo of one, into a storage error.
#[derive(Default)]
pub struct FaultyState {
    inner: Memory,
    /// Accounts that fail once their remaining write allowance is used up.
    failing: Vec<(Key, usize)>,
}

impl FaultyState {
    pub fn new(inner: Memory) -> Self {
        Self {
            inner,
            failing: Vec::new(),
        }
    }

    pub fn fail_writes_to(&mut self, owner: &PublicKey, contract: &Digest) {
        self.fail_writes_after(owner, contract, 0);
    }

    /// Lets `allowed` more writes to the account succeed, then fails every later one.
    pub fn fail_writes_after(&mut self, owner: &PublicKey, contract: &Digest, allowed: usize) {
        let key = Key::ExecAccount {
            owner: owner.clone(),
            contract: *contract,
        };
        self.failing.retain(|(k, _)| k != &key);
        self.failing.push((key, allowed));
    }
}

impl State for FaultyState {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        if let Some((_, allowed)) = self.failing.iter_mut().find(|(k, _)| k == &key) {
            if *allowed == 0 {
                anyhow::bail!("injected write failure for {key:?}");
            }
            *allowed -= 1;
        }
        self.inner.insert(key, value).await
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.inner.delete(key).await
    }
}

/// Overwrites an execution account, bypassing the ledger's checks.
pub async fn set_exec_account<S: State>(
    state: &mut S,
    owner: &PublicKey,
    contract: &Digest,
    account: ExecAccount,
) {
    state
        .insert(
            Key::ExecAccount {
                owner: owner.clone(),
                contract: *contract,
            },
            Value::ExecAccount(account),
        )
        .await
        .expect("write exec account");
}
