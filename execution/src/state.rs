use anyhow::{Context as _, Result};
use blackwhite_types::{
    blackwhite::Round,
    execution::{Account, Key, Value},
};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error, Read, ReadExt, Write};
use commonware_cryptography::{
    ed25519::PublicKey,
    sha256::{Digest, Sha256},
    Hasher,
};
use commonware_runtime::{Clock, Metrics, Spawner, Storage};
use commonware_storage::qmdb::any::unordered::variable::Db as AnyAdb;
use commonware_storage::translator::Translator;
use std::future::Future;

#[cfg(any(test, feature = "mocks"))]
use std::collections::HashMap;

pub type Adb<E, T> = AnyAdb<E, Digest, Value, Sha256, T>;

#[derive(Debug)]
pub enum PrepareError {
    NonceMismatch { expected: u64, got: u64 },
    State(anyhow::Error),
}

/// Key-value storage seam the execution layer reads from and writes to.
pub trait State {
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Value>>>;
    fn insert(&mut self, key: Key, value: Value) -> impl Future<Output = Result<()>>;
    fn delete(&mut self, key: &Key) -> impl Future<Output = Result<()>>;

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> impl Future<Output = Result<()>> {
        async {
            for (key, status) in changes {
                match status {
                    Status::Update(value) => self.insert(key, value).await?,
                    Status::Delete => self.delete(&key).await?,
                }
            }
            Ok(())
        }
    }
}

impl<E: Spawner + Metrics + Clock + Storage, T: Translator> State for Adb<E, T> {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        let key_hash = Sha256::hash(&key.encode());
        AnyAdb::get(self, &key_hash).await.context("adb get")
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        let key_hash = Sha256::hash(&key.encode());
        self.update(key_hash, value).await.context("adb update")?;
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        let key_hash = Sha256::hash(&key.encode());
        AnyAdb::delete(self, key_hash).await.context("adb delete")?;
        Ok(())
    }
}

#[cfg(any(test, feature = "mocks"))]
#[derive(Clone, Default)]
pub struct Memory {
    state: HashMap<Key, Value>,
}

#[cfg(any(test, feature = "mocks"))]
impl Memory {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

#[cfg(any(test, feature = "mocks"))]
impl State for Memory {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.state.insert(key, value);
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.state.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}

impl Write for Status {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Status::Update(value) => {
                0u8.write(writer);
                value.write(writer);
            }
            Status::Delete => 1u8.write(writer),
        }
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Status::Update(Value::read(reader)?)),
            1 => Ok(Status::Delete),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1 + match self {
            Status::Update(value) => value.encode_size(),
            Status::Delete => 0,
        }
    }
}

pub async fn nonce<S: State>(state: &S, public: &PublicKey) -> Result<u64> {
    Ok(load_account(state, public).await?.nonce)
}

pub(crate) async fn load_account<S: State>(state: &S, public: &PublicKey) -> Result<Account> {
    Ok(match state.get(&Key::Account(public.clone())).await? {
        Some(Value::Account(account)) => account,
        _ => Account::default(),
    })
}

pub(crate) fn validate_and_increment_nonce(
    account: &mut Account,
    provided_nonce: u64,
) -> Result<(), PrepareError> {
    if account.nonce != provided_nonce {
        return Err(PrepareError::NonceMismatch {
            expected: account.nonce,
            got: provided_nonce,
        });
    }
    account.nonce += 1;
    Ok(())
}

/// Reads a persisted round. A value of another kind under a round key is a storage fault.
pub async fn load_round<S: State>(state: &S, game_id: &Digest) -> Result<Option<Round>> {
    match state
        .get(&Key::Round(*game_id))
        .await
        .context("load round")?
    {
        Some(Value::Round(round)) => Ok(Some(round)),
        Some(other) => anyhow::bail!("unexpected value under round key: {other:?}"),
        None => Ok(None),
    }
}

/// Persists a round under its game id and returns the written pair.
pub async fn store_round<S: State>(state: &mut S, round: Round) -> Result<(Key, Value)> {
    let key = Key::Round(round.game_id);
    let value = Value::Round(round);
    state
        .insert(key.clone(), value.clone())
        .await
        .context("store round")?;
    Ok((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_account_keypair, create_state_adb};
    use blackwhite_types::blackwhite::COIN;
    use commonware_runtime::{deterministic::Runner, Runner as _};

    #[test]
    fn test_status_roundtrip() {
        let update = Status::Update(Value::Account(Account { nonce: 9 }));
        let encoded = update.encode();
        assert_eq!(encoded.len(), update.encode_size());
        assert_eq!(Status::read(&mut &encoded[..]).unwrap(), update);

        let delete = Status::Delete.encode();
        assert_eq!(Status::read(&mut &delete[..]).unwrap(), Status::Delete);
        assert!(Status::read(&mut &[7u8][..]).is_err());
    }

    #[test]
    fn test_nonce_increments_only_on_match() {
        let mut account = Account { nonce: 3 };
        assert!(matches!(
            validate_and_increment_nonce(&mut account, 2),
            Err(PrepareError::NonceMismatch {
                expected: 3,
                got: 2
            })
        ));
        assert_eq!(account.nonce, 3);
        validate_and_increment_nonce(&mut account, 3).unwrap();
        assert_eq!(account.nonce, 4);
    }

    #[test]
    fn test_apply_changes() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let (_, public) = create_account_keypair(2);
            let key = Key::Account(public.clone());
            let mut state = Memory::default();
            state
                .apply(vec![(
                    key.clone(),
                    Status::Update(Value::Account(Account { nonce: 5 })),
                )])
                .await
                .unwrap();
            assert_eq!(nonce(&state, &public).await.unwrap(), 5);

            state.apply(vec![(key, Status::Delete)]).await.unwrap();
            assert_eq!(nonce(&state, &public).await.unwrap(), 0);
            assert!(state.is_empty());
        });
    }

    #[test]
    fn test_round_store_rejects_foreign_value() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let game_id = Sha256::hash(b"game");
            let mut state = Memory::default();
            assert!(load_round(&state, &game_id).await.unwrap().is_none());

            state
                .insert(Key::Round(game_id), Value::Account(Account::default()))
                .await
                .unwrap();
            assert!(load_round(&state, &game_id).await.is_err());
        });
    }

    #[test]
    fn test_adb_round_store() {
        let executor = Runner::default();
        executor.start(|context| async move {
            let mut adb = create_state_adb(&context).await;
            let (_, creator) = create_account_keypair(3);
            let game_id = Sha256::hash(b"adb-game");
            let round = Round::new(game_id, creator, COIN, 3, 600, 1_700_000_000);

            assert!(load_round(&adb, &game_id).await.unwrap().is_none());
            let (key, _) = store_round(&mut adb, round.clone()).await.unwrap();
            assert_eq!(key, Key::Round(game_id));
            assert_eq!(load_round(&adb, &game_id).await.unwrap(), Some(round));

            State::delete(&mut adb, &key).await.unwrap();
            assert!(load_round(&adb, &game_id).await.unwrap().is_none());
        });
    }
}
