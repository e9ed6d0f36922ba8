use bytes::{Buf, BufMut};
use commonware_codec::{
    Encode, EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write,
};
use commonware_cryptography::{
    ed25519::{self, PublicKey},
    sha256::{Digest, Sha256},
    Digestible, Hasher, Signer, Verifier,
};
use commonware_utils::union;

use crate::blackwhite::{
    read_string, string_encode_size, write_string, LoopResult, Round, RoundStatus, MAX_LOOP,
    MAX_ERROR_MESSAGE_LENGTH, MAX_SECRET_LENGTH,
};

pub const NAMESPACE: &[u8] = b"_BLACKWHITE";
pub const TRANSACTION_SUFFIX: &[u8] = b"_TX";
pub const MAX_BLOCK_TRANSACTIONS: usize = 500;
const MAX_LOOP_RESULTS: usize = MAX_LOOP;

#[inline]
pub fn transaction_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, TRANSACTION_SUFFIX)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub instruction: Instruction,

    pub public: ed25519::PublicKey,
    pub signature: ed25519::Signature,
}

impl Transaction {
    fn payload(nonce: &u64, instruction: &Instruction) -> Vec<u8> {
        let mut payload = Vec::new();
        nonce.write(&mut payload);
        instruction.write(&mut payload);

        payload
    }

    pub fn sign(private: &ed25519::PrivateKey, nonce: u64, instruction: Instruction) -> Self {
        let signature = private.sign(
            &transaction_namespace(NAMESPACE),
            &Self::payload(&nonce, &instruction),
        );

        Self {
            nonce,
            instruction,
            public: private.public_key(),
            signature,
        }
    }

    pub fn verify(&self) -> bool {
        self.public.verify(
            &transaction_namespace(NAMESPACE),
            &Self::payload(&self.nonce, &self.instruction),
            &self.signature,
        )
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
        self.instruction.write(writer);
        self.public.write(writer);
        self.signature.write(writer);
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let nonce = u64::read(reader)?;
        let instruction = Instruction::read(reader)?;
        let public = ed25519::PublicKey::read(reader)?;
        let signature = ed25519::Signature::read(reader)?;

        Ok(Self {
            nonce,
            instruction,
            public,
            signature,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size()
            + self.instruction.encode_size()
            + self.public.encode_size()
            + self.signature.encode_size()
    }
}

impl Digestible for Transaction {
    type Digest = Digest;

    /// The digest of a `BlackwhiteCreate` transaction is the game identifier of the round it
    /// creates.
    fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(self.nonce.to_be_bytes().as_ref());
        hasher.update(self.instruction.encode().as_ref());
        hasher.update(self.public.as_ref());
        // We don't include the signature as part of the digest (any valid
        // signature will be valid for the transaction)
        hasher.finalize()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    // Blackwhite instructions (tags 30-33)
    /// Open a new round and freeze the creation deposit.
    /// Binary: [30] [playAmount:u64 BE] [playerCount:u32 BE] [timeout:u64 BE]
    BlackwhiteCreate {
        play_amount: u64,
        player_count: u32,
        timeout: u64,
    },

    /// Join a round with a stake and one commitment per elimination round.
    /// Binary: [31] [gameId:32] [amount:u64 BE] [count:varint] [commitment:32]...
    BlackwhitePlay {
        game_id: Digest,
        amount: u64,
        commitments: Vec<Digest>,
    },

    /// Reveal the secret behind a participant's commitments.
    /// Binary: [32] [gameId:32] [len:varint] [secret...]
    BlackwhiteShow { game_id: Digest, secret: Vec<u8> },

    /// Close a round whose play or reveal deadline has elapsed.
    /// Binary: [33] [gameId:32]
    BlackwhiteTimeoutDone { game_id: Digest },
}

impl Write for Instruction {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::BlackwhiteCreate {
                play_amount,
                player_count,
                timeout,
            } => {
                30u8.write(writer);
                play_amount.write(writer);
                player_count.write(writer);
                timeout.write(writer);
            }
            Self::BlackwhitePlay {
                game_id,
                amount,
                commitments,
            } => {
                31u8.write(writer);
                game_id.write(writer);
                amount.write(writer);
                commitments.write(writer);
            }
            Self::BlackwhiteShow { game_id, secret } => {
                32u8.write(writer);
                game_id.write(writer);
                secret.write(writer);
            }
            Self::BlackwhiteTimeoutDone { game_id } => {
                33u8.write(writer);
                game_id.write(writer);
            }
        }
    }
}

impl Read for Instruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let instruction = match u8::read(reader)? {
            30 => Self::BlackwhiteCreate {
                play_amount: u64::read(reader)?,
                player_count: u32::read(reader)?,
                timeout: u64::read(reader)?,
            },
            31 => Self::BlackwhitePlay {
                game_id: Digest::read(reader)?,
                amount: u64::read(reader)?,
                commitments: Vec::<Digest>::read_range(reader, 0..=MAX_LOOP)?,
            },
            32 => Self::BlackwhiteShow {
                game_id: Digest::read(reader)?,
                secret: Vec::<u8>::read_range(reader, 0..=MAX_SECRET_LENGTH)?,
            },
            33 => Self::BlackwhiteTimeoutDone {
                game_id: Digest::read(reader)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(instruction)
    }
}

impl EncodeSize for Instruction {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::BlackwhiteCreate {
                    play_amount,
                    player_count,
                    timeout,
                } => play_amount.encode_size() + player_count.encode_size() + timeout.encode_size(),
                Self::BlackwhitePlay {
                    game_id,
                    amount,
                    commitments,
                } => game_id.encode_size() + amount.encode_size() + commitments.encode_size(),
                Self::BlackwhiteShow { game_id, secret } => {
                    game_id.encode_size() + secret.encode_size()
                }
                Self::BlackwhiteTimeoutDone { game_id } => game_id.encode_size(),
            }
    }
}

/// Nonce tracking for transaction signers.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Account {
    pub nonce: u64,
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            nonce: u64::read(reader)?,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size()
    }
}

/// Coins an address holds inside one contract: spendable `balance` and escrowed `frozen`.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct ExecAccount {
    pub balance: u64,
    pub frozen: u64,
}

impl ExecAccount {
    pub fn total(&self) -> u64 {
        self.balance.saturating_add(self.frozen)
    }
}

impl Write for ExecAccount {
    fn write(&self, writer: &mut impl BufMut) {
        self.balance.write(writer);
        self.frozen.write(writer);
    }
}

impl Read for ExecAccount {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            balance: u64::read(reader)?,
            frozen: u64::read(reader)?,
        })
    }
}

impl FixedSize for ExecAccount {
    const SIZE: usize = u64::SIZE * 2;
}

/// Kind of balance mutation recorded in `Event::ExecAccountChanged`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccountOp {
    Deposit = 0,
    Freeze = 1,
    Unfreeze = 2,
    TransferFrozen = 3,
    Transfer = 4,
}

impl TryFrom<u8> for AccountOp {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AccountOp::Deposit),
            1 => Ok(AccountOp::Freeze),
            2 => Ok(AccountOp::Unfreeze),
            3 => Ok(AccountOp::TransferFrozen),
            4 => Ok(AccountOp::Transfer),
            _ => Err(()),
        }
    }
}

impl Write for AccountOp {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for AccountOp {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        AccountOp::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl FixedSize for AccountOp {
    const SIZE: usize = u8::SIZE;
}

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    /// Account for nonce tracking (tag 0)
    Account(PublicKey),

    /// Per-contract balances of an address (tag 1)
    ExecAccount { owner: PublicKey, contract: Digest },

    /// Blackwhite round by game id (tag 30)
    Round(Digest),
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(pk) => {
                0u8.write(writer);
                pk.write(writer);
            }
            Self::ExecAccount { owner, contract } => {
                1u8.write(writer);
                owner.write(writer);
                contract.write(writer);
            }
            Self::Round(game_id) => {
                30u8.write(writer);
                game_id.write(writer);
            }
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(PublicKey::read(reader)?),
            1 => Self::ExecAccount {
                owner: PublicKey::read(reader)?,
                contract: Digest::read(reader)?,
            },
            30 => Self::Round(Digest::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(_) => PublicKey::SIZE,
                Self::ExecAccount { .. } => PublicKey::SIZE + Digest::SIZE,
                Self::Round(_) => Digest::SIZE,
            }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Value {
    /// Account for nonce tracking (tag 0)
    Account(Account),

    /// Per-contract balances (tag 1)
    ExecAccount(ExecAccount),

    /// Blackwhite round (tag 30)
    Round(Round),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::ExecAccount(account) => {
                1u8.write(writer);
                account.write(writer);
            }
            Self::Round(round) => {
                30u8.write(writer);
                round.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::ExecAccount(ExecAccount::read(reader)?),
            30 => Self::Round(Round::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(account) => account.encode_size(),
                Self::ExecAccount(account) => account.encode_size(),
                Self::Round(round) => round.encode_size(),
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Ledger events (tag 10)
    ExecAccountChanged {
        op: AccountOp,
        owner: PublicKey,
        contract: Digest,
        prev: ExecAccount,
        current: ExecAccount,
    },

    // Blackwhite events (tags 30-31)
    /// Audit entry emitted by every round mutation. `prev_status` is `None` on creation.
    RoundStatusChanged {
        game_id: Digest,
        prev_status: Option<RoundStatus>,
        status: RoundStatus,
        creator: PublicKey,
    },
    /// Per-round elimination trace attached to settlement.
    LoopResults {
        game_id: Digest,
        results: Vec<LoopResult>,
    },

    // Error event (tag 39)
    BlackwhiteError {
        player: PublicKey,
        game_id: Option<Digest>,
        error_code: u8,
        message: String,
    },
}

impl Write for Event {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::ExecAccountChanged {
                op,
                owner,
                contract,
                prev,
                current,
            } => {
                10u8.write(writer);
                op.write(writer);
                owner.write(writer);
                contract.write(writer);
                prev.write(writer);
                current.write(writer);
            }
            Self::RoundStatusChanged {
                game_id,
                prev_status,
                status,
                creator,
            } => {
                30u8.write(writer);
                game_id.write(writer);
                prev_status.write(writer);
                status.write(writer);
                creator.write(writer);
            }
            Self::LoopResults { game_id, results } => {
                31u8.write(writer);
                game_id.write(writer);
                results.write(writer);
            }
            Self::BlackwhiteError {
                player,
                game_id,
                error_code,
                message,
            } => {
                39u8.write(writer);
                player.write(writer);
                game_id.write(writer);
                error_code.write(writer);
                write_string(message, writer);
            }
        }
    }
}

impl Read for Event {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let event = match u8::read(reader)? {
            10 => Self::ExecAccountChanged {
                op: AccountOp::read(reader)?,
                owner: PublicKey::read(reader)?,
                contract: Digest::read(reader)?,
                prev: ExecAccount::read(reader)?,
                current: ExecAccount::read(reader)?,
            },
            30 => Self::RoundStatusChanged {
                game_id: Digest::read(reader)?,
                prev_status: Option::<RoundStatus>::read(reader)?,
                status: RoundStatus::read(reader)?,
                creator: PublicKey::read(reader)?,
            },
            31 => Self::LoopResults {
                game_id: Digest::read(reader)?,
                results: Vec::<LoopResult>::read_range(reader, 0..=MAX_LOOP_RESULTS)?,
            },
            39 => Self::BlackwhiteError {
                player: PublicKey::read(reader)?,
                game_id: Option::<Digest>::read(reader)?,
                error_code: u8::read(reader)?,
                message: read_string(reader, MAX_ERROR_MESSAGE_LENGTH)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(event)
    }
}

impl EncodeSize for Event {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::ExecAccountChanged {
                    op,
                    owner,
                    contract,
                    prev,
                    current,
                } => {
                    op.encode_size()
                        + owner.encode_size()
                        + contract.encode_size()
                        + prev.encode_size()
                        + current.encode_size()
                }
                Self::RoundStatusChanged {
                    game_id,
                    prev_status,
                    status,
                    creator,
                } => {
                    game_id.encode_size()
                        + prev_status.encode_size()
                        + status.encode_size()
                        + creator.encode_size()
                }
                Self::LoopResults { game_id, results } => {
                    game_id.encode_size() + results.encode_size()
                }
                Self::BlackwhiteError {
                    player,
                    game_id,
                    error_code,
                    message,
                } => {
                    player.encode_size()
                        + game_id.encode_size()
                        + error_code.encode_size()
                        + string_encode_size(message)
                }
            }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Output {
    Event(Event),
    Transaction(Transaction),
}

impl Write for Output {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Event(event) => {
                0u8.write(writer);
                event.write(writer);
            }
            Self::Transaction(transaction) => {
                1u8.write(writer);
                transaction.write(writer);
            }
        }
    }
}

impl Read for Output {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Self::Event(Event::read(reader)?)),
            1 => Ok(Self::Transaction(Transaction::read(reader)?)),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Output {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Event(event) => event.encode_size(),
            Self::Transaction(transaction) => transaction.encode_size(),
        }
    }
}
