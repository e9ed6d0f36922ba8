use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};
use thiserror::Error as ThisError;

use super::{MAX_LOOP, MAX_PLAYER_COUNT, MAX_SECRET_LENGTH};

/// Number of elimination rounds for a target player count:
/// `ceil(log2(player_count)) + 1`.
pub fn loop_count(player_count: u32) -> u32 {
    if player_count <= 1 {
        return 1;
    }
    player_count
        .checked_next_power_of_two()
        .map_or(u32::BITS, |p| p.trailing_zeros())
        + 1
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoundStatus {
    Created = 0,
    Collecting = 1,
    Revealing = 2,
    Done = 3,
    TimedOut = 4,
}

impl RoundStatus {
    /// Rounds in a terminal status are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Done | RoundStatus::TimedOut)
    }
}

impl TryFrom<u8> for RoundStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoundStatus::Created),
            1 => Ok(RoundStatus::Collecting),
            2 => Ok(RoundStatus::Revealing),
            3 => Ok(RoundStatus::Done),
            4 => Ok(RoundStatus::TimedOut),
            _ => Err(()),
        }
    }
}

impl Write for RoundStatus {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for RoundStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        RoundStatus::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for RoundStatus {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// A player's stake and commitments within a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub address: PublicKey,
    pub amount: u64,
    /// One commitment per elimination round: `hash(secret || color)`.
    pub commitments: Vec<Digest>,
    /// Empty until the participant reveals.
    pub secret: Vec<u8>,
}

impl Participant {
    pub fn new(address: PublicKey, amount: u64, commitments: Vec<Digest>) -> Self {
        Self {
            address,
            amount,
            commitments,
            secret: Vec::new(),
        }
    }

    pub fn is_revealed(&self) -> bool {
        !self.secret.is_empty()
    }
}

impl Write for Participant {
    fn write(&self, writer: &mut impl BufMut) {
        self.address.write(writer);
        self.amount.write(writer);
        self.commitments.write(writer);
        self.secret.write(writer);
    }
}

impl Read for Participant {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            address: PublicKey::read(reader)?,
            amount: u64::read(reader)?,
            commitments: Vec::<Digest>::read_range(reader, 0..=MAX_LOOP)?,
            secret: Vec::<u8>::read_range(reader, 0..=MAX_SECRET_LENGTH)?,
        })
    }
}

impl EncodeSize for Participant {
    fn encode_size(&self) -> usize {
        self.address.encode_size()
            + self.amount.encode_size()
            + self.commitments.encode_size()
            + self.secret.encode_size()
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum RoundInvariantError {
    #[error("participant count mismatch (counter={counter}, participants={participants})")]
    CountMismatch { counter: u32, participants: usize },
    #[error("duplicate participant address")]
    DuplicateParticipant,
    #[error("commitment count mismatch (got={got}, loop={expected})")]
    CommitmentCount { got: usize, expected: u32 },
    #[error("status {status:?} inconsistent with {players}/{target} players")]
    StatusCount {
        status: RoundStatus,
        players: u32,
        target: u32,
    },
    #[error("reveal count mismatch (counter={counter}, revealed={revealed})")]
    RevealMismatch { counter: u32, revealed: usize },
}

/// Persisted state of one commit-reveal wagering round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Round {
    pub game_id: Digest,
    pub creator: PublicKey,
    pub play_amount: u64,
    pub player_count: u32,
    pub cur_player_count: u32,
    pub loop_count: u32,
    /// Play-phase timeout in seconds, measured from `create_time`.
    pub timeout: u64,
    pub create_time: u64,
    /// Set when the round enters `Revealing`.
    pub show_deadline: Option<u64>,
    pub cur_show_count: u32,
    pub status: RoundStatus,
    pub participants: Vec<Participant>,
    pub winners: Vec<PublicKey>,
}

impl Round {
    pub fn new(
        game_id: Digest,
        creator: PublicKey,
        play_amount: u64,
        player_count: u32,
        timeout: u64,
        create_time: u64,
    ) -> Self {
        Self {
            game_id,
            creator,
            play_amount,
            player_count,
            cur_player_count: 0,
            loop_count: loop_count(player_count),
            timeout,
            create_time,
            show_deadline: None,
            cur_show_count: 0,
            status: RoundStatus::Created,
            participants: Vec::new(),
            winners: Vec::new(),
        }
    }

    pub fn play_deadline(&self) -> u64 {
        self.create_time.saturating_add(self.timeout)
    }

    pub fn participant_index(&self, address: &PublicKey) -> Option<usize> {
        self.participants.iter().position(|p| &p.address == address)
    }

    pub fn participant(&self, address: &PublicKey) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.address == address)
    }

    /// Sum of all escrowed stakes.
    pub fn escrow_total(&self) -> u64 {
        self.participants
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.amount))
    }

    pub fn validate_invariants(&self) -> Result<(), RoundInvariantError> {
        if self.cur_player_count as usize != self.participants.len() {
            return Err(RoundInvariantError::CountMismatch {
                counter: self.cur_player_count,
                participants: self.participants.len(),
            });
        }
        for (i, participant) in self.participants.iter().enumerate() {
            if self.participants[..i]
                .iter()
                .any(|other| other.address == participant.address)
            {
                return Err(RoundInvariantError::DuplicateParticipant);
            }
            if participant.commitments.len() != self.loop_count as usize {
                return Err(RoundInvariantError::CommitmentCount {
                    got: participant.commitments.len(),
                    expected: self.loop_count,
                });
            }
        }
        let status_ok = match self.status {
            RoundStatus::Created => self.cur_player_count == 0,
            RoundStatus::Collecting => self.cur_player_count < self.player_count,
            RoundStatus::Revealing | RoundStatus::Done => {
                self.cur_player_count == self.player_count
            }
            RoundStatus::TimedOut => self.cur_player_count < self.player_count,
        };
        if !status_ok {
            return Err(RoundInvariantError::StatusCount {
                status: self.status,
                players: self.cur_player_count,
                target: self.player_count,
            });
        }
        let revealed = self.participants.iter().filter(|p| p.is_revealed()).count();
        if self.cur_show_count as usize != revealed {
            return Err(RoundInvariantError::RevealMismatch {
                counter: self.cur_show_count,
                revealed,
            });
        }
        Ok(())
    }
}

impl Write for Round {
    fn write(&self, writer: &mut impl BufMut) {
        self.game_id.write(writer);
        self.creator.write(writer);
        self.play_amount.write(writer);
        self.player_count.write(writer);
        self.cur_player_count.write(writer);
        self.loop_count.write(writer);
        self.timeout.write(writer);
        self.create_time.write(writer);
        self.show_deadline.write(writer);
        self.cur_show_count.write(writer);
        self.status.write(writer);
        self.participants.write(writer);
        self.winners.write(writer);
    }
}

impl Read for Round {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let game_id = Digest::read(reader)?;
        let creator = PublicKey::read(reader)?;
        let play_amount = u64::read(reader)?;
        let player_count = u32::read(reader)?;
        let cur_player_count = u32::read(reader)?;
        let loop_count = u32::read(reader)?;
        if loop_count as usize > MAX_LOOP {
            return Err(Error::Invalid("Round", "loop count too large"));
        }
        let timeout = u64::read(reader)?;
        let create_time = u64::read(reader)?;
        let show_deadline = Option::<u64>::read(reader)?;
        let cur_show_count = u32::read(reader)?;
        let status = RoundStatus::read(reader)?;
        let participants =
            Vec::<Participant>::read_range(reader, 0..=MAX_PLAYER_COUNT as usize)?;
        let winners = Vec::<PublicKey>::read_range(reader, 0..=MAX_PLAYER_COUNT as usize)?;

        Ok(Self {
            game_id,
            creator,
            play_amount,
            player_count,
            cur_player_count,
            loop_count,
            timeout,
            create_time,
            show_deadline,
            cur_show_count,
            status,
            participants,
            winners,
        })
    }
}

impl EncodeSize for Round {
    fn encode_size(&self) -> usize {
        self.game_id.encode_size()
            + self.creator.encode_size()
            + self.play_amount.encode_size()
            + self.player_count.encode_size()
            + self.cur_player_count.encode_size()
            + self.loop_count.encode_size()
            + self.timeout.encode_size()
            + self.create_time.encode_size()
            + self.show_deadline.encode_size()
            + self.cur_show_count.encode_size()
            + self.status.encode_size()
            + self.participants.encode_size()
            + self.winners.encode_size()
    }
}
