use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadRangeExt, Write};
use commonware_cryptography::ed25519::PublicKey;

use super::MAX_PLAYER_COUNT;

/// Snapshot of who is still eligible after one elimination round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopResult {
    pub winners: Vec<PublicKey>,
    pub losers: Vec<PublicKey>,
}

impl Write for LoopResult {
    fn write(&self, writer: &mut impl BufMut) {
        self.winners.write(writer);
        self.losers.write(writer);
    }
}

impl Read for LoopResult {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            winners: Vec::<PublicKey>::read_range(reader, 0..=MAX_PLAYER_COUNT as usize)?,
            losers: Vec::<PublicKey>::read_range(reader, 0..=MAX_PLAYER_COUNT as usize)?,
        })
    }
}

impl EncodeSize for LoopResult {
    fn encode_size(&self) -> usize {
        self.winners.encode_size() + self.losers.encode_size()
    }
}
