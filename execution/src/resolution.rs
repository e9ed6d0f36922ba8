//! Winner resolution by repeated minority elimination.
//!
//! Every participant commits to one color per elimination round as `sha256(secret || color)`.
//! After reveal, each round counts the still-eligible whites and blacks and eliminates the
//! strictly smaller non-empty side. Resolution stops early once one or two participants remain.
//!
//! The function is pure: identical participants always yield identical winners and trace.

use blackwhite_types::blackwhite::{LoopResult, Participant};
use commonware_cryptography::{
    ed25519::PublicKey,
    sha256::{Digest, Sha256},
    Hasher,
};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    White = 0,
    Black = 1,
}

/// Commitment to `color` under `secret`.
pub fn commitment(secret: &[u8], color: Color) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(&[color as u8]);
    hasher.finalize()
}

/// Color `secret` opens `commitment` to, if any.
pub fn classify(secret: &[u8], commitment_hash: &Digest) -> Option<Color> {
    [Color::White, Color::Black]
        .into_iter()
        .find(|color| &commitment(secret, *color) == commitment_hash)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Remaining eligible participants with their escrow, in join order.
    pub winners: Vec<(PublicKey, u64)>,
    /// Every other participant with their escrow, in join order.
    pub losers: Vec<(PublicKey, u64)>,
    /// One snapshot per elimination round actually played.
    pub trace: Vec<LoopResult>,
}

struct Contender {
    index: usize,
    /// Per-round color; `None` where the commitment fails to open under the revealed secret.
    colors: Vec<Option<Color>>,
    eligible: bool,
}

impl Contender {
    fn forged(&self) -> bool {
        self.colors.iter().any(Option::is_none)
    }
}

pub fn resolve(participants: &[Participant], loop_count: u32) -> Resolution {
    let rounds = loop_count as usize;

    // Only revealed participants with a full commitment vector take part.
    let mut contenders: Vec<Contender> = participants
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_revealed() && p.commitments.len() == rounds)
        .map(|(index, p)| Contender {
            index,
            colors: p
                .commitments
                .iter()
                .map(|c| classify(&p.secret, c))
                .collect(),
            eligible: true,
        })
        .collect();

    let mut trace = Vec::new();
    for round in 0..rounds {
        // A commitment that opens to neither color eliminates its owner in that round.
        for contender in contenders.iter_mut().filter(|c| c.eligible) {
            if contender.colors[round].is_none() {
                contender.eligible = false;
            }
        }

        let mut whites = 0usize;
        let mut blacks = 0usize;
        for contender in contenders.iter().filter(|c| c.eligible) {
            match contender.colors[round] {
                Some(Color::White) => whites += 1,
                Some(Color::Black) => blacks += 1,
                None => {}
            }
        }

        let minority = if whites > 0 && blacks > 0 && whites != blacks {
            Some(if whites < blacks {
                Color::White
            } else {
                Color::Black
            })
        } else {
            None
        };
        if let Some(minority) = minority {
            for contender in contenders.iter_mut().filter(|c| c.eligible) {
                if contender.colors[round] == Some(minority) {
                    contender.eligible = false;
                }
            }
        }

        let mut snapshot = LoopResult::default();
        for contender in &contenders {
            let address = participants[contender.index].address.clone();
            if contender.eligible {
                snapshot.winners.push(address);
            } else {
                snapshot.losers.push(address);
            }
        }
        trace.push(snapshot);

        let remaining = contenders.iter().filter(|c| c.eligible).count();
        if remaining == 1 || remaining == 2 {
            break;
        }
    }

    // Rounds may stop before a forged commitment is reached; its owner still never wins.
    for contender in contenders.iter_mut().filter(|c| c.eligible) {
        if contender.forged() {
            contender.eligible = false;
        }
    }

    let mut resolution = Resolution {
        trace,
        ..Resolution::default()
    };
    let mut won = vec![false; participants.len()];
    for contender in contenders.iter().filter(|c| c.eligible) {
        won[contender.index] = true;
    }
    for (participant, won) in participants.iter().zip(won) {
        let entry = (participant.address.clone(), participant.amount);
        if won {
            resolution.winners.push(entry);
        } else {
            resolution.losers.push(entry);
        }
    }
    resolution
}
