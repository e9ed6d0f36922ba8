//! Blackwhite domain types.
//!
//! Round and participant state, the per-round elimination trace, limits and constants used by
//! the execution layer and clients.

mod codec;
mod constants;
mod limits;
mod round;
mod trace;

pub use codec::{read_string, string_encode_size, write_string};
pub use constants::*;
pub use limits::*;
pub use round::*;
pub use trace::*;

use commonware_cryptography::{
    sha256::{Digest, Sha256},
    Hasher,
};

/// Identifier of a contract's execution account namespace.
pub fn contract_id(name: &[u8]) -> Digest {
    Sha256::hash(name)
}
