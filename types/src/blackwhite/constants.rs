/// Base units per coin.
pub const COIN: u64 = 100_000_000;

/// Contract name used to derive the blackwhite contract identifier.
pub const BLACKWHITE_CONTRACT: &[u8] = b"blackwhite";

/// Minimum and maximum stake per play.
pub const MIN_AMOUNT: u64 = COIN;
pub const MAX_AMOUNT: u64 = 20 * COIN;

/// Bounds on the target number of players in a round.
pub const MIN_PLAYER_COUNT: u32 = 3;
pub const MAX_PLAYER_COUNT: u32 = 100_000;

/// Deposit frozen from the creator until the round terminates.
pub const CREATION_DEPOSIT: u64 = COIN / 100;

/// Play-phase timeout bounds, in seconds after creation.
pub const MIN_PLAY_TIMEOUT_SECS: u64 = 10 * 60;
pub const MAX_PLAY_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Reveal window opened once the last player joins, in seconds.
pub const SHOW_TIMEOUT_SECS: u64 = 5 * 60;

/// Upper bound on elimination rounds (`loop_count(MAX_PLAYER_COUNT)`).
pub const MAX_LOOP: usize = 18;

/// Maximum revealed secret length in bytes.
pub const MAX_SECRET_LENGTH: usize = 256;

/// Maximum error message length carried in events.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 256;

/// Error codes carried by `Event::BlackwhiteError`.
pub const ERROR_INVALID_PARAMETER: u8 = 1;
pub const ERROR_INVALID_STATE: u8 = 2;
pub const ERROR_ROUND_NOT_FOUND: u8 = 3;
pub const ERROR_DUPLICATE_PARTICIPANT: u8 = 4;
pub const ERROR_PARTICIPANT_NOT_FOUND: u8 = 5;
pub const ERROR_ALREADY_REVEALED: u8 = 6;
pub const ERROR_TIMEOUT_NOT_REACHED: u8 = 7;
pub const ERROR_INSUFFICIENT_FUNDS: u8 = 8;
pub const ERROR_NOT_FROZEN: u8 = 9;
pub const ERROR_LEDGER: u8 = 10;
