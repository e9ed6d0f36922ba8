use serde::{Deserialize, Serialize};

use super::{
    CREATION_DEPOSIT, MAX_AMOUNT, MAX_PLAYER_COUNT, MAX_PLAY_TIMEOUT_SECS, MIN_AMOUNT,
    MIN_PLAYER_COUNT, MIN_PLAY_TIMEOUT_SECS, SHOW_TIMEOUT_SECS,
};

/// Wager, player-count and timeout bounds enforced when a round is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameLimits {
    pub min_amount: u64,
    pub max_amount: u64,
    pub min_player_count: u32,
    pub max_player_count: u32,
    pub creation_deposit: u64,
    /// Seconds.
    pub min_play_timeout: u64,
    /// Seconds.
    pub max_play_timeout: u64,
    /// Seconds granted for reveals once the last player joins.
    pub show_timeout: u64,
}

impl Default for GameLimits {
    fn default() -> Self {
        Self {
            min_amount: MIN_AMOUNT,
            max_amount: MAX_AMOUNT,
            min_player_count: MIN_PLAYER_COUNT,
            max_player_count: MAX_PLAYER_COUNT,
            creation_deposit: CREATION_DEPOSIT,
            min_play_timeout: MIN_PLAY_TIMEOUT_SECS,
            max_play_timeout: MAX_PLAY_TIMEOUT_SECS,
            show_timeout: SHOW_TIMEOUT_SECS,
        }
    }
}

impl GameLimits {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_amount == 0 {
            return Err("min_amount must be greater than zero");
        }
        if self.min_amount > self.max_amount {
            return Err("min_amount exceeds max_amount");
        }
        if self.min_player_count < 2 {
            return Err("min_player_count must be at least 2");
        }
        if self.min_player_count > self.max_player_count {
            return Err("min_player_count exceeds max_player_count");
        }
        if self.max_player_count > MAX_PLAYER_COUNT {
            return Err("max_player_count exceeds the encodable maximum");
        }
        if self.creation_deposit == 0 {
            return Err("creation_deposit must be greater than zero");
        }
        if self.min_play_timeout > self.max_play_timeout {
            return Err("min_play_timeout exceeds max_play_timeout");
        }
        if self.show_timeout == 0 {
            return Err("show_timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn amount_in_range(&self, amount: u64) -> bool {
        (self.min_amount..=self.max_amount).contains(&amount)
    }

    pub fn player_count_in_range(&self, player_count: u32) -> bool {
        (self.min_player_count..=self.max_player_count).contains(&player_count)
    }

    pub fn timeout_in_range(&self, timeout: u64) -> bool {
        (self.min_play_timeout..=self.max_play_timeout).contains(&timeout)
    }
}
