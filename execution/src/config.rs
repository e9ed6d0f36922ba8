use blackwhite_types::blackwhite::{contract_id, GameLimits, BLACKWHITE_CONTRACT};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};

/// Execution parameters fixed for the lifetime of a [`crate::Layer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameConfig {
    /// Holding account for losers' escrow before it is split among winners.
    pub pool: PublicKey,
    /// Contract namespace of every execution account the game touches.
    pub contract: Digest,
    pub limits: GameLimits,
}

impl GameConfig {
    pub fn new(pool: PublicKey, limits: GameLimits) -> Self {
        Self {
            pool,
            contract: contract_id(BLACKWHITE_CONTRACT),
            limits,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        self.limits.validate()
    }
}

/// Block-level inputs. Execution never reads the wall clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockContext {
    pub height: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl BlockContext {
    pub fn new(height: u64, timestamp: u64) -> Self {
        Self { height, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_account_keypair;

    #[test]
    fn test_config_from_operator_json() {
        let limits: GameLimits =
            serde_json::from_str(r#"{"max_amount": 500000000, "creation_deposit": 1000}"#)
                .unwrap();
        let (_, pool) = create_account_keypair(0);
        let config = GameConfig::new(pool, limits);
        config.validate().unwrap();
        assert_eq!(config.contract, contract_id(BLACKWHITE_CONTRACT));
        assert_eq!(config.limits.max_amount, 500_000_000);
        assert_eq!(config.limits.min_amount, GameLimits::default().min_amount);
    }

    #[test]
    fn test_config_rejects_inverted_limits() {
        let limits: GameLimits =
            serde_json::from_str(r#"{"min_play_timeout": 600, "max_play_timeout": 60}"#).unwrap();
        let (_, pool) = create_account_keypair(0);
        assert!(GameConfig::new(pool, limits).validate().is_err());
    }
}
