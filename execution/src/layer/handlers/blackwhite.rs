use super::super::*;
use super::blackwhite_error_vec;

impl<'a, S: State> Layer<'a, S> {
    /// Turns an engine result into emitted events. Rejected actions become a single error event;
    /// fatal errors abort the block.
    fn blackwhite_outcome(
        public: &PublicKey,
        game_id: Digest,
        outcome: Result<Journal, GameError>,
    ) -> Result<Vec<Event>> {
        match outcome {
            Ok(journal) => Ok(journal.events),
            Err(err) if err.is_fatal() => {
                Err(anyhow::Error::new(err)).context("blackwhite execution failed")
            }
            Err(err) => {
                warn!(player = ?public, ?game_id, code = err.code(), error = %err, "action rejected");
                Ok(blackwhite_error_vec(
                    public,
                    Some(game_id),
                    err.code(),
                    err.to_string(),
                ))
            }
        }
    }

    pub(in crate::layer) async fn handle_blackwhite_create(
        &mut self,
        public: &PublicKey,
        game_id: Digest,
        play_amount: u64,
        player_count: u32,
        timeout: u64,
    ) -> Result<Vec<Event>> {
        let engine = Blackwhite::new(self.config, self.block);
        let outcome = engine
            .create(self, public, game_id, play_amount, player_count, timeout)
            .await;
        Self::blackwhite_outcome(public, game_id, outcome)
    }

    pub(in crate::layer) async fn handle_blackwhite_play(
        &mut self,
        public: &PublicKey,
        game_id: Digest,
        amount: u64,
        commitments: &[Digest],
    ) -> Result<Vec<Event>> {
        let engine = Blackwhite::new(self.config, self.block);
        let outcome = engine
            .play(self, public, game_id, amount, commitments.to_vec())
            .await;
        Self::blackwhite_outcome(public, game_id, outcome)
    }

    pub(in crate::layer) async fn handle_blackwhite_show(
        &mut self,
        public: &PublicKey,
        game_id: Digest,
        secret: &[u8],
    ) -> Result<Vec<Event>> {
        let engine = Blackwhite::new(self.config, self.block);
        let outcome = engine.show(self, public, game_id, secret.to_vec()).await;
        Self::blackwhite_outcome(public, game_id, outcome)
    }

    pub(in crate::layer) async fn handle_blackwhite_timeout_done(
        &mut self,
        public: &PublicKey,
        game_id: Digest,
    ) -> Result<Vec<Event>> {
        let engine = Blackwhite::new(self.config, self.block);
        let outcome = engine.timeout_done(self, game_id).await;
        Self::blackwhite_outcome(public, game_id, outcome)
    }
}
