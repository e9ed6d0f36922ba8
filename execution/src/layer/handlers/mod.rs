use super::*;

fn blackwhite_error(
    player: &PublicKey,
    game_id: Option<Digest>,
    error_code: u8,
    message: impl Into<String>,
) -> Event {
    let mut message = message.into();
    if message.len() > MAX_ERROR_MESSAGE_LENGTH {
        let mut end = MAX_ERROR_MESSAGE_LENGTH;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    Event::BlackwhiteError {
        player: player.clone(),
        game_id,
        error_code,
        message,
    }
}

fn blackwhite_error_vec(
    player: &PublicKey,
    game_id: Option<Digest>,
    error_code: u8,
    message: impl Into<String>,
) -> Vec<Event> {
    vec![blackwhite_error(player, game_id, error_code, message)]
}

mod blackwhite;
