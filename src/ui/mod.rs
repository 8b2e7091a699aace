pub mod buttons;
pub mod embeds;
pub mod player_message;
