use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::{now_playing::PlayerView, session::PlaybackState};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "radio_play_pause";
    pub const SKIP: &str = "radio_skip";
    pub const STOP: &str = "radio_stop";
    pub const REWIND: &str = "radio_rewind";
    pub const SHUFFLE: &str = "radio_shuffle";
    pub const RADIO: &str = "radio_toggle";
}

/// What a player button asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    PlayPause,
    Skip,
    Stop,
    Rewind,
    Shuffle,
    ToggleRadio,
}

impl PlayerAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PLAY_PAUSE => Some(Self::PlayPause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            button_ids::REWIND => Some(Self::Rewind),
            button_ids::SHUFFLE => Some(Self::Shuffle),
            button_ids::RADIO => Some(Self::ToggleRadio),
            _ => None,
        }
    }
}

/// Controles del mensaje del reproductor. Idle players only keep the radio
/// toggle and rewind.
pub fn create_player_buttons(view: &PlayerView) -> Vec<CreateActionRow> {
    let idle = view.is_idle();
    let paused = view.state == PlaybackState::Paused;

    let play_pause_btn = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(if paused { '▶' } else { '⏸' })
        .style(if paused { ButtonStyle::Success } else { ButtonStyle::Secondary })
        .disabled(idle);

    let rewind_btn = CreateButton::new(button_ids::REWIND)
        .emoji('⏮')
        .style(ButtonStyle::Secondary)
        .disabled(view.previous.is_none());

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Primary)
        .disabled(idle);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger)
        .disabled(idle);

    let shuffle_btn = CreateButton::new(button_ids::SHUFFLE)
        .emoji('🔀')
        .style(ButtonStyle::Secondary)
        .disabled(view.queue_len < 2);

    let radio_btn = CreateButton::new(button_ids::RADIO)
        .label(if view.radio_enabled { "Radio ON" } else { "Radio OFF" })
        .emoji('📻')
        .style(if view.radio_enabled {
            ButtonStyle::Success
        } else {
            ButtonStyle::Secondary
        });

    vec![
        CreateActionRow::Buttons(vec![rewind_btn, play_pause_btn, skip_btn, stop_btn, shuffle_btn]),
        CreateActionRow::Buttons(vec![radio_btn]),
    ]
}
