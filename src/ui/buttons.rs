use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "player_pause";
    pub const RESUME: &str = "player_resume";
    pub const STOP: &str = "player_stop";
    pub const SKIP: &str = "player_skip";
}

/// Control attached to the now-playing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    Pause,
    Resume,
    Stop,
    Skip,
}

impl PlayerControl {
    pub const ALL: [PlayerControl; 4] = [
        PlayerControl::Pause,
        PlayerControl::Resume,
        PlayerControl::Stop,
        PlayerControl::Skip,
    ];

    pub fn custom_id(self) -> &'static str {
        match self {
            PlayerControl::Pause => button_ids::PAUSE,
            PlayerControl::Resume => button_ids::RESUME,
            PlayerControl::Stop => button_ids::STOP,
            PlayerControl::Skip => button_ids::SKIP,
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|control| control.custom_id() == id)
    }

    fn emoji(self) -> char {
        match self {
            PlayerControl::Pause => '⏸',
            PlayerControl::Resume => '▶',
            PlayerControl::Stop => '⏹',
            PlayerControl::Skip => '⏭',
        }
    }

    fn style(self) -> ButtonStyle {
        match self {
            PlayerControl::Stop => ButtonStyle::Danger,
            PlayerControl::Resume => ButtonStyle::Success,
            _ => ButtonStyle::Secondary,
        }
    }
}

/// Crea la fila de controles del reproductor
pub fn create_player_buttons() -> CreateActionRow {
    let buttons = PlayerControl::ALL
        .into_iter()
        .map(|control| {
            CreateButton::new(control.custom_id())
                .emoji(control.emoji())
                .style(control.style())
        })
        .collect();

    CreateActionRow::Buttons(buttons)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_ids_round_trip() {
        for control in PlayerControl::ALL {
            assert_eq!(PlayerControl::from_custom_id(control.custom_id()), Some(control));
        }
        assert_eq!(PlayerControl::from_custom_id("player_shuffle"), None);
    }

    #[test]
    fn test_player_row_has_four_buttons() {
        match create_player_buttons() {
            CreateActionRow::Buttons(buttons) => assert_eq!(buttons.len(), 4),
            _ => panic!("expected a button row"),
        }
    }
}
