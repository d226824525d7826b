use serde::Serialize;

/// Public playback state of a session.
///
/// `Idle` behaves like `Paused` but marks a session that was never started or
/// was reset back to time zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Command applied to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    Toggle,
    Reset,
    /// Natural end of the scene reached by the scheduler.
    Finish,
}

impl TransportState {
    pub fn is_playing(self) -> bool {
        self == TransportState::Playing
    }

    /// Resolves `command` against the current state. `None` means the command
    /// is a no-op here.
    pub fn next(self, command: TransportCommand) -> Option<TransportState> {
        use TransportCommand::*;
        use TransportState::*;

        match (self, command) {
            (Playing, Play) => None,
            (_, Play) => Some(Playing),
            (Playing, Pause) => Some(Paused),
            (_, Pause) => None,
            (Playing, Toggle) => Some(Paused),
            (_, Toggle) => Some(Playing),
            (_, Reset) | (Playing, Finish) => Some(Idle),
            (_, Finish) => None,
        }
    }
}
