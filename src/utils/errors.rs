use thiserror::Error;

use crate::player::PlayerBackend;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("{0} backend is not available in this build")]
    BackendUnavailable(PlayerBackend),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Invalid media location: {0}")]
    InvalidLocation(String),

    #[error("Player controller disconnected")]
    ControllerDisconnected,

    #[error("Player controller dropped the request")]
    NoResponse,
}
