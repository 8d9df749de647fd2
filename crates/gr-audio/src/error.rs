use thiserror::Error;

/// Errors originating from the audio module.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The container holds no decodable audio track.
    #[error("Aucune piste audio dans {0}")]
    NoTrack(String),

    /// Unsupported audio format.
    #[error("Format audio non supporté : {0}")]
    UnsupportedFormat(String),

    /// Audio decode error.
    #[error("Erreur de décodage : {0}")]
    DecodeError(String),

    /// Sample rate conversion failed.
    #[error("Erreur de rééchantillonnage : {0}")]
    ResampleError(String),
}
