use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A settings patch would leave the settings invalid. Nothing was applied.
    #[error("Settings patch is invalid: {0}")]
    SettingsPatchInvalid(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
