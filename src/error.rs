//! Errors surfaced at the setup boundary

use thiserror::Error;

use crate::grammar::GrammarError;
use crate::host::HostError;
use crate::regex_engine::EngineInitError;
use crate::theme::ThemeError;

/// Everything that can go wrong while wiring a language or theme into a host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("regex engine unavailable: {0}")]
    EngineInit(#[from] EngineInitError),

    #[error(transparent)]
    Grammar(GrammarError),

    #[error(transparent)]
    Theme(#[from] ThemeError),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<GrammarError> for SetupError {
    fn from(e: GrammarError) -> Self {
        match e {
            GrammarError::Engine(engine) => SetupError::EngineInit(engine),
            other => SetupError::Grammar(other),
        }
    }
}
