//! Template engine errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    /// A template failed to load, parse or render
    #[error("Template error: {0}")]
    Template(String),

    /// Reading an override directory failed
    #[error("Cannot read template overrides: {0}")]
    Overrides(#[from] std::io::Error),
}
