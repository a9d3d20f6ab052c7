//! Unified error types for the beacon core library.
//!
//! [`BeaconError`] covers every failure the engine reports to a caller.
//! Registration problems are rejected at the boundary; races on the event
//! path (a batch for a removed region, a timer firing after a stop) are not
//! errors at all and never surface here.
//!
//! # Example
//!
//! ```rust
//! use beacon_core::error::{BeaconError, Result};
//!
//! fn require_label(label: &str) -> Result<()> {
//!     if label.is_empty() {
//!         return Err(BeaconError::ConfigValidationError("label is empty".into()));
//!     }
//!     Ok(())
//! }
//! # assert!(require_label("").is_err());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all beacon operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // REGISTRATION ERRORS
    // =========================================================================
    /// The region identifier is not a well-formed 128-bit UUID.
    #[error(
        "Could not monitor region '{label}' because '{uuid}' is not a valid UUID \
         (expected form 'E2C56DB5-DFFB-48D2-B060-D0F5A71096E0')."
    )]
    InvalidIdentifier {
        /// The rejected identifier text.
        uuid: String,
        /// Label of the region that was being registered.
        label: String,
    },

    /// A region with the same identifier is already being monitored.
    #[error("Already monitoring a region with UUID {uuid} (identifier '{label}')")]
    DuplicateRegion {
        /// Identifier of the region that is already registered.
        uuid: String,
        /// Label of the region that was being registered.
        label: String,
    },

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beacon operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Builds an [`BeaconError::InvalidIdentifier`] for the given inputs.
    #[must_use]
    pub fn invalid_identifier(uuid: impl Into<String>, label: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            uuid: uuid.into(),
            label: label.into(),
        }
    }

    /// Returns `true` if this error was raised while registering a region.
    #[inline]
    #[must_use]
    pub const fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. } | Self::DuplicateRegion { .. }
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns a machine-readable error code, stable across releases.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            Self::DuplicateRegion { .. } => "DUPLICATE_REGION",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM LIBRARY ERRORS
// =============================================================================

impl From<toml::de::Error> for BeaconError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for BeaconError {
    fn from(err: toml::ser::Error) -> Self {
        Self::ConfigParseError(err.to_string())
    }
}

impl From<config::ConfigError> for BeaconError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigParseError(err.to_string())
    }
}

impl From<serde_json::Error> for BeaconError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
