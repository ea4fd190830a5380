//! # Errors
//!
//! Two layers: [`PluginError`] is what the Rust API returns internally,
//! [`PluginResult`] is the plain status code that crosses the C ABI. Every
//! boundary call converts the former into the latter, so no Rust error
//! type (and no panic) ever reaches the host.

use thiserror::Error;

use crate::state_tree::StateTreeError;

/// Status code returned by every host-facing operation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginResult {
    Success,
    FailedToSetState,
    ParameterDoesntExist,
    ParameterTypeDoesntMatch,
    FailedToProcess,
    FailedToReturnState,
    /// A C entry point was handed a null plugin handle.
    InvalidHandle,
}

impl PluginResult {
    pub fn is_success(self) -> bool {
        self == PluginResult::Success
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("no parameter with raw key {0}")]
    ParameterDoesntExist(u32),

    #[error("parameter {parameter} cannot hold the value {value}")]
    ParameterTypeDoesntMatch { parameter: &'static str, value: f32 },

    #[error("state snapshot has version {found}, expected {expected}")]
    StateVersionMismatch { found: u32, expected: u32 },

    #[error("state field {0} is not a finite number")]
    NonFiniteStateField(&'static str),

    #[error("unsupported channel count {0}, expected 1 or 2")]
    UnsupportedChannelCount(usize),

    #[error("buffer for channel {channel} holds {len} samples, block needs {needed}")]
    BufferTooShort {
        channel: usize,
        len: usize,
        needed: usize,
    },

    #[error("another thread is already processing this instance")]
    ProcessBusy,

    #[error("engine was not prepared")]
    NotPrepared,

    #[error(transparent)]
    StateTree(#[from] StateTreeError),
}

impl From<&PluginError> for PluginResult {
    fn from(err: &PluginError) -> Self {
        match err {
            PluginError::ParameterDoesntExist(_) => PluginResult::ParameterDoesntExist,
            PluginError::ParameterTypeDoesntMatch { .. } => PluginResult::ParameterTypeDoesntMatch,
            PluginError::StateVersionMismatch { .. } | PluginError::NonFiniteStateField(_) => {
                PluginResult::FailedToSetState
            }
            PluginError::UnsupportedChannelCount(_)
            | PluginError::BufferTooShort { .. }
            | PluginError::ProcessBusy
            | PluginError::NotPrepared => PluginResult::FailedToProcess,
            PluginError::StateTree(_) => PluginResult::FailedToReturnState,
        }
    }
}

impl<T> From<Result<T, PluginError>> for PluginResult {
    fn from(result: Result<T, PluginError>) -> Self {
        match result {
            Ok(_) => PluginResult::Success,
            Err(err) => PluginResult::from(&err),
        }
    }
}
