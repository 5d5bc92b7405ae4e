//! Conditional logging macros that check a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn, log_failure};
//!
//! log_info!("This will log if ENABLE_LOGS is true");
//! log_failure!(FailureKind::Record, "camera did not answer: {err}");
//! ```

/// Failure categories used as the first line of a failure log entry so that
/// operators can grep the recorder output by class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Os,
    Configuration,
    Database,
    Record,
    ImageFile,
    InvalidInput,
    Unexpected,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Os => "OS error",
            FailureKind::Configuration => "Configuration error",
            FailureKind::Database => "Database error",
            FailureKind::Record => "Record error",
            FailureKind::ImageFile => "Image file error",
            FailureKind::InvalidInput => "Invalid user input error",
            FailureKind::Unexpected => "Unexpected error",
        }
    }
}

/// Macro for conditional info logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Macro for conditional warn logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error log entry prefixed with a [`FailureKind`] label.
///
/// Not gated by `ENABLE_LOGS`: failures are always reported.
#[macro_export]
macro_rules! log_failure {
    ($kind:expr, $($arg:tt)*) => {
        log::error!("{}: {}", $crate::utils::logging::FailureKind::label($kind), format_args!($($arg)*))
    };
}
