//! CLI Exit Code Registry
//!
//! Single source of truth for `fieldkit` exit codes. Scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                                   |
//! |---------|------------|-----------------------------------------------|
//! | 0       | Universal  | Success                                       |
//! | 1       | Universal  | General error (unspecified)                   |
//! | 2       | Universal  | CLI usage error (bad args, missing file)      |
//! | 3-9     | jobs       | Config, validation and per-record failures    |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use fieldkit_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - job completed, every record written.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure, e.g. a report that cannot be serialized.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Jobs (3-9)
// =============================================================================

/// Config could not be parsed, failed validation, or names an unknown kind.
pub const EXIT_JOB_INVALID_CONFIG: u8 = 3;

/// Pre-flight validation reported errors; nothing was written.
pub const EXIT_JOB_VALIDATION: u8 = 4;

/// Job finished but one or more records could not be written.
pub const EXIT_JOB_RECORD_FAILURES: u8 = 5;

/// Engine failure while running the job (bad data, unknown record, IO).
pub const EXIT_JOB_RUNTIME: u8 = 6;

/// Map an engine error to its exit code.
pub fn job_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_JOB_INVALID_CONFIG,
        ReconError::AmbiguousField { .. } => EXIT_JOB_VALIDATION,
        _ => EXIT_JOB_RUNTIME,
    }
}
