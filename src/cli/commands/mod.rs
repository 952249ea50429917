//! CLI command implementations

pub mod init;
pub mod run;
pub mod validate;

use crate::domain::DeidError;

/// Exit code for a library error: 2 for configuration problems, 5 otherwise
pub(crate) fn exit_code_for(err: &DeidError) -> i32 {
    match err {
        DeidError::Configuration(_) => 2,
        _ => 5,
    }
}
