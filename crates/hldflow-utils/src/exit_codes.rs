//! Exit code constants for the hldflow CLI.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Every stage completed |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `INPUT` | Source document missing or unusable |
//! | 4 | `DEGRADED` | Run finished with non-critical stage failures |
//! | 5 | `ABORTED` | Run stopped after a critical stage failure |
//! | 10 | `RUN_TIMEOUT` | Run deadline expired while a stage was running |

/// Exit codes matching the documented exit code table.
///
/// ```rust
/// use hldflow_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(5), ExitCode::ABORTED);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - every stage completed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - unexpected failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid flags or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Input error - the requirement document cannot be used
    pub const INPUT: ExitCode = ExitCode(3);

    /// Degraded - non-critical stages failed, the run still finished
    pub const DEGRADED: ExitCode = ExitCode(4);

    /// Aborted - a critical stage failed
    pub const ABORTED: ExitCode = ExitCode(5);

    /// Run timeout - the run deadline expired mid-stage
    pub const RUN_TIMEOUT: ExitCode = ExitCode(10);

    /// Create an `ExitCode` from a raw integer value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Get the numeric value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Whether this code signals success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.0
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
