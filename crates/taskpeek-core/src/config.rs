//! Inspector configuration.
//!
//! Plain data with defaults. The CLI fills it from flags and `TASKPEEK_*` environment
//! variables; library users build it directly.

use std::time::Duration;

use taskpeek_protocol::LineFramer;

use crate::error::{PeekError, PeekResult};

/// Settings for the launcher, the request channel, and the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorConfig
{
    /// `argv[0]` handed to the target. No other arguments are passed.
    pub argv0: String,
    /// How long one channel poll may block before the loop checks for shutdown.
    pub poll_interval: Duration,
    /// Longest request line accepted from the target, in bytes.
    pub max_message_len: usize,
    /// Upper bound on a single memory read, in bytes.
    pub max_read_size: usize,
    /// How long to wait for the target to be reaped after it closes the channel.
    pub exit_grace: Duration,
}

impl InspectorConfig
{
    pub const DEFAULT_ARGV0: &'static str = "tracee-program";
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
    pub const DEFAULT_MAX_READ_SIZE: usize = 4096;
    pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(1);

    /// Reject settings the loop cannot run with.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for an empty or NUL-containing `argv0`, a zero poll interval,
    /// or zero size limits.
    pub fn validate(&self) -> PeekResult<()>
    {
        if self.argv0.is_empty() || self.argv0.contains('\0') {
            return Err(PeekError::InvalidArgument(format!("invalid argv[0] {:?}", self.argv0)));
        }
        if self.poll_interval.is_zero() {
            return Err(PeekError::InvalidArgument("poll interval must be non-zero".to_string()));
        }
        if self.max_message_len == 0 {
            return Err(PeekError::InvalidArgument("max message length must be non-zero".to_string()));
        }
        if self.max_read_size == 0 {
            return Err(PeekError::InvalidArgument("max read size must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for InspectorConfig
{
    fn default() -> Self
    {
        Self {
            argv0: Self::DEFAULT_ARGV0.to_string(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_message_len: LineFramer::DEFAULT_MAX_LEN,
            max_read_size: Self::DEFAULT_MAX_READ_SIZE,
            exit_grace: Self::DEFAULT_EXIT_GRACE,
        }
    }
}
