//! Where servicing results go.
//!
//! The control loop hands every serviced request to a [`ReportSink`]. The default
//! [`LogSink`] writes through `tracing`; [`ChannelSink`] forwards events over an
//! `mpsc` channel for callers (and tests) that want to consume them.

use std::sync::mpsc;

use taskpeek_protocol::{MemoryRequest, SkipReason};
use tracing::{debug, info, warn};

use crate::memory::format_hexdump;
use crate::types::Address;

/// One reported servicing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent
{
    /// The request was read successfully.
    Read
    {
        request: MemoryRequest,
        bytes: Vec<u8>,
    },
    /// Attach or read failed; the loop carries on.
    Failed
    {
        request: MemoryRequest,
        error: String,
    },
    /// The request decoded to a no-op.
    Skipped
    {
        request: MemoryRequest,
        reason: SkipReason,
    },
}

impl ReportEvent
{
    /// Human-readable one-line description.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::Read { request, bytes } => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                format!("{request}: {}", hex.join(" "))
            }
            Self::Failed { request, error } => format!("{request}: {error}"),
            Self::Skipped { request, reason } => format!("skipped 0x{:x}: {reason}", request.address()),
        }
    }
}

/// Consumer of servicing results.
pub trait ReportSink
{
    fn report(&mut self, event: ReportEvent);
}

/// Reports through `tracing`: reads at `info`, failures at `warn`, skips at `debug`.
#[derive(Debug, Clone)]
pub struct LogSink
{
    hexdump_width: usize,
}

impl LogSink
{
    pub fn new() -> Self
    {
        Self { hexdump_width: 16 }
    }

    pub fn with_hexdump_width(mut self, width: usize) -> Self
    {
        self.hexdump_width = width;
        self
    }
}

impl Default for LogSink
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl ReportSink for LogSink
{
    fn report(&mut self, event: ReportEvent)
    {
        match &event {
            ReportEvent::Read { request, bytes } if bytes.len() > self.hexdump_width => {
                info!(
                    "{}\n{}",
                    request,
                    format_hexdump(Address::new(request.address()), bytes, self.hexdump_width)
                );
            }
            ReportEvent::Read { .. } => info!("{}", event.describe()),
            ReportEvent::Failed { .. } => warn!("{}", event.describe()),
            ReportEvent::Skipped { .. } => debug!("{}", event.describe()),
        }
    }
}

/// Forwards events over an `mpsc` channel. Send errors (receiver gone) are ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink
{
    sender: mpsc::Sender<ReportEvent>,
}

impl ChannelSink
{
    pub fn new() -> (Self, mpsc::Receiver<ReportEvent>)
    {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl ReportSink for ChannelSink
{
    fn report(&mut self, event: ReportEvent)
    {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn describes_reads_as_hex()
    {
        let event = ReportEvent::Read {
            request: MemoryRequest::new(0x1000, 2),
            bytes: vec![0x7f, 0x45],
        };
        assert!(event.describe().ends_with(": 7f 45"));
    }

    #[test]
    fn channel_sink_forwards()
    {
        let (mut sink, events) = ChannelSink::new();
        let event = ReportEvent::Skipped {
            request: MemoryRequest::NONE,
            reason: SkipReason::NullAddress,
        };
        sink.report(event.clone());
        assert_eq!(events.try_recv().unwrap(), event);
    }
}
