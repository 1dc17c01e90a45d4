//! # Request Channel
//!
//! Read side of the pipe that carries the target's stdout to the inspector.
//!
//! The channel owns the read end outright; there is no process-wide descriptor state.
//! Reads go through `poll()` so a silent target cannot pin the control loop forever,
//! and the raw byte stream is cut into request lines by a [`LineFramer`].

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;

use taskpeek_protocol::LineFramer;
use tracing::trace;

use crate::error::{PeekError, PeekResult};

const READ_CHUNK: usize = 512;

/// Result of one timed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent
{
    /// One complete request line, terminator stripped.
    Message(String),
    /// The timeout elapsed without a complete line.
    Idle,
    /// The writer closed its end and every buffered line has been delivered.
    Closed,
}

/// Inspector-side endpoint of the request channel.
#[derive(Debug)]
pub struct RequestChannel
{
    reader: File,
    framer: LineFramer,
    eof: bool,
}

impl RequestChannel
{
    /// Wrap the read end of a pipe.
    pub fn new(read_end: OwnedFd, max_message_len: usize) -> Self
    {
        Self {
            reader: File::from(read_end),
            framer: LineFramer::new(max_message_len),
            eof: false,
        }
    }

    /// Wait up to `timeout` for the next request line.
    ///
    /// A chunk that completes no line re-arms the wait, so a target that dribbles a
    /// partial line can stretch one call past `timeout`.
    ///
    /// ## Errors
    ///
    /// `ChannelFailed` if `poll()` or `read()` fails for a reason other than `EINTR`.
    pub fn recv(&mut self, timeout: Duration) -> PeekResult<ChannelEvent>
    {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(ChannelEvent::Message(line));
            }

            if self.eof {
                return Ok(self.framer.finish().map_or(ChannelEvent::Closed, ChannelEvent::Message));
            }

            if !self.wait_readable(timeout)? {
                return Ok(ChannelEvent::Idle);
            }

            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    trace!("Request channel reached end-of-stream");
                    self.eof = true;
                }
                Ok(n) => {
                    trace!("Read {} byte(s) from request channel", n);
                    self.framer.push(&chunk[..n]);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(ChannelEvent::Idle),
                Err(e) => return Err(PeekError::ChannelFailed(format!("read failed: {e}"))),
            }
        }
    }

    /// Whether end-of-stream has been observed.
    pub fn is_closed(&self) -> bool
    {
        self.eof && !self.framer.has_line()
    }

    /// Number of oversized lines dropped so far.
    pub fn dropped_messages(&self) -> usize
    {
        self.framer.dropped()
    }

    /// `Ok(false)` on timeout or signal interruption.
    #[allow(unsafe_code)] // poll(2)
    fn wait_readable(&self, timeout: Duration) -> PeekResult<bool>
    {
        let mut pollfd = libc::pollfd {
            fd: self.reader.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(PeekError::ChannelFailed(format!("poll failed: {err}")));
        }

        // POLLHUP / POLLERR also count: the following read reports EOF or the error.
        Ok(ready > 0 && pollfd.revents != 0)
    }
}

impl AsFd for RequestChannel
{
    fn as_fd(&self) -> BorrowedFd<'_>
    {
        self.reader.as_fd()
    }
}

impl AsRawFd for RequestChannel
{
    fn as_raw_fd(&self) -> RawFd
    {
        self.reader.as_raw_fd()
    }
}
