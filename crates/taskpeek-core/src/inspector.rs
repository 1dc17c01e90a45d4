//! # Control Loop
//!
//! The [`Inspector`] drives one launched target:
//!
//! ```text
//! AwaitingRequest --message--> Servicing(request) --outcome--> AwaitingRequest
//!        |
//!        +--closed / target reaped / shutdown flag--> Finished(reason)
//! ```
//!
//! Requests are serviced one at a time, in arrival order. A failed attach or read is
//! reported and the loop keeps going; attach is retried on the next request. The loop
//! ends when the target closes its stdout, when the target is reaped while the channel
//! is idle, or when the shutdown flag is set. Cached sessions are detached on the way out.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use taskpeek_protocol::{decode, MemoryRequest, SkipReason, TypeTable};
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelEvent, RequestChannel};
use crate::config::InspectorConfig;
use crate::engine::DebugEngine;
use crate::error::{PeekError, PeekResult};
use crate::launch::TargetProcess;
use crate::memory;
use crate::report::{LogSink, ReportEvent, ReportSink};
use crate::session::SessionCache;
use crate::types::{Address, ProcessId, TargetExit};

/// Where the control loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState
{
    AwaitingRequest,
    Servicing(MemoryRequest),
    Finished(ExitReason),
}

/// Why the control loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason
{
    /// The target closed the channel or was reaped. `status` is `None` if it could not be
    /// reaped within the grace period.
    TargetExited
    {
        status: Option<TargetExit>,
    },
    /// The target exited with the exec-failure status before sending anything.
    ExecFailed
    {
        program: PathBuf,
    },
    /// The shutdown flag was set.
    ShutdownRequested,
    /// Reading the channel failed.
    ChannelFailed(String),
}

impl ExitReason
{
    /// Whether this counts as a normal end of the session.
    pub fn is_clean(&self) -> bool
    {
        matches!(self, ExitReason::TargetExited { .. } | ExitReason::ShutdownRequested)
    }
}

/// Result of servicing one request.
#[derive(Debug)]
pub enum ServiceOutcome
{
    /// Nothing to do: null address or unknown type.
    NoOp(SkipReason),
    /// No usable session could be established.
    AttachFailed(PeekError),
    /// The session was usable but the read failed.
    ReadFailed(PeekError),
    /// `bytes.len() == request.size()`.
    Read
    {
        request: MemoryRequest,
        bytes: Vec<u8>,
    },
}

/// Counters kept by the control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats
{
    /// Messages received from the channel.
    pub received: usize,
    /// Messages that decoded to a no-op.
    pub noops: usize,
    /// Successful reads.
    pub reads: usize,
    /// Attach and read failures.
    pub failures: usize,
    /// Attach attempts.
    pub attaches: usize,
}

/// Control loop for one target.
pub struct Inspector
{
    engine: Box<dyn DebugEngine>,
    sink: Box<dyn ReportSink>,
    sessions: SessionCache,
    types: TypeTable,
    config: InspectorConfig,
    pid: ProcessId,
    program: PathBuf,
    state: LoopState,
    stats: LoopStats,
    shutdown: Arc<AtomicBool>,
}

impl Inspector
{
    /// Build an inspector for the target `pid` running `program`.
    ///
    /// Initializes the engine, so platform setup problems surface here and not on the
    /// first request.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for an unusable config; whatever `engine.initialize()` reports.
    pub fn new(
        engine: Box<dyn DebugEngine>,
        config: InspectorConfig,
        pid: ProcessId,
        program: impl Into<PathBuf>,
    ) -> PeekResult<Self>
    {
        config.validate()?;
        engine.initialize()?;

        Ok(Self {
            engine,
            sink: Box::new(LogSink::new()),
            sessions: SessionCache::new(),
            types: TypeTable::default(),
            config,
            pid,
            program: program.into(),
            state: LoopState::AwaitingRequest,
            stats: LoopStats::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Inspector for a process started by [`Launcher`](crate::launch::Launcher).
    ///
    /// ## Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn for_target(engine: Box<dyn DebugEngine>, config: InspectorConfig, target: &TargetProcess)
    -> PeekResult<Self>
    {
        Self::new(engine, config, target.pid(), target.program())
    }

    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self
    {
        self.sink = sink;
        self
    }

    pub fn with_type_table(mut self, types: TypeTable) -> Self
    {
        if types.max_width() > self.config.max_read_size {
            warn!(
                "Widest type tag ({} bytes) exceeds max read size ({} bytes)",
                types.max_width(),
                self.config.max_read_size
            );
        }
        self.types = types;
        self
    }

    /// Share an externally owned shutdown flag, e.g. one set from a signal handler.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self
    {
        self.shutdown = flag;
        self
    }

    /// Handle that makes [`run`](Self::run) stop at its next poll.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool>
    {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> &LoopState
    {
        &self.state
    }

    pub fn stats(&self) -> LoopStats
    {
        LoopStats {
            attaches: self.sessions.attach_count(),
            ..self.stats
        }
    }

    pub fn sessions(&self) -> &SessionCache
    {
        &self.sessions
    }

    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    pub fn program(&self) -> &Path
    {
        &self.program
    }

    /// Decode and service one raw message.
    pub fn handle_message(&mut self, message: &str) -> ServiceOutcome
    {
        self.stats.received += 1;
        let request = decode(message, &self.types);
        debug!("Received {:?} -> {}", message, request);

        self.state = LoopState::Servicing(request);
        let outcome = self.service(request);
        self.state = LoopState::AwaitingRequest;
        outcome
    }

    /// Service an already decoded request.
    ///
    /// Non-actionable requests never touch the session cache. Otherwise a usable session
    /// is ensured (attaching if needed) and exactly `request.size()` bytes are read.
    pub fn service(&mut self, request: MemoryRequest) -> ServiceOutcome
    {
        if let Some(reason) = request.skip_reason() {
            self.stats.noops += 1;
            self.sink.report(ReportEvent::Skipped { request, reason });
            return ServiceOutcome::NoOp(reason);
        }

        let session = match self.sessions.ensure(self.engine.as_ref(), &self.program, self.pid) {
            Ok(session) => session,
            Err(err) => {
                warn!("Attach to PID {} failed: {}", self.pid, err);
                self.stats.failures += 1;
                self.sink.report(ReportEvent::Failed {
                    request,
                    error: err.to_string(),
                });
                return ServiceOutcome::AttachFailed(err);
            }
        };

        match memory::read_memory(session, request, self.config.max_read_size) {
            Ok(bytes) => {
                self.stats.reads += 1;
                self.sink.report(ReportEvent::Read {
                    request,
                    bytes: bytes.clone(),
                });
                ServiceOutcome::Read { request, bytes }
            }
            Err(err) => {
                if err.invalidates_session() {
                    self.sessions.invalidate(self.pid);
                }
                self.stats.failures += 1;
                self.sink.report(ReportEvent::Failed {
                    request,
                    error: err.to_string(),
                });
                ServiceOutcome::ReadFailed(err)
            }
        }
    }

    /// Write `data` into the target at `address`.
    ///
    /// Not driven by the control loop; exposed for callers that hold the inspector.
    ///
    /// ## Errors
    ///
    /// Attach errors from the session cache, or anything
    /// [`write_memory`](memory::write_memory) reports.
    pub fn write(&mut self, address: Address, data: &[u8]) -> PeekResult<usize>
    {
        let session = self.sessions.ensure(self.engine.as_ref(), &self.program, self.pid)?;
        let result = memory::write_memory(session, address, data);
        if matches!(&result, Err(err) if err.invalidates_session()) {
            self.sessions.invalidate(self.pid);
        }
        result
    }

    /// Run until the channel closes, the target is reaped, or shutdown is requested.
    pub fn run(&mut self, channel: &mut RequestChannel, target: &mut TargetProcess) -> ExitReason
    {
        info!("Inspecting PID {} ({})", self.pid, self.program.display());

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                return self.finish(ExitReason::ShutdownRequested);
            }

            match channel.recv(self.config.poll_interval) {
                Ok(ChannelEvent::Message(message)) => {
                    let _ = self.handle_message(&message);
                }
                Ok(ChannelEvent::Idle) => {
                    if let Some(status) = target.exit_status() {
                        // Reaped on an earlier poll and nothing arrived since; a descendant
                        // is holding the write end open.
                        return self.finish(ExitReason::TargetExited { status: Some(status) });
                    }
                    match target.try_wait() {
                        Ok(Some(status)) => debug!("Target {}, draining request channel", status),
                        Ok(None) => {}
                        Err(err) => {
                            warn!("Cannot reap PID {}: {}", self.pid, err);
                            return self.finish(ExitReason::TargetExited { status: None });
                        }
                    }
                }
                Ok(ChannelEvent::Closed) => {
                    debug!("Request channel closed");
                    let status = target.wait_timeout(self.config.exit_grace).unwrap_or_else(|err| {
                        warn!("Cannot reap PID {}: {}", self.pid, err);
                        None
                    });
                    return self.finish(ExitReason::TargetExited { status });
                }
                Err(err) => {
                    error!("{}", err);
                    return self.finish(ExitReason::ChannelFailed(err.to_string()));
                }
            }
        }
    }

    /// Detach every session and enter `Finished`.
    fn finish(&mut self, reason: ExitReason) -> ExitReason
    {
        let reason = match reason {
            ExitReason::TargetExited { status: Some(status) }
                if status.looks_like_exec_failure() && self.stats.received == 0 =>
            {
                error!(
                    "{}",
                    PeekError::ExecFailed {
                        program: self.program.display().to_string(),
                        details: format!("target {status} without sending any request"),
                    }
                );
                ExitReason::ExecFailed {
                    program: self.program.clone(),
                }
            }
            other => other,
        };

        self.sessions.detach_all();

        let stats = self.stats();
        match &reason {
            ExitReason::TargetExited { status: Some(status) } => info!("Target {}", status),
            ExitReason::TargetExited { status: None } => info!("Target closed its output"),
            _ => {}
        }
        info!(
            "Inspector finished: {} received, {} no-op, {} read, {} failed, {} attach attempt(s)",
            stats.received, stats.noops, stats.reads, stats.failures, stats.attaches
        );

        self.state = LoopState::Finished(reason.clone());
        reason
    }

    /// Detach without running the loop to completion, e.g. after [`handle_message`](Self::handle_message)-only use.
    pub fn shutdown(&mut self) -> ExitReason
    {
        self.finish(ExitReason::ShutdownRequested)
    }
}

impl Drop for Inspector
{
    fn drop(&mut self)
    {
        self.sessions.detach_all();
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::engine::AttachReport;
    use crate::target::TargetImage;

    struct DenyingEngine;

    impl DebugEngine for DenyingEngine
    {
        fn name(&self) -> &'static str
        {
            "deny"
        }

        fn initialize(&self) -> PeekResult<()>
        {
            Ok(())
        }

        fn attach(&self, _image: &TargetImage, _pid: ProcessId) -> AttachReport
        {
            AttachReport::failed(PeekError::PermissionDenied("denied".into()))
        }
    }

    fn inspector() -> Inspector
    {
        Inspector::new(
            Box::new(DenyingEngine),
            InspectorConfig::default(),
            ProcessId(1),
            "/nonexistent",
        )
        .unwrap()
    }

    #[test]
    fn noop_requests_are_counted_not_serviced()
    {
        let mut inspector = inspector();
        assert!(matches!(
            inspector.handle_message("0 b"),
            ServiceOutcome::NoOp(SkipReason::NullAddress)
        ));
        assert!(matches!(
            inspector.handle_message("1000 x"),
            ServiceOutcome::NoOp(SkipReason::UnknownSize)
        ));
        assert!(matches!(inspector.handle_message("1000"), ServiceOutcome::NoOp(_)));

        let stats = inspector.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.noops, 3);
        assert_eq!(stats.attaches, 0);
        assert_eq!(inspector.state(), &LoopState::AwaitingRequest);
    }

    #[test]
    fn rejects_invalid_config()
    {
        let config = InspectorConfig {
            max_read_size: 0,
            ..InspectorConfig::default()
        };
        assert!(Inspector::new(Box::new(DenyingEngine), config, ProcessId(1), "/x").is_err());
    }

    #[test]
    fn shutdown_enters_finished()
    {
        let mut inspector = inspector();
        assert_eq!(inspector.shutdown(), ExitReason::ShutdownRequested);
        assert_eq!(inspector.state(), &LoopState::Finished(ExitReason::ShutdownRequested));
    }

    #[test]
    fn exit_reason_cleanliness()
    {
        assert!(ExitReason::ShutdownRequested.is_clean());
        assert!(ExitReason::TargetExited { status: None }.is_clean());
        assert!(!ExitReason::ChannelFailed("x".into()).is_clean());
        assert!(!ExitReason::ExecFailed { program: "/x".into() }.is_clean());
    }
}
