//! # Debug Attach Sessions
//!
//! An [`AttachedSession`] can only be built from an [`AttachReport`] that passes
//! [`attach_is_usable`](crate::engine::attach_is_usable), so any code holding
//! `&AttachedSession` holds a capability that was good at attach time. Whether it is
//! *still* good is re-checked with [`AttachedSession::is_valid`] before each use.
//!
//! [`SessionCache`] keeps one slot per target pid. A session is reused until it is
//! observed invalid, and only then re-attached.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::engine::{AttachReport, DebugEngine, MemoryAccess};
use crate::error::{PeekError, PeekResult};
use crate::target::TargetImage;
use crate::types::ProcessId;

/// A validated attach to one live target.
pub struct AttachedSession
{
    pid: ProcessId,
    image: TargetImage,
    capability: Box<dyn MemoryAccess>,
}

impl AttachedSession
{
    /// Build a session from an attach report.
    ///
    /// ## Errors
    ///
    /// The report's own error if attach failed, or `AttachFailed` if it claimed success
    /// without a usable capability. A capability handed back alongside a failure is
    /// detached before returning.
    pub fn from_report(pid: ProcessId, image: TargetImage, report: AttachReport) -> PeekResult<Self>
    {
        let usable = report.is_usable();
        let AttachReport { capability, status } = report;

        match (capability, status) {
            (Some(capability), Ok(())) if usable => Ok(Self {
                pid,
                image,
                capability,
            }),
            (capability, status) => {
                if let Some(mut capability) = capability {
                    if let Err(err) = capability.detach() {
                        debug!("Discarding unusable capability for PID {}: {}", pid, err);
                    }
                }
                Err(match status {
                    Err(err) => err,
                    Ok(()) => PeekError::AttachFailed(format!("attach to PID {pid} returned no valid capability")),
                })
            }
        }
    }

    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    pub fn image(&self) -> &TargetImage
    {
        &self.image
    }

    /// Re-check the capability; false once the target is gone or the session detached.
    pub fn is_valid(&self) -> bool
    {
        self.capability.is_valid()
    }

    pub(crate) fn capability(&self) -> &dyn MemoryAccess
    {
        self.capability.as_ref()
    }

    /// Release the capability.
    ///
    /// ## Errors
    ///
    /// Platform-specific release failure; the session is unusable either way.
    pub fn detach(&mut self) -> PeekResult<()>
    {
        self.capability.detach()
    }
}

impl fmt::Debug for AttachedSession
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("AttachedSession")
            .field("pid", &self.pid)
            .field("image", &self.image.path())
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Cached attach state for one pid.
#[derive(Debug, Default)]
pub enum SessionSlot
{
    #[default]
    NotAttached,
    Attached(AttachedSession),
}

impl SessionSlot
{
    pub fn session(&self) -> Option<&AttachedSession>
    {
        match self {
            SessionSlot::Attached(session) => Some(session),
            SessionSlot::NotAttached => None,
        }
    }

    pub fn is_attached(&self) -> bool
    {
        matches!(self, SessionSlot::Attached(_))
    }
}

/// Sessions keyed by target pid.
#[derive(Debug, Default)]
pub struct SessionCache
{
    slots: HashMap<ProcessId, SessionSlot>,
    attach_count: usize,
}

impl SessionCache
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Return a usable session for `pid`, attaching if there is none or the cached one
    /// has gone invalid.
    ///
    /// ## Errors
    ///
    /// Whatever target resolution or attach reported. The slot is left `NotAttached`, so
    /// the next call tries again.
    pub fn ensure(&mut self, engine: &dyn DebugEngine, program: &Path, pid: ProcessId) -> PeekResult<&AttachedSession>
    {
        let cached = self.slots.get(&pid).and_then(SessionSlot::session).map(AttachedSession::is_valid);

        match cached {
            Some(true) => {}
            Some(false) => {
                warn!("Session for PID {} is no longer valid, re-attaching", pid);
                self.invalidate(pid);
                self.attach(engine, program, pid)?;
            }
            None => self.attach(engine, program, pid)?,
        }

        self.get(pid).ok_or(PeekError::NotAttached)
    }

    fn attach(&mut self, engine: &dyn DebugEngine, program: &Path, pid: ProcessId) -> PeekResult<()>
    {
        engine.initialize()?;
        self.slots.insert(pid, SessionSlot::NotAttached);

        let image = engine.resolve_target(program)?;
        self.attach_count += 1;
        let report = engine.attach(&image, pid);
        let session = AttachedSession::from_report(pid, image, report)?;

        info!("Session established for PID {} via {}", pid, engine.name());
        self.slots.insert(pid, SessionSlot::Attached(session));
        Ok(())
    }

    pub fn get(&self, pid: ProcessId) -> Option<&AttachedSession>
    {
        self.slots.get(&pid).and_then(SessionSlot::session)
    }

    pub fn slot(&self, pid: ProcessId) -> Option<&SessionSlot>
    {
        self.slots.get(&pid)
    }

    /// Detach the cached session for `pid` (if any) and mark the slot `NotAttached`.
    pub fn invalidate(&mut self, pid: ProcessId)
    {
        if let Some(slot) = self.slots.get_mut(&pid) {
            if let SessionSlot::Attached(mut session) = std::mem::take(slot) {
                if let Err(err) = session.detach() {
                    debug!("Detach of stale session for PID {} failed: {}", pid, err);
                }
            }
        }
    }

    /// Detach every cached session.
    pub fn detach_all(&mut self)
    {
        for (pid, slot) in self.slots.drain() {
            if let SessionSlot::Attached(mut session) = slot {
                match session.detach() {
                    Ok(()) => debug!("Detached session for PID {}", pid),
                    Err(err) => warn!("Failed to detach session for PID {}: {}", pid, err),
                }
            }
        }
    }

    /// Number of attach attempts made through this cache.
    pub fn attach_count(&self) -> usize
    {
        self.attach_count
    }
}

#[cfg(test)]
mod tests
{
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::target::ImageKind;
    use crate::types::Address;

    struct FakeCapability
    {
        pid: ProcessId,
        valid: Rc<Cell<bool>>,
    }

    impl MemoryAccess for FakeCapability
    {
        fn pid(&self) -> ProcessId
        {
            self.pid
        }

        fn is_valid(&self) -> bool
        {
            self.valid.get()
        }

        fn read(&self, _address: Address, len: usize) -> PeekResult<Vec<u8>>
        {
            Ok(vec![0; len])
        }

        fn write(&self, _address: Address, data: &[u8]) -> PeekResult<usize>
        {
            Ok(data.len())
        }

        fn detach(&mut self) -> PeekResult<()>
        {
            self.valid.set(false);
            Ok(())
        }
    }

    struct FakeEngine
    {
        valid: Rc<Cell<bool>>,
        deny: bool,
    }

    impl DebugEngine for FakeEngine
    {
        fn name(&self) -> &'static str
        {
            "fake"
        }

        fn initialize(&self) -> PeekResult<()>
        {
            Ok(())
        }

        fn resolve_target(&self, program: &Path) -> PeekResult<TargetImage>
        {
            Ok(TargetImage::new(program, ImageKind::Unknown))
        }

        fn attach(&self, _image: &TargetImage, pid: ProcessId) -> AttachReport
        {
            if self.deny {
                return AttachReport::failed(PeekError::PermissionDenied("nope".into()));
            }
            self.valid.set(true);
            AttachReport::attached(Box::new(FakeCapability {
                pid,
                valid: Rc::clone(&self.valid),
            }))
        }
    }

    #[test]
    fn reuses_valid_session()
    {
        let engine = FakeEngine {
            valid: Rc::new(Cell::new(false)),
            deny: false,
        };
        let mut cache = SessionCache::new();
        let pid = ProcessId(42);

        cache.ensure(&engine, Path::new("/bin/true"), pid).unwrap();
        cache.ensure(&engine, Path::new("/bin/true"), pid).unwrap();
        assert_eq!(cache.attach_count(), 1);
    }

    #[test]
    fn reattaches_after_invalidation()
    {
        let valid = Rc::new(Cell::new(false));
        let engine = FakeEngine {
            valid: Rc::clone(&valid),
            deny: false,
        };
        let mut cache = SessionCache::new();
        let pid = ProcessId(42);

        cache.ensure(&engine, Path::new("/bin/true"), pid).unwrap();
        valid.set(false);
        let session = cache.ensure(&engine, Path::new("/bin/true"), pid).unwrap();
        assert!(session.is_valid());
        assert_eq!(cache.attach_count(), 2);
    }

    #[test]
    fn failed_attach_leaves_slot_empty()
    {
        let engine = FakeEngine {
            valid: Rc::new(Cell::new(false)),
            deny: true,
        };
        let mut cache = SessionCache::new();
        let pid = ProcessId(7);

        let err = cache.ensure(&engine, Path::new("/bin/true"), pid).unwrap_err();
        assert!(matches!(err, PeekError::PermissionDenied(_)));
        assert!(matches!(cache.slot(pid), Some(SessionSlot::NotAttached)));
        assert!(cache.get(pid).is_none());
    }

    #[test]
    fn report_with_invalid_capability_is_rejected()
    {
        let valid = Rc::new(Cell::new(false));
        let report = AttachReport::attached(Box::new(FakeCapability {
            pid: ProcessId(1),
            valid,
        }));
        let err = AttachedSession::from_report(ProcessId(1), TargetImage::new("/x", ImageKind::Unknown), report)
            .unwrap_err();
        assert!(matches!(err, PeekError::AttachFailed(_)));
    }

    #[test]
    fn detach_all_releases_capabilities()
    {
        let valid = Rc::new(Cell::new(false));
        let engine = FakeEngine {
            valid: Rc::clone(&valid),
            deny: false,
        };
        let mut cache = SessionCache::new();
        cache.ensure(&engine, Path::new("/bin/true"), ProcessId(3)).unwrap();
        assert!(valid.get());

        cache.detach_all();
        assert!(!valid.get());
        assert!(cache.get(ProcessId(3)).is_none());
    }
}
