//! Common module for library exports

pub use crate::channel::{ChannelEvent, RequestChannel};
pub use crate::config::InspectorConfig;
pub use crate::engine::{create_engine, DebugEngine, MemoryAccess};
pub use crate::error::{PeekError, PeekResult};
pub use crate::inspector::{ExitReason, Inspector, ServiceOutcome};
pub use crate::launch::{Launcher, TargetProcess};
pub use crate::report::{LogSink, ReportEvent, ReportSink};
pub use crate::types::{Address, ProcessId, TargetExit};
