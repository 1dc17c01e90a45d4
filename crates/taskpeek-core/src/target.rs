//! Target image resolution.
//!
//! Before attaching, the engine builds a [`TargetImage`] from the executable path: what
//! kind of file it is, which architecture, and where it starts. Nothing here requires the
//! process to be running; the image only provides context for logging and sanity checks.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use object::{Architecture, BinaryFormat, Object};
use tracing::{debug, warn};

use crate::error::{PeekError, PeekResult};

/// What the executable path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageKind
{
    /// A native object file the `object` crate understands.
    Object
    {
        format: BinaryFormat,
        architecture: Architecture,
        entry: u64,
        is_64: bool,
    },
    /// A `#!` script; the process image will be the interpreter.
    Script
    {
        interpreter: String
    },
    /// Readable but not recognised.
    Unknown,
}

/// Resolved executable image of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetImage
{
    path: PathBuf,
    kind: ImageKind,
}

impl TargetImage
{
    /// An image with an already-known kind, without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>, kind: ImageKind) -> Self
    {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Read and classify the image at `path`.
    ///
    /// A file that cannot be parsed still resolves, as [`ImageKind::Unknown`].
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument` if the file does not exist
    /// - `PermissionDenied` if it cannot be read
    /// - `Io` for anything else
    pub fn resolve(path: &Path) -> PeekResult<Self>
    {
        let bytes = fs::read(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => PeekError::InvalidArgument(format!("{}: no such file", path.display())),
            ErrorKind::PermissionDenied => PeekError::PermissionDenied(format!("cannot read {}", path.display())),
            _ => PeekError::Io(err),
        })?;

        let kind = Self::classify(&bytes);
        debug!("Resolved target image {}: {}", path.display(), kind);

        let image = Self {
            path: path.to_path_buf(),
            kind,
        };
        if !image.matches_host() {
            warn!("{} does not look like a native executable for this host", path.display());
        }
        Ok(image)
    }

    /// Classify raw image bytes.
    pub fn classify(bytes: &[u8]) -> ImageKind
    {
        if let Some(rest) = bytes.strip_prefix(b"#!") {
            let first_line = rest.split(|&b| b == b'\n').next().unwrap_or_default();
            let interpreter = String::from_utf8_lossy(first_line)
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            return ImageKind::Script { interpreter };
        }

        match object::File::parse(bytes) {
            Ok(file) => ImageKind::Object {
                format: file.format(),
                architecture: file.architecture(),
                entry: file.entry(),
                is_64: file.is_64(),
            },
            Err(err) => {
                debug!("Not a recognised object file: {}", err);
                ImageKind::Unknown
            }
        }
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn kind(&self) -> &ImageKind
    {
        &self.kind
    }

    /// Whether the image can plausibly run natively on this host.
    ///
    /// Scripts are assumed to, since their interpreter is what actually runs. Unknown
    /// images are not.
    pub fn matches_host(&self) -> bool
    {
        match &self.kind {
            ImageKind::Object {
                format, architecture, ..
            } => *format == host_format() && *architecture == host_architecture(),
            ImageKind::Script { .. } => true,
            ImageKind::Unknown => false,
        }
    }
}

impl fmt::Display for ImageKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ImageKind::Object {
                format,
                architecture,
                entry,
                is_64,
            } => write!(
                f,
                "{format:?} {architecture:?} ({}-bit), entry 0x{entry:x}",
                if *is_64 { 64 } else { 32 }
            ),
            ImageKind::Script { interpreter } => write!(f, "script for {interpreter}"),
            ImageKind::Unknown => write!(f, "unknown image"),
        }
    }
}

fn host_format() -> BinaryFormat
{
    if cfg!(target_vendor = "apple") {
        BinaryFormat::MachO
    } else if cfg!(windows) {
        BinaryFormat::Pe
    } else {
        BinaryFormat::Elf
    }
}

fn host_architecture() -> Architecture
{
    if cfg!(target_arch = "x86_64") {
        Architecture::X86_64
    } else if cfg!(target_arch = "aarch64") {
        Architecture::Aarch64
    } else if cfg!(target_arch = "x86") {
        Architecture::I386
    } else if cfg!(target_arch = "arm") {
        Architecture::Arm
    } else if cfg!(target_arch = "riscv64") {
        Architecture::Riscv64
    } else {
        Architecture::Unknown
    }
}
