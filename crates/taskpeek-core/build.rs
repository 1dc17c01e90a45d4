//! Build script for taskpeek-core
//!
//! Checks build requirements before compilation:
//! - Minimum Rust version (1.70, for `Option::is_some_and` and `std::os::fd`)
//! - Whether the target platform has a debug engine
//!
//! ## Requirements
//!
//! - **Linux**: `/proc/<pid>/mem` (any kernel from the last decade)
//! - **macOS**: 10.9+ (Mavericks) for `mach_vm_read_overwrite()`
//! - **Other Unix**: builds, but `create_engine()` reports the platform as unsupported

use std::env;

const MIN_RUST_VERSION: &str = "1.70.0";

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match (rustc_version::version(), rustc_version::Version::parse(MIN_RUST_VERSION)) {
        (Ok(found), Ok(min)) if found < min => {
            panic!("taskpeek-core requires Rust {min} or newer, found {found}");
        }
        (Ok(_), Ok(_)) => {}
        // Some build environments hide rustc; don't fail the build over it.
        _ => println!("cargo:warning=could not verify Rust version"),
    }

    // cfg!(target_os) here would describe the build host, not the target.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    match target_os.as_str() {
        "linux" => {}
        "macos" => check_macos_requirements(),
        other => println!("cargo:warning=no taskpeek debug engine for target OS '{other}'; attach will be unsupported"),
    }
}

fn check_macos_requirements()
{
    let min_macos_version = (10, 9, 0);

    match get_macos_version() {
        Some(version) if version < min_macos_version => println!(
            "cargo:warning=taskpeek-core expects macOS {}.{}.{} or newer, found {}.{}.{}",
            min_macos_version.0, min_macos_version.1, min_macos_version.2, version.0, version.1, version.2
        ),
        Some(_) => {}
        // Probably cross-compiling.
        None => println!("cargo:warning=could not detect macOS version"),
    }
}

fn get_macos_version() -> Option<(u32, u32, u32)>
{
    use std::process::Command;

    let output = Command::new("sw_vers").arg("-productVersion").output().ok()?;

    let version_str = String::from_utf8(output.stdout).ok()?;
    let mut parts = version_str.trim().split('.');

    let major = parts.next()?.parse::<u32>().ok()?;
    let minor = parts.next()?.parse::<u32>().ok()?;
    let patch = parts.next().and_then(|s| s.parse::<u32>().ok()).unwrap_or(0);

    Some((major, minor, patch))
}
