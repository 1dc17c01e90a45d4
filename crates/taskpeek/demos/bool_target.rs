//! Demo target for taskpeek
//!
//! Flips a `bool` a few times and, after each flip, asks the inspector to read it by
//! printing `<hex-address> b` on stdout. Run it under the inspector:
//!
//! ```text
//! cargo build --example bool_target
//! cargo run -p taskpeek -- target/debug/examples/bool_target
//! ```
//!
//! The last line it prints is malformed on purpose; the inspector skips it.

use std::hint::black_box;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use taskpeek_protocol::{encode, BOOL_TAG};

fn main() -> io::Result<()>
{
    let mut flag = Box::new(false);
    let address = std::ptr::addr_of!(*flag) as u64;
    let mut stdout = io::stdout().lock();

    for _ in 0..4 {
        *flag = !*flag;
        black_box(&flag);

        // One request per line; the pipe is not a tty, so flush explicitly.
        write!(stdout, "{}", encode(address, BOOL_TAG))?;
        stdout.flush()?;

        // Give the inspector time to read the value before it changes.
        thread::sleep(Duration::from_millis(500));
    }

    writeln!(stdout, "{address:x}")?;
    stdout.flush()?;
    Ok(())
}
