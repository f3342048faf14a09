//! Logging setup.
//!
//! All diagnostic output goes through the `log` crate; this module wires
//! it up to stderr via `fern`, with the format and level controlled by
//! the `-v`/`--verbose` flag handled in [`crate::config`].

use fern::Dispatch;
use log::LevelFilter;

/// Initializes logging at the given level, writing timestamped lines to
/// stderr.
///
/// Should be called once, as early as possible — any logging that
/// happens before this runs is simply dropped.
pub fn init(level: LevelFilter) -> Result<(), fern::InitError> {
    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message,
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
