//! Run log installation.
//!
//! Every worker logs through the `log` facade. [`init_logging`] routes it to
//! `<dir>/<controller>_<stamp>.log` and echoes warnings and errors to stderr.
//! Thread names (`tsc-actor-0`, `tsc-learner-1`, ...) are included in each line.

use crate::error::{Result, TscError};
use crate::metrics::timestamp;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode,
    ThreadLogMode, WriteLogger,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// `0` is info, `1` debug, anything higher trace.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the process-wide logger. Returns the log file path.
///
/// Fails if a logger is already installed.
pub fn init_logging(dir: &Path, controller: &str, level: LevelFilter) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{controller}_{}.log", timestamp()));
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Error)
        .set_thread_mode(ThreadLogMode::Names)
        .build();

    CombinedLogger::init(vec![
        WriteLogger::new(level, config.clone(), File::create(&path)?),
        TermLogger::new(
            LevelFilter::Warn,
            config,
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
    ])
    .map_err(|e| TscError::config(format!("logger: {e}")))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_from_verbosity(0), LevelFilter::Info);
        assert_eq!(level_from_verbosity(1), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(5), LevelFilter::Trace);
    }

    #[test]
    fn test_log_file_receives_records() {
        let dir = tempdir().unwrap();
        let path = init_logging(dir.path(), "sotl", LevelFilter::Info).unwrap();
        log::info!("actor 0 finished episode 1");
        log::debug!("filtered out");
        log::logger().flush();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("actor 0 finished episode 1"));
        assert!(!text.contains("filtered out"));

        // a second install is refused
        assert!(init_logging(dir.path(), "sotl", LevelFilter::Info).is_err());
    }
}
