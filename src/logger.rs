use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Verbosity levels as accepted from the CLI, ordered loosest to noisiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
    ExtraDebug,
}

impl Verbosity {
    pub fn from_flags(verbose_count: u8, debug: bool, extra_debug: bool, no_verbose: bool) -> Verbosity {
        if no_verbose {
            return Verbosity::Quiet;
        }
        if extra_debug || verbose_count >= 3 {
            return Verbosity::ExtraDebug;
        }
        if debug || verbose_count >= 2 {
            return Verbosity::Debug;
        }
        if verbose_count >= 1 {
            return Verbosity::Verbose;
        }
        Verbosity::Normal
    }

    fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Error,
            Verbosity::Normal => LevelFilter::Warn,
            Verbosity::Verbose => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
            Verbosity::ExtraDebug => LevelFilter::Trace,
        }
    }
}

/// Initialize the env_logger backend at the requested verbosity.
pub fn init_logger(verbosity: Verbosity) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, verbosity.level_filter())
        .init();
}
