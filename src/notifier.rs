//! Unified logging and progress UI for the command line.
//!
//! [`Notifier`] is installed as the global [`log`] logger and wraps `env_logger`
//! (text logs) and `indicatif` (a spinner) under a single verbosity switch:
//! - [`VerbosityLevel::Quiet`]: info records from this crate become the spinner
//!   message; warnings and errors are still printed, above the spinner.
//! - [`VerbosityLevel::Info`]/[`VerbosityLevel::Debug`]/[`VerbosityLevel::Trace`]:
//!   standard `env_logger` output at that level.
//!
//! The library itself only uses the `log` macros, so it works the same with any
//! other logger.

use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityLevel {
    Quiet = 0, // Spinner, warnings only
    Info = 1,  // Text logs at info level
    Debug = 2, // Text logs at debug level
    Trace = 3, // Text logs at trace level
}

impl From<u8> for VerbosityLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }
}

impl VerbosityLevel {
    fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    logger: env_logger::Logger,
    spinner: Mutex<Option<ProgressBar>>,
}

impl Notifier {
    pub fn new(verbosity_level: u8) -> Self {
        let verbosity = VerbosityLevel::from(verbosity_level);

        let logger = env_logger::Builder::from_env(Env::default())
            .filter_level(verbosity.to_log_level())
            .build();

        Self {
            verbosity,
            logger,
            spinner: Mutex::new(None),
        }
    }

    /// Installs the notifier as the process-wide logger.
    pub fn install(self) -> Result<&'static Notifier, SetLoggerError> {
        let max_level = self.max_level();
        let notifier: &'static Notifier = Box::leak(Box::new(self));
        log::set_logger(notifier)?;
        log::set_max_level(max_level);
        Ok(notifier)
    }

    fn max_level(&self) -> LevelFilter {
        match self.verbosity {
            // Info records still drive the spinner.
            VerbosityLevel::Quiet => LevelFilter::Info,
            level => level.to_log_level(),
        }
    }

    pub fn use_beautiful_progress(&self) -> bool {
        self.verbosity == VerbosityLevel::Quiet
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        self.verbosity
    }

    fn set_spinner_message(&self, message: String) {
        let Ok(mut spinner) = self.spinner.lock() else {
            return;
        };

        let spinner = spinner.get_or_insert_with(|| {
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let bar = ProgressBar::new_spinner();
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        spinner.set_message(message);
    }

    /// Stops the spinner, leaving `message` on screen in quiet mode.
    pub fn finish(&self, message: &str) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(spinner) = spinner.take() {
                spinner.finish_with_message(message.to_string());
                return;
            }
        }
        if self.use_beautiful_progress() {
            eprintln!("{}", message);
        }
    }

    /// Removes the spinner without a final message, e.g. before an error.
    pub fn clear(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(spinner) = spinner.take() {
                spinner.finish_and_clear();
            }
        }
    }
}

impl Log for Notifier {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        match self.verbosity {
            VerbosityLevel::Quiet if record.level() == Level::Info => {
                if record.target().starts_with(env!("CARGO_CRATE_NAME")) {
                    self.set_spinner_message(record.args().to_string());
                }
            }
            VerbosityLevel::Quiet => {
                let spinner = self.spinner.lock().ok().and_then(|s| s.clone());
                match spinner {
                    Some(spinner) => spinner.suspend(|| self.logger.log(record)),
                    None => self.logger.log(record),
                }
            }
            _ => self.logger.log(record),
        }
    }

    fn flush(&self) {
        self.logger.flush();
    }
}
