use parking_lot::Mutex;
use slog::{warn, Logger};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How long a read value remains cached before the file is consulted again.
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// An operational escape hatch that shifts every duty's wall-clock schedule
/// by a file-configured number of milliseconds.
///
/// The file is re-read at most once per minute; a missing or malformed file
/// yields a zero delay. The path comes from configuration, falling back to
/// the `TIME_DELAY_HACK` environment variable.
pub struct TimeDelay {
    path: Option<PathBuf>,
    state: Mutex<State>,
    log: Logger,
}

struct State {
    last_read: Option<Instant>,
    lag: Duration,
}

impl TimeDelay {
    pub fn new(path: Option<PathBuf>, log: Logger) -> Self {
        let path = path.or_else(|| std::env::var("TIME_DELAY_HACK").ok().map(PathBuf::from));
        Self {
            path,
            state: Mutex::new(State {
                last_read: None,
                lag: Duration::ZERO,
            }),
            log,
        }
    }

    /// The delay currently in effect.
    pub fn current(&self) -> Duration {
        let path = match &self.path {
            Some(path) => path,
            None => return Duration::ZERO,
        };

        let mut state = self.state.lock();
        let stale = state
            .last_read
            .map_or(true, |at| at.elapsed() >= REFRESH_INTERVAL);
        if stale {
            state.last_read = Some(Instant::now());
            state.lag = match std::fs::read_to_string(path) {
                Ok(contents) => match contents.trim().parse::<u64>() {
                    Ok(millis) => Duration::from_millis(millis),
                    Err(e) => {
                        warn!(
                            self.log,
                            "Unparseable time delay file";
                            "path" => %path.display(),
                            "error" => %e,
                        );
                        Duration::ZERO
                    }
                },
                Err(e) => {
                    warn!(
                        self.log,
                        "Failed to read time delay file";
                        "path" => %path.display(),
                        "error" => %e,
                    );
                    Duration::ZERO
                }
            };
        }
        state.lag
    }
}
