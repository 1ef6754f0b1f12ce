//! Per-session settings and the engine-wide defaults scenarios inherit.
//!
//! Everything here is plain data with builder methods. [`EngineConfig`]
//! can additionally be seeded from `TANDEM_*` environment variables.

mod env;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use env::{vars, EnvConfig, DEFAULT_PREFIX};
use tandem_pty::PtySignal;

use crate::error::{ExpectError, Result};
use crate::expect::{Pattern, DEFAULT_MAX_SIZE};

/// Expect deadline when a step names none.
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a freshly spawned program has to show its ready pattern.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// A write that blocks longer than this fails.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes requested per read from the master.
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Columns of a new terminal.
pub const DEFAULT_TERMINAL_WIDTH: u16 = 80;

/// Rows of a new terminal.
pub const DEFAULT_TERMINAL_HEIGHT: u16 = 24;

/// `TERM` given to every child unless overridden. Well-behaved programs
/// emit no color or cursor motion for `dumb`.
pub const DEFAULT_TERM: &str = "dumb";

/// Prompt installed by [`SessionConfig::shell`].
pub const SHELL_PROMPT: &str = "tandem$ ";

/// Fractional seconds from a file or the environment, as a [`Duration`].
///
/// # Errors
///
/// Returns `InvalidArgument` unless `secs` is positive and finite.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ExpectError::invalid_argument(format!(
            "timeout must be positive and finite, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ExpectError::invalid_argument(format!("timeout {secs}s: {e}")))
}

/// One program on one terminal.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Program, looked up on `PATH` unless it contains a slash.
    pub command: String,
    /// Arguments, not including the program.
    pub args: Vec<String>,
    /// Set in the child on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// Removed from the child's environment.
    pub env_remove: Vec<String>,
    /// Start from our environment. When false only `env` is passed.
    pub inherit_env: bool,
    /// Where the program starts. `None` keeps ours.
    pub working_dir: Option<PathBuf>,
    /// Columns, rows.
    pub dimensions: (u16, u16),
    /// Line discipline echo of sent input.
    pub echo: bool,
    /// Output that means the program is up. Spawning waits for it.
    pub ready: Option<Pattern>,
    /// Expect, ready and write deadlines.
    pub timeout: TimeoutConfig,
    /// Output buffer limits.
    pub buffer: BufferConfig,
    /// Shutdown sequence.
    pub terminate: TerminateConfig,
    /// Appended to every [`send`](crate::Session::send).
    pub line_ending: LineEnding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), DEFAULT_TERM.to_string());

        Self {
            command: String::new(),
            args: Vec::new(),
            env,
            env_remove: Vec::new(),
            inherit_env: true,
            working_dir: None,
            dimensions: (DEFAULT_TERMINAL_WIDTH, DEFAULT_TERMINAL_HEIGHT),
            echo: true,
            ready: None,
            timeout: TimeoutConfig::default(),
            buffer: BufferConfig::default(),
            terminate: TerminateConfig::default(),
            line_ending: LineEnding::default(),
        }
    }
}

impl SessionConfig {
    /// Defaults for running `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// A `/bin/sh` session with a fixed prompt.
    ///
    /// The prompt is [`SHELL_PROMPT`] and doubles as the ready pattern.
    #[must_use]
    pub fn shell() -> Self {
        let prompt = Pattern::Literal(SHELL_PROMPT.to_string());
        Self::new("/bin/sh")
            .env("PS1", SHELL_PROMPT)
            .env_remove("ENV")
            .ready(prompt)
    }

    /// Replace the argument list.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set `key` in the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Keep `key` out of the child, even if we have it set.
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.env.remove(&key);
        self.env_remove.push(key);
        self
    }

    /// See [`inherit_env`](Self::inherit_env).
    #[must_use]
    pub const fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Start the program in `path`. Spawning fails if it is not a directory.
    #[must_use]
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Columns and rows.
    #[must_use]
    pub const fn dimensions(mut self, width: u16, height: u16) -> Self {
        self.dimensions = (width, height);
        self
    }

    /// Terminal echo of sent input.
    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Wait for `pattern` after spawning before the session counts as ready.
    #[must_use]
    pub fn ready(mut self, pattern: Pattern) -> Self {
        self.ready = Some(pattern);
        self
    }

    /// Do not wait for anything after spawning.
    #[must_use]
    pub fn no_ready(mut self) -> Self {
        self.ready = None;
        self
    }

    /// Deadline for expects that do not name one.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout.expect = timeout;
        self
    }

    /// Deadline for the ready pattern.
    #[must_use]
    pub const fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.ready = timeout;
        self
    }

    /// Output buffer limits.
    #[must_use]
    pub const fn buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }

    /// Shutdown sequence.
    #[must_use]
    pub fn terminate(mut self, terminate: TerminateConfig) -> Self {
        self.terminate = terminate;
        self
    }

    /// What `send` appends.
    #[must_use]
    pub const fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Command line for log messages.
    #[must_use]
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Per-session deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Used when an expect names no deadline.
    pub expect: Duration,

    /// Ready pattern, counted from spawn.
    pub ready: Duration,

    /// One write to the master.
    pub write: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            expect: DEFAULT_EXPECT_TIMEOUT,
            ready: DEFAULT_READY_TIMEOUT,
            write: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    /// `expect` plus default ready and write deadlines.
    #[must_use]
    pub fn new(expect: Duration) -> Self {
        Self {
            expect,
            ..Default::default()
        }
    }

    /// Ready-pattern deadline.
    #[must_use]
    pub const fn ready(mut self, timeout: Duration) -> Self {
        self.ready = timeout;
        self
    }

    /// Write deadline.
    #[must_use]
    pub const fn write(mut self, timeout: Duration) -> Self {
        self.write = timeout;
        self
    }
}

/// Limits on unconsumed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    /// Older text is dropped past this many bytes.
    pub max_size: usize,

    /// Bytes per read from the master.
    pub read_chunk: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

impl BufferConfig {
    /// Default limits with `max_size` bytes retained.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    /// Bytes per read.
    #[must_use]
    pub const fn read_chunk(mut self, size: usize) -> Self {
        self.read_chunk = size;
        self
    }
}

/// How a session is shut down.
///
/// Each stage is tried in order until the process has been reaped:
/// the optional exit command, then `signal` (followed by `SIGCONT`),
/// then `SIGKILL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateConfig {
    /// A line sent to ask the program to exit on its own.
    pub exit_command: Option<String>,

    /// Signal sent to the process group.
    pub signal: PtySignal,

    /// Wait after the exit command and after the signal.
    pub grace: Duration,

    /// Wait after `SIGKILL`.
    pub kill_grace: Duration,
}

impl Default for TerminateConfig {
    fn default() -> Self {
        Self {
            exit_command: None,
            signal: PtySignal::Hangup,
            grace: Duration::from_secs(1),
            kill_grace: Duration::from_secs(1),
        }
    }
}

impl TerminateConfig {
    /// `SIGHUP`, one second of grace, one second after `SIGKILL`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Send this line first and give the program a chance to exit.
    #[must_use]
    pub fn exit_command(mut self, line: impl Into<String>) -> Self {
        self.exit_command = Some(line.into());
        self
    }

    /// Replace `SIGHUP` with another signal.
    #[must_use]
    pub const fn signal(mut self, signal: PtySignal) -> Self {
        self.signal = signal;
        self
    }

    /// Wait after the exit command and after the signal.
    #[must_use]
    pub const fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Set the wait after `SIGKILL`.
    #[must_use]
    pub const fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

/// Line terminator appended to sent text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineEnding {
    /// `\n`.
    #[default]
    Lf,

    /// `\r\n`.
    CrLf,

    /// `\r`, which is what the Enter key sends.
    Cr,
}

impl LineEnding {
    /// The terminator text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }

    /// The terminator bytes.
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// How [`crate::logging::init`] sets up the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `tandem=debug`.
    pub level: String,

    /// Line layout.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// `info`, compact.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fallback filter directive.
    #[must_use]
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Line layout.
    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Layout of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-readable output.
    Pretty,

    /// Single-line human-readable output.
    #[default]
    Compact,

    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ExpectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ExpectError::invalid_argument(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Engine-wide defaults applied to scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Expect timeout for steps that do not set their own.
    pub expect_timeout: Duration,

    /// Ready-pattern timeout for sessions that do not set their own.
    pub ready_timeout: Duration,

    /// Shutdown sequence for every session.
    pub terminate: TerminateConfig,

    /// Subscriber settings.
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expect_timeout: DEFAULT_EXPECT_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            terminate: TerminateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read overrides from `TANDEM_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_config(&EnvConfig::default())
    }

    /// Read overrides through an explicit [`EnvConfig`].
    #[must_use]
    pub fn from_env_config(env: &EnvConfig) -> Self {
        let mut config = Self::default();

        if let Some(timeout) = env.duration_secs(vars::EXPECT_TIMEOUT) {
            config.expect_timeout = timeout;
        }
        if let Some(timeout) = env.duration_secs(vars::READY_TIMEOUT) {
            config.ready_timeout = timeout;
        }
        if let Some(grace) = env.duration_secs(vars::TERMINATE_GRACE) {
            config.terminate.grace = grace;
        }
        if let Some(level) = env.get(vars::LOG) {
            config.logging.level = level;
        }
        if let Some(format) = env.get(vars::LOG_FORMAT) {
            match format.parse() {
                Ok(format) => config.logging.format = format,
                Err(e) => tracing::warn!(error = %e, "ignoring {}", env.var_name(vars::LOG_FORMAT)),
            }
        }

        config
    }

    /// Override [`expect_timeout`](Self::expect_timeout).
    #[must_use]
    pub const fn expect_timeout(mut self, timeout: Duration) -> Self {
        self.expect_timeout = timeout;
        self
    }

    /// Override [`ready_timeout`](Self::ready_timeout).
    #[must_use]
    pub const fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Override [`terminate`](Self::terminate).
    #[must_use]
    pub fn terminate(mut self, terminate: TerminateConfig) -> Self {
        self.terminate = terminate;
        self
    }

    /// A [`SessionConfig`] for `command` with these defaults applied.
    #[must_use]
    pub fn session(&self, command: impl Into<String>) -> SessionConfig {
        self.apply(SessionConfig::new(command))
    }

    /// Overwrite the timeouts and termination settings of `config`.
    #[must_use]
    pub fn apply(&self, config: SessionConfig) -> SessionConfig {
        config
            .timeout(self.expect_timeout)
            .ready_timeout(self.ready_timeout)
            .terminate(self.terminate.clone())
    }
}
