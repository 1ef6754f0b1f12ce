//! How a child is started on a pseudo-terminal, and which signals it can be
//! sent.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::PathBuf;

/// Settings for one child on a fresh PTY.
///
/// # Example
///
/// ```
/// use tandem_pty::PtyConfig;
///
/// let config = PtyConfig::builder()
///     .cwd("/tmp")
///     .set_env("TERM", "dumb")
///     .size(132, 43)
///     .echo(false)
///     .build();
/// assert!(!config.echo);
/// assert_eq!(config.size.cols, 132);
/// ```
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Directory the child starts in. `None` keeps ours.
    pub cwd: Option<PathBuf>,
    /// Environment handed to the child.
    pub env: ChildEnv,
    /// Terminal dimensions at spawn time.
    pub size: WindowSize,
    /// Line discipline echo.
    pub echo: bool,
    /// Run the child in a new session with the PTY as controlling terminal.
    /// Needed for job control and for hangup delivery on close.
    pub new_session: bool,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            cwd: None,
            env: ChildEnv::default(),
            size: WindowSize::default(),
            echo: true,
            new_session: true,
        }
    }
}

impl PtyConfig {
    /// Start building a config from the defaults.
    #[must_use]
    pub fn builder() -> PtyConfigBuilder {
        PtyConfigBuilder::default()
    }
}

/// The child's environment as a base plus edits.
#[derive(Debug, Clone)]
pub struct ChildEnv {
    /// Start from our own environment rather than an empty one.
    pub inherit: bool,
    /// Variables set or overridden.
    pub set: BTreeMap<OsString, OsString>,
    /// Variables removed. Wins over `set`.
    pub unset: BTreeSet<OsString>,
}

impl Default for ChildEnv {
    fn default() -> Self {
        Self {
            inherit: true,
            set: BTreeMap::new(),
            unset: BTreeSet::new(),
        }
    }
}

impl ChildEnv {
    /// The final variable list the child is started with.
    #[must_use]
    pub fn resolve(&self) -> BTreeMap<OsString, OsString> {
        let base = self
            .inherit
            .then(std::env::vars_os)
            .into_iter()
            .flatten();

        base.chain(self.set.iter().map(|(k, v)| (k.clone(), v.clone())))
            .filter(|(k, _)| !self.unset.contains(k))
            .collect()
    }
}

/// Builder for [`PtyConfig`].
#[derive(Debug, Clone, Default)]
pub struct PtyConfigBuilder {
    config: PtyConfig,
}

impl PtyConfigBuilder {
    /// Directory the child starts in.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cwd = Some(dir.into());
        self
    }

    /// Do not pass our own environment through.
    #[must_use]
    pub const fn isolated_env(mut self) -> Self {
        self.config.env.inherit = false;
        self
    }

    /// Set one variable.
    #[must_use]
    pub fn set_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.config.env.set.insert(key.into(), value.into());
        self
    }

    /// Remove one variable, inherited or set.
    #[must_use]
    pub fn unset_env(mut self, key: impl Into<OsString>) -> Self {
        self.config.env.unset.insert(key.into());
        self
    }

    /// Columns and rows at spawn time.
    #[must_use]
    pub const fn size(mut self, cols: u16, rows: u16) -> Self {
        self.config.size = WindowSize::new(cols, rows);
        self
    }

    /// Whether typed input is echoed back.
    #[must_use]
    pub const fn echo(mut self, on: bool) -> Self {
        self.config.echo = on;
        self
    }

    /// See [`PtyConfig::new_session`].
    #[must_use]
    pub const fn new_session(mut self, on: bool) -> Self {
        self.config.new_session = on;
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> PtyConfig {
        self.config
    }
}

/// Signals the engine delivers to a PTY child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PtySignal {
    /// SIGINT, what Ctrl-C would send.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGKILL. Cannot be caught or ignored.
    Kill,
    /// SIGHUP, as if the terminal went away.
    Hangup,
    /// SIGCONT. Lets a stopped child act on a pending signal.
    Continue,
}

impl PtySignal {
    /// Signal number for `kill(2)`.
    #[cfg(unix)]
    #[must_use]
    pub const fn as_unix_signal(self) -> i32 {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Hangup => libc::SIGHUP,
            Self::Continue => libc::SIGCONT,
        }
    }

    /// Upper-case name such as `SIGHUP`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
            Self::Hangup => "SIGHUP",
            Self::Continue => "SIGCONT",
        }
    }
}

impl std::fmt::Display for PtySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Columns.
    pub cols: u16,
    /// Rows.
    pub rows: u16,
}

impl WindowSize {
    /// Size from columns and rows.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for WindowSize {
    /// The classic 80x24.
    fn default() -> Self {
        Self::new(80, 24)
    }
}
