//! TOML scenario files.
//!
//! ```toml
//! name = "ping"
//! timeout = 10
//!
//! [vars]
//! host = "10.0.0.2"
//!
//! [[session]]
//! name = "control"
//! shell = true
//!
//! [[step]]
//! session = "control"
//! send = "echo 64 bytes from ${host}: icmp_seq=1 ttl=64 time=0.05 ms"
//!
//! [[step]]
//! session = "control"
//! expect = [{ regex = '64 bytes from .*time=\d+(\.\d+)? ms' }]
//! timeout = 5
//! save = "line"
//!
//! [[teardown]]
//! session = "control"
//! send = "exit"
//! ```
//!
//! Timeouts are fractional seconds. A pattern is either a plain string
//! (literal), `{ literal = "..." }`, or `{ regex = "..." }`; `expect` takes
//! one pattern or a list of them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::definition::{ExpectStep, PatternSpec, Scenario, SessionSpec, Step};
use super::variables::Variables;
use crate::config::{timeout_from_secs, EngineConfig, LineEnding, SessionConfig, TerminateConfig};
use crate::error::{ExpectError, Result};
use crate::types::ControlChar;

/// A scenario as written in a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Scenario name.
    pub name: String,

    /// Default expect timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Initial variables.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Sessions, in spawn order.
    #[serde(default, rename = "session")]
    pub sessions: Vec<SessionEntry>,

    /// Steps, in run order.
    #[serde(default, rename = "step")]
    pub steps: Vec<StepEntry>,

    /// Teardown steps.
    #[serde(default)]
    pub teardown: Vec<StepEntry>,
}

/// A `[[session]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionEntry {
    /// Registry name.
    pub name: String,

    /// Program to run. Required unless `shell` is set.
    #[serde(default)]
    pub command: Option<String>,

    /// Start `/bin/sh` with the fixed prompt as ready pattern.
    #[serde(default)]
    pub shell: bool,

    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Ready pattern.
    #[serde(default)]
    pub ready: Option<PatternEntry>,

    /// Ready timeout in seconds.
    #[serde(default)]
    pub ready_timeout: Option<f64>,

    /// Terminal echo.
    #[serde(default)]
    pub echo: Option<bool>,

    /// Line ending appended by `send`.
    #[serde(default)]
    pub line_ending: Option<LineEndingEntry>,

    /// Line sent first when terminating.
    #[serde(default)]
    pub exit_command: Option<String>,
}

/// Line ending names accepted in files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEndingEntry {
    /// `\n`
    Lf,
    /// `\r\n`
    Crlf,
    /// `\r`
    Cr,
}

impl From<LineEndingEntry> for LineEnding {
    fn from(entry: LineEndingEntry) -> Self {
        match entry {
            LineEndingEntry::Lf => Self::Lf,
            LineEndingEntry::Crlf => Self::CrLf,
            LineEndingEntry::Cr => Self::Cr,
        }
    }
}

/// A pattern in a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatternEntry {
    /// Bare string, taken literally.
    Text(String),
    /// `{ literal = "..." }`
    Literal {
        /// Literal text.
        literal: String,
    },
    /// `{ regex = "..." }`
    Regex {
        /// Regex source.
        regex: String,
    },
}

impl From<PatternEntry> for PatternSpec {
    fn from(entry: PatternEntry) -> Self {
        match entry {
            PatternEntry::Text(text) | PatternEntry::Literal { literal: text } => {
                Self::Literal(text)
            }
            PatternEntry::Regex { regex } => Self::Regex(regex),
        }
    }
}

/// One pattern or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    /// Alternatives.
    Many(Vec<PatternEntry>),
    /// A single pattern.
    One(PatternEntry),
}

impl PatternList {
    fn into_vec(self) -> Vec<PatternEntry> {
        match self {
            Self::One(p) => vec![p],
            Self::Many(ps) => ps,
        }
    }
}

/// A `[[step]]` or `[[teardown]]` table. Exactly one of `send`, `control`,
/// `expect` or `sleep` must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepEntry {
    /// Target session.
    #[serde(default)]
    pub session: Option<String>,

    /// Line to send.
    #[serde(default)]
    pub send: Option<String>,

    /// Control key to send, e.g. `"c"` for Ctrl-C.
    #[serde(default)]
    pub control: Option<char>,

    /// Patterns to wait for.
    #[serde(default)]
    pub expect: Option<PatternList>,

    /// Pause in seconds.
    #[serde(default)]
    pub sleep: Option<f64>,

    /// Expect timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Variable receiving the capture.
    #[serde(default)]
    pub save: Option<String>,

    /// Alternatives that fail the step.
    #[serde(default)]
    pub fail_on: Vec<usize>,
}

impl ScenarioFile {
    /// Parse a scenario from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the text is not a valid scenario file.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| ExpectError::invalid_argument(format!("invalid scenario file: {e}")))
    }

    /// Read and parse a scenario file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, or the parse error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExpectError::io_context(format!("reading scenario file {}", path.display()), e)
        })?;
        let file = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), name = %file.name, "loaded scenario file");
        Ok(file)
    }

    /// Validate and convert into a runnable [`Scenario`].
    ///
    /// `engine` supplies the timeouts and termination settings of every
    /// session; per-session fields in the file override them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the offending session or step.
    pub fn into_scenario(self, engine: &EngineConfig) -> Result<Scenario> {
        let variables: Variables = self.vars.into_iter().collect();

        let sessions = self
            .sessions
            .into_iter()
            .map(|entry| session_spec(entry, engine, &variables))
            .collect::<Result<Vec<_>>>()?;
        let steps = convert_steps("step", self.steps)?;
        let teardown = convert_steps("teardown", self.teardown)?;
        let default_timeout = self.timeout.map(timeout_from_secs).transpose()?;

        Ok(Scenario {
            name: self.name,
            sessions,
            steps,
            teardown,
            variables,
            default_timeout,
        })
    }
}

fn session_spec(entry: SessionEntry, engine: &EngineConfig, vars: &Variables) -> Result<SessionSpec> {
    let invalid = |msg: &str| {
        ExpectError::invalid_argument(format!("session '{}': {msg}", entry.name))
    };

    let base = match (&entry.command, entry.shell) {
        (Some(command), false) => SessionConfig::new(vars.substitute(command)),
        (None, true) => SessionConfig::shell(),
        (Some(_), true) => return Err(invalid("set either `command` or `shell`, not both")),
        (None, false) => return Err(invalid("missing `command`")),
    };
    let mut config = engine.apply(base).args(entry.args.iter().map(|a| vars.substitute(a)));

    for (key, value) in &entry.env {
        config = config.env(key, vars.substitute(value));
    }
    if let Some(cwd) = &entry.cwd {
        config = config.working_dir(cwd);
    }
    if let Some(ready) = entry.ready.clone() {
        let pattern = PatternSpec::from(ready)
            .resolve(vars)
            .map_err(|e| invalid(&format!("ready pattern: {e}")))?;
        config = config.ready(pattern);
    }
    if let Some(secs) = entry.ready_timeout {
        config = config.ready_timeout(timeout_from_secs(secs)?);
    }
    if let Some(echo) = entry.echo {
        config = config.echo(echo);
    }
    if let Some(ending) = entry.line_ending {
        config = config.line_ending(ending.into());
    }
    if let Some(exit) = &entry.exit_command {
        let terminate: TerminateConfig = config.terminate.clone().exit_command(exit.clone());
        config = config.terminate(terminate);
    }

    Ok(SessionSpec {
        name: entry.name,
        config,
    })
}

fn convert_steps(table: &str, entries: Vec<StepEntry>) -> Result<Vec<Step>> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            convert_step(entry).map_err(|e| {
                ExpectError::invalid_argument(format!("[[{table}]] #{}: {}", i + 1, reason(&e)))
            })
        })
        .collect()
}

fn reason(err: &ExpectError) -> String {
    match err {
        ExpectError::InvalidArgument { message } => message.clone(),
        other => other.to_string(),
    }
}

fn convert_step(entry: StepEntry) -> Result<Step> {
    let actions = [
        entry.send.is_some(),
        entry.control.is_some(),
        entry.expect.is_some(),
        entry.sleep.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count();
    if actions != 1 {
        return Err(ExpectError::invalid_argument(
            "exactly one of `send`, `control`, `expect` or `sleep` is required",
        ));
    }
    let is_expect = entry.expect.is_some();
    if !is_expect && (entry.timeout.is_some() || entry.save.is_some() || !entry.fail_on.is_empty()) {
        return Err(ExpectError::invalid_argument(
            "`timeout`, `save` and `fail_on` only apply to `expect`",
        ));
    }

    if let Some(secs) = entry.sleep {
        if entry.session.is_some() {
            return Err(ExpectError::invalid_argument("`sleep` takes no `session`"));
        }
        let duration = std::time::Duration::try_from_secs_f64(secs)
            .map_err(|e| ExpectError::invalid_argument(format!("sleep {secs}: {e}")))?;
        return Ok(Step::sleep(duration));
    }

    let session = entry
        .session
        .ok_or_else(|| ExpectError::invalid_argument("missing `session`"))?;

    if let Some(text) = entry.send {
        return Ok(Step::send(session, text));
    }
    if let Some(key) = entry.control {
        let control = ControlChar::from_char(key).ok_or_else(|| {
            ExpectError::invalid_argument(format!("unknown control key '{key}'"))
        })?;
        return Ok(Step::control(session, control));
    }

    let patterns: Vec<PatternSpec> = entry
        .expect
        .map(PatternList::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(PatternSpec::from)
        .collect();
    if patterns.is_empty() {
        return Err(ExpectError::invalid_argument("`expect` has no patterns"));
    }
    if let Some(bad) = entry.fail_on.iter().find(|&&i| i >= patterns.len()) {
        return Err(ExpectError::invalid_argument(format!(
            "`fail_on` index {bad} out of range for {} patterns",
            patterns.len()
        )));
    }
    // Templates with variables compile when the step runs.
    for p in &patterns {
        if !p.template().contains('$') {
            p.resolve(&Variables::new())?;
        }
    }

    let mut expect = ExpectStep::new(patterns);
    expect.fail_on = entry.fail_on;
    expect.save_as = entry.save;
    if let Some(secs) = entry.timeout {
        expect = expect.timeout(timeout_from_secs(secs)?);
    }
    Ok(Step::expect(session, expect))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const PING: &str = r#"
name = "ping"
timeout = 2.5

[vars]
host = "10.0.0.2"

[[session]]
name = "control"
command = "/bin/sh"
args = ["-i"]
ready = { regex = '\$ $' }
ready_timeout = 3
exit_command = "exit"

[[step]]
session = "control"
send = "echo 64 bytes from ${host}: icmp_seq=1 ttl=64 time=0.05 ms"

[[step]]
session = "control"
expect = [{ regex = '64 bytes from 10.0.0.2: icmp_seq=\d+ ttl=64 time=\d+(\.\d+)? ms' }, "unreachable"]
timeout = 5
save = "line"
fail_on = [1]

[[step]]
sleep = 0.1

[[teardown]]
session = "control"
control = "c"
"#;

    #[test]
    fn parses_ping_file() {
        let file = ScenarioFile::from_toml_str(PING).unwrap();
        assert_eq!(file.name, "ping");
        assert_eq!(file.sessions.len(), 1);
        assert_eq!(file.steps.len(), 3);

        let scenario = file.into_scenario(&EngineConfig::default()).unwrap();
        assert_eq!(scenario.default_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(scenario.variables.get("host"), Some("10.0.0.2"));

        let control = &scenario.sessions[0].config;
        assert_eq!(control.args, ["-i"]);
        assert_eq!(control.timeout.ready, Duration::from_secs(3));
        assert_eq!(control.terminate.exit_command.as_deref(), Some("exit"));
        assert!(control.ready.is_some());

        match &scenario.steps[1] {
            Step::Expect { session, expect } => {
                assert_eq!(session, "control");
                assert_eq!(
                    expect.patterns[0],
                    PatternSpec::regex(
                        r"64 bytes from 10.0.0.2: icmp_seq=\d+ ttl=64 time=\d+(\.\d+)? ms"
                    )
                );
                assert_eq!(expect.patterns[1], PatternSpec::literal("unreachable"));
                assert_eq!(expect.timeout, Some(Duration::from_secs(5)));
                assert_eq!(expect.save_as.as_deref(), Some("line"));
                assert_eq!(expect.fail_on, [1]);
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(scenario.steps[2], Step::sleep(Duration::from_millis(100)));
        assert_eq!(
            scenario.teardown[0],
            Step::control("control", ControlChar::CtrlC)
        );
    }

    #[test]
    fn engine_defaults_reach_sessions() {
        let text = r#"
name = "defaults"
[[session]]
name = "sh"
shell = true
"#;
        let engine = EngineConfig::default().ready_timeout(Duration::from_secs(9));
        let scenario = ScenarioFile::from_toml_str(text)
            .unwrap()
            .into_scenario(&engine)
            .unwrap();
        let config = &scenario.sessions[0].config;
        assert_eq!(config.command, "/bin/sh");
        assert_eq!(config.timeout.ready, Duration::from_secs(9));
        assert!(config.ready.is_some());
    }

    #[test]
    fn rejects_ambiguous_steps() {
        let text = r#"
name = "bad"
[[step]]
session = "a"
send = "x"
expect = "y"
"#;
        let err = ScenarioFile::from_toml_str(text)
            .unwrap()
            .into_scenario(&EngineConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("[[step]] #1"));
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn rejects_bad_fields() {
        let cases = [
            "name = \"x\"\n[[step]]\nsend = \"no session\"\n",
            "name = \"x\"\n[[step]]\nsession = \"a\"\nexpect = []\n",
            "name = \"x\"\n[[step]]\nsession = \"a\"\nexpect = \"y\"\nfail_on = [3]\n",
            "name = \"x\"\n[[step]]\nsession = \"a\"\nsend = \"y\"\ntimeout = 1\n",
            "name = \"x\"\n[[step]]\nsession = \"a\"\nexpect = { regex = \"(\" }\n",
            "name = \"x\"\n[[step]]\nsession = \"a\"\ncontrol = \"q\"\n",
            "name = \"x\"\n[[step]]\nsession = \"a\"\nexpect = \"y\"\ntimeout = 0\n",
            "name = \"x\"\n[[session]]\nname = \"a\"\n",
        ];
        for text in cases {
            let result = ScenarioFile::from_toml_str(text)
                .and_then(|f| f.into_scenario(&EngineConfig::default()));
            assert!(
                matches!(result, Err(ExpectError::InvalidArgument { .. })),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn unknown_keys_are_errors() {
        let err = ScenarioFile::from_toml_str("name = \"x\"\nstesp = []\n").unwrap_err();
        assert!(err.to_string().contains("invalid scenario file"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ScenarioFile::load("/nonexistent/tandem/scenario.toml").unwrap_err();
        assert!(matches!(err, ExpectError::Io { .. }));
    }
}
