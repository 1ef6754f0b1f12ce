//! Scenario definitions.

use std::fmt;
use std::time::Duration;

use super::variables::Variables;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::expect::Pattern;
use crate::types::ControlChar;

/// A pattern template, resolved against the scenario variables when its
/// step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSpec {
    /// Literal text, matched with escape sequences ignored.
    Literal(String),
    /// Regular expression source.
    Regex(String),
}

impl PatternSpec {
    /// A literal template.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// A regex template.
    pub fn regex(source: impl Into<String>) -> Self {
        Self::Regex(source.into())
    }

    /// The unresolved template text.
    #[must_use]
    pub fn template(&self) -> &str {
        match self {
            Self::Literal(text) | Self::Regex(text) => text,
        }
    }

    /// Substitute `vars` and compile.
    ///
    /// Values are regex-escaped when substituted into a regex.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty literal or an invalid regex.
    pub fn resolve(&self, vars: &Variables) -> Result<Pattern> {
        match self {
            Self::Literal(text) => Pattern::literal(vars.substitute(text)),
            Self::Regex(source) => Pattern::regex(&vars.substitute_regex(source)),
        }
    }
}

impl fmt::Display for PatternSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => write!(f, "{text:?}"),
            Self::Regex(source) => write!(f, "/{source}/"),
        }
    }
}

/// Wait for one of several patterns on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectStep {
    /// Alternatives, in priority order for ties.
    pub patterns: Vec<PatternSpec>,
    /// Overrides the scenario default.
    pub timeout: Option<Duration>,
    /// Variable that receives capture group 1, or the whole match.
    pub save_as: Option<String>,
    /// Pattern indices whose match fails the step.
    pub fail_on: Vec<usize>,
}

impl ExpectStep {
    /// Expect any of `patterns`.
    #[must_use]
    pub fn new(patterns: Vec<PatternSpec>) -> Self {
        Self {
            patterns,
            timeout: None,
            save_as: None,
            fail_on: Vec::new(),
        }
    }

    /// Expect a single literal.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(vec![PatternSpec::literal(text)])
    }

    /// Expect a single regex.
    pub fn regex(source: impl Into<String>) -> Self {
        Self::new(vec![PatternSpec::regex(source)])
    }

    /// Add another alternative.
    #[must_use]
    pub fn or(mut self, pattern: PatternSpec) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Set the timeout for this step.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Save the captured text into a variable.
    #[must_use]
    pub fn save_as(mut self, name: impl Into<String>) -> Self {
        self.save_as = Some(name.into());
        self
    }

    /// Treat a match of alternative `index` as a failure.
    #[must_use]
    pub fn fail_on(mut self, index: usize) -> Self {
        self.fail_on.push(index);
        self
    }
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send a line of text.
    Send {
        /// Target session.
        session: String,
        /// Text template, without the line ending.
        text: String,
    },
    /// Send a control character.
    SendControl {
        /// Target session.
        session: String,
        /// Character to send.
        control: ControlChar,
    },
    /// Wait for output.
    Expect {
        /// Target session.
        session: String,
        /// What to wait for.
        expect: ExpectStep,
    },
    /// Pause the scenario.
    Sleep(Duration),
}

impl Step {
    /// A send step.
    pub fn send(session: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Send {
            session: session.into(),
            text: text.into(),
        }
    }

    /// A control-character step.
    pub fn control(session: impl Into<String>, control: ControlChar) -> Self {
        Self::SendControl {
            session: session.into(),
            control,
        }
    }

    /// An expect step.
    pub fn expect(session: impl Into<String>, expect: ExpectStep) -> Self {
        Self::Expect {
            session: session.into(),
            expect,
        }
    }

    /// A pause.
    #[must_use]
    pub const fn sleep(duration: Duration) -> Self {
        Self::Sleep(duration)
    }

    /// The session this step addresses, if any.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        match self {
            Self::Send { session, .. }
            | Self::SendControl { session, .. }
            | Self::Expect { session, .. } => Some(session),
            Self::Sleep(_) => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send { session, text } => write!(f, "send {text:?} to {session}"),
            Self::SendControl { session, control } => write!(f, "send {control} to {session}"),
            Self::Expect { session, expect } => {
                write!(f, "expect on {session}: ")?;
                for (i, p) in expect.patterns.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{p}")?;
                }
                Ok(())
            }
            Self::Sleep(d) => write!(f, "sleep {d:?}"),
        }
    }
}

/// A session a scenario spawns during setup.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// Registry name.
    pub name: String,
    /// How to start it.
    pub config: SessionConfig,
}

/// A named, ordered list of steps over declared sessions.
///
/// # Example
///
/// ```
/// use tandem::scenario::{ExpectStep, Scenario, Step};
/// use tandem::SessionConfig;
///
/// let scenario = Scenario::new("ping")
///     .session("control", SessionConfig::shell())
///     .send("control", "echo 64 bytes from 10.0.0.2: time=0.05 ms")
///     .expect("control", ExpectStep::regex(r"64 bytes from .*time=\d+(\.\d+)? ms"))
///     .teardown(Step::send("control", "exit"));
/// assert_eq!(scenario.steps.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    /// Scenario name, used in logs and reports.
    pub name: String,
    /// Sessions, spawned in this order.
    pub sessions: Vec<SessionSpec>,
    /// Steps, run in this order.
    pub steps: Vec<Step>,
    /// Best-effort cleanup steps run before sessions are terminated.
    pub teardown: Vec<Step>,
    /// Initial variables.
    pub variables: Variables,
    /// Expect timeout for steps without their own.
    pub default_timeout: Option<Duration>,
}

impl Scenario {
    /// Create an empty scenario.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declare a session.
    #[must_use]
    pub fn session(mut self, name: impl Into<String>, config: SessionConfig) -> Self {
        self.sessions.push(SessionSpec {
            name: name.into(),
            config,
        });
        self
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a send step.
    #[must_use]
    pub fn send(self, session: impl Into<String>, text: impl Into<String>) -> Self {
        self.step(Step::send(session, text))
    }

    /// Append an expect step.
    #[must_use]
    pub fn expect(self, session: impl Into<String>, expect: ExpectStep) -> Self {
        self.step(Step::expect(session, expect))
    }

    /// Append a teardown step.
    #[must_use]
    pub fn teardown(mut self, step: Step) -> Self {
        self.teardown.push(step);
        self
    }

    /// Set an initial variable.
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.set(name, value);
        self
    }

    /// Set the default expect timeout.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_in_order() {
        let scenario = Scenario::new("napps")
            .session("kytos", SessionConfig::new("kytos"))
            .session("mininet", SessionConfig::new("mn"))
            .var("napp", "of_lldp")
            .send("kytos", "napps install kytos/${napp}")
            .expect(
                "kytos",
                ExpectStep::literal("Successfully installed")
                    .or(PatternSpec::literal("kytos $> "))
                    .fail_on(1)
                    .timeout(Duration::from_secs(60)),
            )
            .step(Step::sleep(Duration::from_millis(10)))
            .teardown(Step::control("mininet", ControlChar::CtrlC));

        assert_eq!(scenario.sessions[1].name, "mininet");
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0].session(), Some("kytos"));
        assert_eq!(scenario.steps[2].session(), None);
        assert_eq!(scenario.variables.get("napp"), Some("of_lldp"));
        assert_eq!(
            scenario.steps[1].to_string(),
            r#"expect on kytos: "Successfully installed" | "kytos $> ""#
        );
    }

    #[test]
    fn pattern_templates_resolve() {
        let vars: Variables = [("host", "10.0.0.2")].into_iter().collect();

        let lit = PatternSpec::literal("from ${host}").resolve(&vars).unwrap();
        assert!(lit.is_literal());
        assert_eq!(lit.as_str(), "from 10.0.0.2");

        let re = PatternSpec::regex(r"from ${host}:").resolve(&vars).unwrap();
        assert_eq!(re.as_str(), r"from 10\.0\.0\.2:");

        assert!(PatternSpec::regex("(").resolve(&vars).is_err());
        assert!(PatternSpec::literal("").resolve(&vars).is_err());
    }
}
