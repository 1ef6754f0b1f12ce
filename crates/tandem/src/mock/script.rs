//! Behaviour of a mock program.

use std::time::Duration;

use super::event::MockEvent;

/// Events played when an input line contains `trigger`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    /// Substring that activates this responder.
    pub trigger: String,
    /// Events queued in response.
    pub events: Vec<MockEvent>,
}

/// Script for a mock program.
///
/// The initial events play as soon as the program starts. Every line of
/// input is checked against the responders in order and the first one whose
/// trigger it contains queues its events.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tandem::mock::MockScript;
///
/// let script = MockScript::new()
///     .output("kytos $> ")
///     .respond_after("napps install", Duration::from_millis(50), "Successfully installed\n")
///     .exit_on("exit", 0);
/// assert_eq!(script.responders().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    initial: Vec<MockEvent>,
    responders: Vec<Responder>,
    echo: bool,
    ignore_signals: bool,
}

impl MockScript {
    /// Create an empty script: no output, waits until signalled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `text` on start.
    #[must_use]
    pub fn output(mut self, text: impl Into<String>) -> Self {
        self.initial.push(MockEvent::output(text));
        self
    }

    /// Pause the initial events.
    #[must_use]
    pub fn delay(mut self, duration: Duration) -> Self {
        self.initial.push(MockEvent::delay(duration));
        self
    }

    /// Exit once the initial events have played.
    #[must_use]
    pub fn exit(mut self, code: i32) -> Self {
        self.initial.push(MockEvent::exit(code));
        self
    }

    /// Reply with `text` to input containing `trigger`.
    #[must_use]
    pub fn respond(self, trigger: impl Into<String>, text: impl Into<String>) -> Self {
        self.respond_events(trigger, vec![MockEvent::output(text)])
    }

    /// Reply with `text` after `delay` to input containing `trigger`.
    #[must_use]
    pub fn respond_after(
        self,
        trigger: impl Into<String>,
        delay: Duration,
        text: impl Into<String>,
    ) -> Self {
        self.respond_events(
            trigger,
            vec![MockEvent::delay(delay), MockEvent::output(text)],
        )
    }

    /// Exit with `code` on input containing `trigger`.
    #[must_use]
    pub fn exit_on(self, trigger: impl Into<String>, code: i32) -> Self {
        self.respond_events(trigger, vec![MockEvent::exit(code)])
    }

    /// Play `events` on input containing `trigger`.
    #[must_use]
    pub fn respond_events(mut self, trigger: impl Into<String>, events: Vec<MockEvent>) -> Self {
        self.responders.push(Responder {
            trigger: trigger.into(),
            events,
        });
        self
    }

    /// Echo every input line back, like a terminal in cooked mode.
    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Survive every signal except `SIGKILL`.
    #[must_use]
    pub const fn ignore_signals(mut self) -> Self {
        self.ignore_signals = true;
        self
    }

    /// Events played on start.
    #[must_use]
    pub fn initial(&self) -> &[MockEvent] {
        &self.initial
    }

    /// Configured responders.
    #[must_use]
    pub fn responders(&self) -> &[Responder] {
        &self.responders
    }

    /// Find the responder for an input line.
    #[must_use]
    pub fn responder_for(&self, line: &str) -> Option<&Responder> {
        self.responders
            .iter()
            .find(|r| line.contains(r.trigger.as_str()))
    }

    /// Check if input is echoed.
    #[must_use]
    pub const fn echoes(&self) -> bool {
        self.echo
    }

    /// Check if signals other than `SIGKILL` are ignored.
    #[must_use]
    pub const fn ignores_signals(&self) -> bool {
        self.ignore_signals
    }
}
