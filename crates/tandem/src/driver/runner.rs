//! Scenario execution.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use tracing::Instrument;

use super::outcome::{
    DriverState, FailureCause, MatchRecord, Phase, ScenarioOutcome, SessionReport, StepRecord,
};
use crate::backend::{PtySpawner, Spawner};
use crate::error::{ExpectError, Result};
use crate::registry::SessionRegistry;
use crate::scenario::{ExpectStep, Scenario, Step, Variables};
use crate::types::MatchResult;

/// Runs scenarios against sessions started by a [`Spawner`].
///
/// Every run goes through setup, steps and teardown. Teardown always runs,
/// whether the run passed, failed or was aborted, and leaves every spawned
/// session terminated.
///
/// # Example
///
/// ```ignore
/// use tandem::driver::ScenarioRunner;
/// use tandem::scenario::{ExpectStep, Scenario};
/// use tandem::SessionConfig;
///
/// # async fn demo() {
/// let scenario = Scenario::new("hello")
///     .session("sh", SessionConfig::shell())
///     .send("sh", "echo hi-$((1 + 1))")
///     .expect("sh", ExpectStep::literal("hi-2"));
///
/// let outcome = ScenarioRunner::new().run(&scenario).await;
/// assert!(outcome.passed(), "{outcome}");
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner<S = PtySpawner> {
    spawner: S,
}

impl ScenarioRunner<PtySpawner> {
    /// A runner that spawns real processes on pseudo-terminals.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            spawner: PtySpawner,
        }
    }
}

impl<S: Spawner> ScenarioRunner<S> {
    /// A runner that spawns through `spawner`.
    pub const fn with_spawner(spawner: S) -> Self {
        Self { spawner }
    }

    /// The spawner in use.
    pub const fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Run `scenario` to completion.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioOutcome {
        self.run_until(scenario, std::future::pending::<()>()).await
    }

    /// Run `scenario`, giving up on setup and steps once `abort` completes.
    ///
    /// An abort fails the run with an `Aborted` cause. Teardown still runs
    /// and cannot be aborted.
    pub async fn run_until<F>(&self, scenario: &Scenario, abort: F) -> ScenarioOutcome
    where
        F: Future,
    {
        let span = tracing::info_span!("scenario", name = %scenario.name);
        self.execute(scenario, abort).instrument(span).await
    }

    async fn execute<F: Future>(&self, scenario: &Scenario, abort: F) -> ScenarioOutcome {
        let started = Instant::now();
        let mut run = Run::new(scenario);
        tracing::info!(
            sessions = scenario.sessions.len(),
            steps = scenario.steps.len(),
            "scenario started"
        );

        let finished = tokio::select! {
            cause = run.setup_and_steps(&self.spawner) => Some(cause),
            _ = abort => None,
        };
        let cause = finished.unwrap_or_else(|| {
            tracing::warn!(state = %run.state, "scenario aborted");
            Some(FailureCause::aborted(run.phase(), run.current_step))
        });

        run.enter(DriverState::TearingDown);
        run.teardown().instrument(tracing::info_span!("teardown")).await;
        run.enter(if cause.is_some() {
            DriverState::Failed
        } else {
            DriverState::Done
        });

        match &cause {
            None => tracing::info!(warnings = run.warnings.len(), "scenario passed"),
            Some(cause) => tracing::warn!(%cause, "scenario failed"),
        }

        ScenarioOutcome {
            scenario: scenario.name.clone(),
            state: run.state,
            cause,
            sessions: run
                .registry
                .states()
                .into_iter()
                .map(|(name, state)| SessionReport {
                    name,
                    state: state.into(),
                })
                .collect(),
            steps: run.records,
            warnings: run.warnings,
            variables: run.variables,
            duration_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Failure of a single step.
enum StepError {
    Engine(ExpectError),
    UnexpectedMatch { index: usize, matched: String },
}

impl From<ExpectError> for StepError {
    fn from(err: ExpectError) -> Self {
        Self::Engine(err)
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "{e}"),
            Self::UnexpectedMatch { index, matched } => {
                write!(f, "matched failure alternative [{index}] {matched:?}")
            }
        }
    }
}

/// State of one run.
struct Run<'a> {
    scenario: &'a Scenario,
    registry: SessionRegistry,
    variables: Variables,
    state: DriverState,
    current_step: Option<usize>,
    records: Vec<StepRecord>,
    warnings: Vec<String>,
}

impl<'a> Run<'a> {
    fn new(scenario: &'a Scenario) -> Self {
        Self {
            scenario,
            registry: SessionRegistry::new(),
            variables: scenario.variables.clone(),
            state: DriverState::Idle,
            current_step: None,
            records: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, state: DriverState) {
        tracing::debug!(from = %self.state, to = %state, "driver state");
        self.state = state;
    }

    const fn phase(&self) -> Phase {
        match self.state {
            DriverState::Idle | DriverState::SettingUp => Phase::Setup,
            _ => Phase::Steps,
        }
    }

    async fn setup_and_steps<S: Spawner>(&mut self, spawner: &S) -> Option<FailureCause> {
        self.enter(DriverState::SettingUp);
        if let Err(cause) = self.setup(spawner).instrument(tracing::info_span!("setup")).await {
            return Some(cause);
        }

        self.enter(DriverState::Running);
        let scenario = self.scenario;
        for (index, step) in scenario.steps.iter().enumerate() {
            self.current_step = Some(index);
            let span = tracing::info_span!("step", index, session = step.session().unwrap_or("-"));
            if let Err(cause) = self.run_step(index, step).instrument(span).await {
                return Some(cause);
            }
        }
        self.current_step = None;
        None
    }

    async fn setup<S: Spawner>(&mut self, spawner: &S) -> std::result::Result<(), FailureCause> {
        let fail = |name: &str, e: &ExpectError| {
            FailureCause::from_error(Phase::Setup, None, Some(name), e)
        };

        for spec in &self.scenario.sessions {
            self.registry
                .declare(&spec.name)
                .map_err(|e| fail(&spec.name, &e))?;
        }
        for spec in &self.scenario.sessions {
            tracing::debug!(session = %spec.name, command = %spec.config.display_command(), "spawning");
            self.registry
                .spawn(spawner, &spec.name, spec.config.clone())
                .await
                .map_err(|e| fail(&spec.name, &e))?;
        }
        Ok(())
    }

    async fn run_step(&mut self, index: usize, step: &Step) -> std::result::Result<(), FailureCause> {
        let started = Instant::now();
        let session = step.session();

        match self.perform(step).await {
            Ok(matched) => {
                self.records.push(StepRecord {
                    index,
                    session: session.map(str::to_string),
                    description: step.to_string(),
                    matched,
                    duration_ms: elapsed_ms(started),
                });
                Ok(())
            }
            Err(StepError::Engine(e)) => {
                Err(FailureCause::from_error(Phase::Steps, Some(index), session, &e))
            }
            Err(StepError::UnexpectedMatch { index: alt, matched }) => Err(
                FailureCause::unexpected_match(index, session.unwrap_or_default(), alt, matched),
            ),
        }
    }

    async fn perform(&mut self, step: &Step) -> std::result::Result<Option<MatchRecord>, StepError> {
        match step {
            Step::Send { session, text } => {
                let line = self.variables.substitute(text);
                self.registry.get_mut(session)?.send(&line).await?;
                Ok(None)
            }
            Step::SendControl { session, control } => {
                self.registry.get_mut(session)?.send_control(*control).await?;
                Ok(None)
            }
            Step::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(None)
            }
            Step::Expect { session, expect } => self.expect(session, expect).await,
        }
    }

    async fn expect(
        &mut self,
        session: &str,
        expect: &ExpectStep,
    ) -> std::result::Result<Option<MatchRecord>, StepError> {
        let patterns = expect
            .patterns
            .iter()
            .map(|p| p.resolve(&self.variables))
            .collect::<Result<Vec<_>>>()?;

        let default_timeout = self.scenario.default_timeout;
        let target = self.registry.get_mut(session)?;
        let timeout = expect
            .timeout
            .or(default_timeout)
            .unwrap_or(target.config().timeout.expect);
        let m = target.expect(&patterns, timeout).await?;

        if expect.fail_on.contains(&m.index) {
            return Err(StepError::UnexpectedMatch {
                index: m.index,
                matched: m.matched,
            });
        }
        self.save_captures(expect, &m);
        Ok(Some(MatchRecord {
            index: m.index,
            text: m.matched,
        }))
    }

    fn save_captures(&mut self, expect: &ExpectStep, m: &MatchResult) {
        for (name, value) in &m.named {
            self.variables.set(name.clone(), value.clone());
        }
        if let Some(var) = &expect.save_as {
            let value = m.group(1).unwrap_or(&m.matched).to_string();
            tracing::debug!(variable = %var, "saved capture");
            tracing::trace!(variable = %var, %value, "capture value");
            self.variables.set(var.clone(), value);
        }
    }

    async fn teardown(&mut self) {
        let scenario = self.scenario;
        for (index, step) in scenario.teardown.iter().enumerate() {
            if let Err(e) = self.perform(step).await {
                tracing::warn!(index, error = %e, "teardown step failed");
                self.warnings
                    .push(format!("teardown step {index} ({step}): {e}"));
            }
        }
        let warnings = self.registry.terminate_all().await;
        self.warnings.extend(warnings);
    }
}
