//! Scenario execution engine.

use std::rc::Rc;
use std::time::Instant;

use exitguard_membrane::{ExitCoordinator, Unwound, catch_termination, payload_message};

use crate::expectation::{ExpectationSpec, MarkerSet};
use crate::lifecycle::TestLifecycleController;
use crate::structured_log::{LogEmitter, LogLevel, Outcome, StreamKind, event};

/// One named test body with its method-level markers.
pub struct Scenario<'a> {
    pub name: String,
    pub markers: MarkerSet,
    body: Box<dyn FnOnce() + 'a>,
}

impl std::fmt::Debug for Scenario<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

impl<'a> Scenario<'a> {
    #[must_use]
    pub fn new(name: impl Into<String>, markers: MarkerSet, body: impl FnOnce() + 'a) -> Self {
        Self {
            name: name.into(),
            markers,
            body: Box::new(body),
        }
    }

    /// One scenario per parameter, named `name [1]`, `name [2]`, ... Each
    /// iteration is its own cycle.
    pub fn parameterized<T: 'a>(
        name: &str,
        markers: MarkerSet,
        params: impl IntoIterator<Item = T>,
        body: impl Fn(T) + 'a,
    ) -> Vec<Self> {
        let body = Rc::new(body);
        params
            .into_iter()
            .enumerate()
            .map(|(i, param)| {
                let body = Rc::clone(&body);
                Self::new(format!("{name} [{}]", i + 1), markers, move || body(param))
            })
            .collect()
    }
}

/// Result of one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioResult {
    pub name: String,
    pub expectation: ExpectationSpec,
    pub observed: Option<i32>,
    pub requests: u64,
    pub outcome: Outcome,
    /// Violation or panic message when the scenario did not pass.
    pub failure: Option<String>,
    pub duration_ms: u64,
}

impl ScenarioResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Runs scenarios of one test class through a single controller.
#[derive(Debug)]
pub struct ScenarioRunner<'c> {
    /// Name of the test class or campaign.
    pub campaign: String,
    class_markers: MarkerSet,
    controller: TestLifecycleController<'c>,
}

impl ScenarioRunner<'static> {
    /// A runner on the global coordinator.
    #[must_use]
    pub fn global(campaign: impl Into<String>) -> Self {
        Self::with_controller(campaign, TestLifecycleController::global())
    }
}

impl<'c> ScenarioRunner<'c> {
    #[must_use]
    pub fn new(campaign: impl Into<String>, coordinator: &'c ExitCoordinator) -> Self {
        Self::with_controller(campaign, TestLifecycleController::new(coordinator))
    }

    fn with_controller(campaign: impl Into<String>, controller: TestLifecycleController<'c>) -> Self {
        Self {
            campaign: campaign.into(),
            class_markers: MarkerSet::new(),
            controller,
        }
    }

    /// Markers that apply to every scenario without its own expectation.
    #[must_use]
    pub fn with_class_markers(mut self, markers: MarkerSet) -> Self {
        self.class_markers = markers;
        self
    }

    /// Run every scenario in order. A scenario that panics is recorded as an
    /// error and the run continues.
    pub fn run(&mut self, scenarios: Vec<Scenario<'_>>) -> Vec<ScenarioResult> {
        scenarios.into_iter().map(|s| self.run_one(s)).collect()
    }

    /// [`run`](Self::run), writing a `cycle_start` and `cycle_end` line per
    /// scenario.
    pub fn run_logged(
        &mut self,
        scenarios: Vec<Scenario<'_>>,
        emitter: &mut LogEmitter,
    ) -> std::io::Result<Vec<ScenarioResult>> {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let expectation = MarkerSet::resolve(&scenario.markers, &self.class_markers);
            let start = emitter
                .entry(LogLevel::Info, event::CYCLE_START)
                .with_stream(StreamKind::Lifecycle)
                .with_scenario(&scenario.name, expectation.to_string())
                .with_details(serde_json::json!({ "campaign": self.campaign }));
            emitter.emit_entry(start)?;

            let result = self.run_one(scenario);

            let level = if result.passed() {
                LogLevel::Info
            } else {
                LogLevel::Error
            };
            let mut end = emitter
                .entry(level, event::CYCLE_END)
                .with_stream(StreamKind::Lifecycle)
                .with_scenario(&result.name, result.expectation.to_string())
                .with_outcome(result.outcome)
                .with_exit_code(result.observed)
                .with_request_count(result.requests)
                .with_duration_ms(result.duration_ms);
            if let Some(failure) = &result.failure {
                end = end.with_details(serde_json::json!({ "message": failure }));
            }
            emitter.emit_entry(end)?;
            results.push(result);
        }
        emitter.flush()?;
        Ok(results)
    }

    fn run_one(&mut self, scenario: Scenario<'_>) -> ScenarioResult {
        let Scenario { name, markers, body } = scenario;
        let expectation = MarkerSet::resolve(&markers, &self.class_markers);
        let started = Instant::now();
        let run = catch_termination(|| self.controller.run(expectation, body));
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let last = self.controller.last_outcome().copied();
        let (observed, requests) = last.map_or((None, 0), |o| (o.observed, o.requests));
        let (outcome, failure) = match run {
            Ok(Ok(_)) => (Outcome::Pass, None),
            Ok(Err(violation)) => (Outcome::Fail, Some(violation.to_string())),
            Err(Unwound::Foreign(payload)) => (Outcome::Error, Some(payload_message(payload.as_ref()))),
            // The controller catches the signal itself; this is a stray
            // request made after the cycle ended.
            Err(Unwound::Terminated(signal)) => (Outcome::Error, Some(signal.to_string())),
        };

        ScenarioResult {
            name,
            expectation,
            observed,
            requests,
            outcome,
            failure,
            duration_ms,
        }
    }
}
