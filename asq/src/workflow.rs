use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Opaque data map threaded through a workflow run unchanged.
pub type WorkflowContext = HashMap<String, serde_json::Value>;

/// Step action: `Ok(true)` is success, `Ok(false)` a failed attempt, and an
/// error a failed attempt with diagnostics. Errors are recorded and retried,
/// never re-raised out of the executor.
pub type StepAction = Arc<dyn Fn(&mut WorkflowContext) -> anyhow::Result<bool> + Send + Sync>;

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// One step of a workflow: a named opaque action with retry, timeout, and
/// required settings.
#[derive(Clone)]
pub struct WorkflowStep {
    pub name: String,
    action: StepAction,
    pub timeout: Duration,
    pub retry_count: u32,
    pub required: bool,
}

impl WorkflowStep {
    pub fn new(
        name: impl Into<String>,
        action: impl Fn(&mut WorkflowContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            timeout: DEFAULT_STEP_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            required: true,
        }
    }

    /// Wall-clock budget for the whole attempt loop of this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of retries after the first attempt (`retry_count + 1`
    /// attempts total).
    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Mark the step optional: exhausting its attempts skips it instead of
    /// aborting the run.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("required", &self.required)
            .finish()
    }
}

/// Outcome classification of a workflow run.
///
/// `TimedOut` and `Cancelled` are representable for callers that layer real
/// deadlines or cancellation around the executor; the base loop itself only
/// produces the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Succeeded,
    Failed,
    Partial,
    TimedOut,
    Cancelled,
}

/// Structured result of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    /// Names of steps that succeeded, in execution order.
    pub completed_steps: Vec<String>,
    /// Name of the required step that aborted the run, if any.
    pub failed_step: Option<String>,
    /// Diagnostics from the aborting step's last failed attempt.
    pub error_message: Option<String>,
    pub execution_time: Duration,
    /// The caller's context map, passed through unchanged by the executor
    /// (step actions may mutate it).
    pub context: WorkflowContext,
}

/// Runs steps in declared order, one at a time.
///
/// Failure is always reported as data in the [`WorkflowResult`]; `execute`
/// only returns `Err` for argument misuse. Timeouts are poll-style: an
/// attempt already in flight cannot be interrupted, the budget only stops
/// further attempts from being issued.
pub struct WorkflowExecutor {
    backoff: Duration,
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl WorkflowExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed sleep between attempts of one step (no exponential growth).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[instrument(skip(self, steps, context), fields(steps = steps.len()))]
    pub fn execute(
        &self,
        steps: &[WorkflowStep],
        context: WorkflowContext,
    ) -> Result<WorkflowResult, AutomationError> {
        let mut seen = HashSet::new();
        for step in steps {
            if step.name.trim().is_empty() {
                return Err(AutomationError::InvalidArgument(
                    "workflow step names must not be empty".to_string(),
                ));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(AutomationError::InvalidArgument(format!(
                    "duplicate workflow step name '{}'",
                    step.name
                )));
            }
        }

        let start = Instant::now();
        let mut context = context;
        let mut completed_steps: Vec<String> = Vec::new();

        for step in steps {
            match self.run_step(step, &mut context) {
                StepOutcome::Succeeded => {
                    debug!(step = %step.name, "step succeeded");
                    completed_steps.push(step.name.clone());
                }
                StepOutcome::Exhausted(last_error) => {
                    let error = AutomationError::StepFailed {
                        step: step.name.clone(),
                        message: last_error,
                    };
                    if step.required {
                        warn!(%error, "required step failed, aborting run");
                        return Ok(WorkflowResult {
                            status: WorkflowStatus::Failed,
                            completed_steps,
                            failed_step: Some(step.name.clone()),
                            error_message: Some(error.to_string()),
                            execution_time: start.elapsed(),
                            context,
                        });
                    }
                    debug!(%error, "optional step failed, continuing");
                }
            }
        }

        let status = if completed_steps.len() == steps.len() {
            WorkflowStatus::Succeeded
        } else {
            WorkflowStatus::Partial
        };

        Ok(WorkflowResult {
            status,
            completed_steps,
            failed_step: None,
            error_message: None,
            execution_time: start.elapsed(),
            context,
        })
    }

    fn run_step(&self, step: &WorkflowStep, context: &mut WorkflowContext) -> StepOutcome {
        let step_start = Instant::now();
        let attempts = step.retry_count.saturating_add(1);
        let mut last_error = format!("step '{}' was never attempted", step.name);

        for attempt in 1..=attempts {
            if attempt > 1 {
                thread::sleep(self.backoff);
            }

            match (step.action)(context) {
                Ok(true) => return StepOutcome::Succeeded,
                Ok(false) => {
                    last_error = format!(
                        "step '{}' reported failure on attempt {attempt}/{attempts}",
                        step.name
                    );
                }
                Err(error) => {
                    warn!(step = %step.name, attempt, %error, "step attempt raised an error");
                    last_error = error.to_string();
                }
            }

            // Wall-clock budget beats remaining retry budget.
            if step_start.elapsed() > step.timeout {
                last_error = format!(
                    "step '{}' exceeded its {:?} timeout after {attempt} attempt(s): {last_error}",
                    step.name, step.timeout
                );
                break;
            }
        }

        StepOutcome::Exhausted(last_error)
    }
}

enum StepOutcome {
    Succeeded,
    Exhausted(String),
}

/// Named workflows registered once and run repeatedly.
///
/// Running an unknown name yields a `Failed` result with an error message,
/// matching the executor's failure-as-data policy.
#[derive(Default)]
pub struct WorkflowRegistry {
    executor: WorkflowExecutor,
    workflows: HashMap<String, Vec<WorkflowStep>>,
}

impl WorkflowRegistry {
    pub fn new(executor: WorkflowExecutor) -> Self {
        Self {
            executor,
            workflows: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, steps: Vec<WorkflowStep>) {
        self.workflows.insert(name.into(), steps);
    }

    pub fn run(
        &self,
        name: &str,
        context: WorkflowContext,
    ) -> Result<WorkflowResult, AutomationError> {
        let Some(steps) = self.workflows.get(name) else {
            return Ok(WorkflowResult {
                status: WorkflowStatus::Failed,
                completed_steps: Vec::new(),
                failed_step: None,
                error_message: Some(format!("workflow '{name}' not found")),
                execution_time: Duration::ZERO,
                context,
            });
        };
        self.executor.execute(steps, context)
    }
}

#[cfg(test)]
mod workflow_tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor() -> WorkflowExecutor {
        WorkflowExecutor::new().with_backoff(Duration::ZERO)
    }

    fn always_ok(name: &str) -> WorkflowStep {
        WorkflowStep::new(name, |_| Ok(true))
    }

    fn always_fail(name: &str) -> WorkflowStep {
        WorkflowStep::new(name, |_| Ok(false))
    }

    #[test]
    fn test_full_success_in_order() {
        let steps = vec![always_ok("step1"), always_ok("step2"), always_ok("step3")];
        let result = executor().execute(&steps, WorkflowContext::new()).unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert_eq!(result.completed_steps, vec!["step1", "step2", "step3"]);
        assert_eq!(result.failed_step, None);
        assert_eq!(result.error_message, None);
    }

    #[test]
    fn test_required_failure_aborts_run() {
        let steps = vec![
            always_ok("step1"),
            always_fail("step2").with_retries(2),
            always_ok("step3"),
        ];
        let result = executor().execute(&steps, WorkflowContext::new()).unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.completed_steps, vec!["step1"]);
        assert_eq!(result.failed_step.as_deref(), Some("step2"));
        // Diagnostics carry the step-failure taxonomy, not a bare string.
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .contains("Workflow step 'step2' failed"));
    }

    #[test]
    fn test_optional_failure_yields_partial() {
        let steps = vec![
            always_ok("step1"),
            always_fail("step2").with_retries(0).optional(),
            always_ok("step3"),
        ];
        let result = executor().execute(&steps, WorkflowContext::new()).unwrap();
        assert_eq!(result.status, WorkflowStatus::Partial);
        assert_eq!(result.completed_steps, vec!["step1", "step3"]);
        assert_eq!(result.failed_step, None);
    }

    #[test]
    fn test_attempt_budget_is_retry_count_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let steps = vec![WorkflowStep::new("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        })
        .with_retries(3)
        .optional()];

        executor().execute(&steps, WorkflowContext::new()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_success_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let steps = vec![WorkflowStep::new("flaky", move |_| {
            // Fails twice, then succeeds.
            Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .with_retries(5)];

        let result = executor().execute(&steps, WorkflowContext::new()).unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_error_is_caught_and_reported_not_raised() {
        let steps = vec![
            WorkflowStep::new("boom", |_| Err(anyhow!("widget tree went away"))).with_retries(1),
        ];
        let result = executor().execute(&steps, WorkflowContext::new()).unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.failed_step.as_deref(), Some("boom"));
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .contains("widget tree went away"));
    }

    #[test]
    fn test_timeout_aborts_remaining_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let steps = vec![WorkflowStep::new("slow", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(false)
        })
        .with_timeout(Duration::from_millis(5))
        .with_retries(50)
        .optional()];

        executor().execute(&steps, WorkflowContext::new()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "budget beats retry count");
    }

    #[test]
    fn test_context_passes_through_and_steps_can_mutate_it() {
        let steps = vec![WorkflowStep::new("record", |ctx: &mut WorkflowContext| {
            ctx.insert("saved".to_string(), serde_json::json!(true));
            Ok(true)
        })];
        let mut context = WorkflowContext::new();
        context.insert("user".to_string(), serde_json::json!("alice"));

        let result = executor().execute(&steps, context).unwrap();
        assert_eq!(result.context["user"], serde_json::json!("alice"));
        assert_eq!(result.context["saved"], serde_json::json!(true));
    }

    #[test]
    fn test_duplicate_step_names_are_misuse() {
        let steps = vec![always_ok("same"), always_ok("same")];
        let err = executor().execute(&steps, WorkflowContext::new()).unwrap_err();
        assert!(matches!(err, AutomationError::InvalidArgument(_)));
    }

    #[test]
    fn test_registry_runs_named_workflow() {
        let mut registry = WorkflowRegistry::new(executor());
        registry.register("login", vec![always_ok("open"), always_ok("submit")]);

        let result = registry.run("login", WorkflowContext::new()).unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);

        let missing = registry.run("logout", WorkflowContext::new()).unwrap();
        assert_eq!(missing.status, WorkflowStatus::Failed);
        assert!(missing.error_message.unwrap().contains("not found"));
    }

    #[test]
    fn test_result_round_trips_through_json() {
        let steps = vec![always_ok("open"), always_fail("save").with_retries(0)];
        let mut context = WorkflowContext::new();
        context.insert("user".to_string(), serde_json::json!("alice"));
        let result = executor().execute(&steps, context).unwrap();

        let json = serde_json::to_string(&result).unwrap();
        let parsed: WorkflowResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, WorkflowStatus::Failed);
        assert_eq!(parsed.completed_steps, vec!["open"]);
        assert_eq!(parsed.failed_step.as_deref(), Some("save"));
        assert_eq!(parsed.context["user"], serde_json::json!("alice"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
        let parsed: WorkflowStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, WorkflowStatus::Cancelled);
    }
}
