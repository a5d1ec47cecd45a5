//! Declarative verification checks.
//!
//! A [`Check`] pairs a predicate over the current filesystem and environment
//! with a function describing the outcome. [`run`] evaluates every check in
//! declared order and never stops early: a predicate that returns an error
//! or panics produces a failed result carrying the diagnostic, and the next
//! check runs as usual. How many checks failed is for the caller to judge.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;
use tracing::warn;

use crate::errors::ProvisionError;

type Predicate<'a> = Box<dyn Fn() -> anyhow::Result<bool> + 'a>;
type Detail<'a> = Box<dyn Fn(bool) -> String + 'a>;

/// One named check.
pub struct Check<'a> {
    name: String,
    predicate: Predicate<'a>,
    detail: Detail<'a>,
}

impl<'a> Check<'a> {
    /// Creates a check. `detail` receives the predicate's outcome.
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn() -> anyhow::Result<bool> + 'a,
        detail: impl Fn(bool) -> String + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            detail: Box::new(detail),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self) -> CheckResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let passed = (self.predicate)()?;
            Ok::<_, anyhow::Error>((passed, (self.detail)(passed)))
        }));

        let (passed, detail) = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => self.captured(format!("error: {e:#}")),
            Err(payload) => self.captured(format!("panicked: {}", panic_message(&*payload))),
        };

        CheckResult {
            name: self.name.clone(),
            passed,
            detail,
        }
    }

    /// Logs a predicate failure and turns it into a failed outcome.
    fn captured(&self, diagnostic: String) -> (bool, String) {
        warn!("{}", ProvisionError::verification_check(&self.name, &diagnostic));
        (false, diagnostic)
    }
}

impl fmt::Debug for Check<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "{status}: {} — {}", self.name, self.detail)
    }
}

/// Results of one verification run, in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub results: Vec<CheckResult>,
}

impl VerificationReport {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&CheckResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    /// One line per check followed by the `<passed>/<total> passed` summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            out.push_str(&result.to_string());
            out.push('\n');
        }
        out.push_str(&format!("{}/{} passed", self.passed(), self.total()));
        out
    }
}

/// Evaluates `checks` in order.
#[must_use]
pub fn run(checks: &[Check<'_>]) -> VerificationReport {
    VerificationReport {
        results: checks.iter().map(Check::evaluate).collect(),
    }
}
