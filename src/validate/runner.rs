use tracing::{error, info, warn};

use crate::store::global::GlobalStore;
use crate::validate::{Check, CheckOutcome, Snapshot};
use crate::TARGET_VALIDATE;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAIL: i32 = 1;
pub const EXIT_WARN: i32 = 2;

/// Outcomes of the checks that ran, in order.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub results: Vec<(&'static str, CheckOutcome)>,
}

impl ValidationReport {
    pub fn failed(&self) -> bool {
        self.results.iter().any(|(_, o)| o.is_fail())
    }

    pub fn warned(&self) -> bool {
        self.results.iter().any(|(_, o)| o.is_warn())
    }

    /// Process exit code: 1 on any failure, 2 on warnings only, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed() {
            EXIT_FAIL
        } else if self.warned() {
            EXIT_WARN
        } else {
            EXIT_OK
        }
    }
}

/// Runs checks in sequence, stopping at the first failure.
pub struct Validator {
    checks: Vec<Box<dyn Check>>,
}

impl Validator {
    pub fn new(checks: Vec<Box<dyn Check>>) -> Self {
        Self { checks }
    }

    pub fn run(&self, snapshot: &Snapshot) -> ValidationReport {
        let mut report = ValidationReport::default();
        for check in &self.checks {
            let outcome = check.run(snapshot);
            match &outcome {
                CheckOutcome::Pass(m) => info!(target: TARGET_VALIDATE, "[{}] ok: {}", check.name(), m),
                CheckOutcome::Warn(m) => warn!(target: TARGET_VALIDATE, "[{}] warning: {}", check.name(), m),
                CheckOutcome::Fail(m) => error!(target: TARGET_VALIDATE, "[{}] failed: {}", check.name(), m),
            }
            let stop = outcome.is_fail();
            report.results.push((check.name(), outcome));
            if stop {
                warn!(target: TARGET_VALIDATE, "Stopping after first failure");
                break;
            }
        }
        report
    }

    /// Loads the committed global outputs and validates them.
    ///
    /// Unreadable outputs count as a failure of the snapshot itself.
    pub fn run_on_store(&self, store: &GlobalStore) -> ValidationReport {
        match Snapshot::load(store) {
            Ok(snapshot) => self.run(&snapshot),
            Err(e) => {
                error!(target: TARGET_VALIDATE, "Failed to load outputs: {:#}", e);
                ValidationReport {
                    results: vec![("load outputs", CheckOutcome::Fail(format!("{:#}", e)))],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, CheckOutcome);

    impl Check for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run(&self, _snapshot: &Snapshot) -> CheckOutcome {
            self.1.clone()
        }
    }

    fn fixed(name: &'static str, outcome: CheckOutcome) -> Box<dyn Check> {
        Box::new(Fixed(name, outcome))
    }

    #[test]
    fn test_continues_past_warnings() {
        let validator = Validator::new(vec![
            fixed("a", CheckOutcome::Warn("w".into())),
            fixed("b", CheckOutcome::Pass("p".into())),
        ]);
        let report = validator.run(&Snapshot::default());
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.exit_code(), EXIT_WARN);
    }

    #[test]
    fn test_halts_on_first_failure() {
        let validator = Validator::new(vec![
            fixed("a", CheckOutcome::Pass("p".into())),
            fixed("b", CheckOutcome::Fail("f".into())),
            fixed("c", CheckOutcome::Warn("w".into())),
        ]);
        let report = validator.run(&Snapshot::default());
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.exit_code(), EXIT_FAIL);
    }

    #[test]
    fn test_all_pass() {
        let validator = Validator::new(vec![fixed("a", CheckOutcome::Pass("p".into()))]);
        assert_eq!(validator.run(&Snapshot::default()).exit_code(), EXIT_OK);
    }
}
