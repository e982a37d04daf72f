//! Property tests for work distribution and error expectations

use integ_core::expect::{classify_error, message_matches};
use integ_core::{DriverError, IntegError, WorkerPool};
use integ_suite::{ErrorExpectation, TestUnit};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn units(count: usize) -> Vec<TestUnit> {
    (0..count)
        .map(|i| TestUnit::new(format!("/work/test/integ.case{i}.js"), "/work/test", None))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_unit_runs_exactly_once(unit_count in 0usize..24, workers in 1usize..6) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let report = runtime.block_on(async {
            WorkerPool::local(workers)
                .drain(
                    units(unit_count),
                    |_context, unit| async move {
                        tokio::task::yield_now().await;
                        unit.normalized_test_name().to_string()
                    },
                    |_context, _unit, message| message,
                )
                .await
        });

        let names: BTreeSet<_> = report.results.iter().cloned().collect();
        prop_assert_eq!(report.results.len(), unit_count);
        prop_assert_eq!(names.len(), unit_count);
        prop_assert_eq!(report.assignments.len(), unit_count);
        let timed: usize = report.metrics.iter().map(|m| m.units.len()).sum();
        prop_assert_eq!(timed, unit_count);
    }

    #[test]
    fn unexpected_errors_always_propagate(message in "[a-zA-Z0-9 ]{0,40}") {
        let error = IntegError::from(DriverError::DeployFailed { message });
        prop_assert!(classify_error(error, &ErrorExpectation::default()).is_err());
    }

    #[test]
    fn any_expected_error_is_swallowed(message in "[a-zA-Z0-9 ]{0,40}") {
        let error = IntegError::from(DriverError::DestroyFailed { message });
        prop_assert!(classify_error(error, &ErrorExpectation::any()).is_ok());
    }

    #[test]
    fn literal_fragment_matches(prefix in "[a-z ]{0,10}", fragment in "[a-z().*+]{1,10}", suffix in "[a-z ]{0,10}") {
        let message = format!("{prefix}{fragment}{suffix}");
        prop_assert!(message_matches(&regex::escape(&fragment), &message));
        let error = IntegError::from(DriverError::DeployFailed { message });
        let expectation = ErrorExpectation::matching(regex::escape(&fragment));
        prop_assert!(classify_error(error, &expectation).is_ok());
    }
}
