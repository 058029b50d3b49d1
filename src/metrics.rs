//! Projection of the run state into display text

use crate::engine::{ExecutionStatus, RunState};

/// Shown in the output pane while a run is in flight
pub const RUNNING_PLACEHOLDER: &str = "Running...";

/// Metric value when the backend could not be reached
pub const NOT_AVAILABLE: &str = "N/A";

/// Metric value when the backend did not report it
pub const NOT_REPORTED: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMetrics {
    pub status: String,
    pub elapsed: String,
    pub memory: String,
}

/// Metrics to show, only once a run has settled
pub fn present_metrics(state: &RunState) -> Option<DisplayMetrics> {
    let result = state.result()?;

    let metric = |value: &Option<String>| match result.status {
        ExecutionStatus::ConnectionError => NOT_AVAILABLE.to_string(),
        _ => value.clone().unwrap_or_else(|| NOT_REPORTED.to_string()),
    };

    Some(DisplayMetrics {
        status: result.status.to_string(),
        elapsed: metric(&result.elapsed),
        memory: metric(&result.memory),
    })
}

/// Text for the output pane
pub fn present_output(state: &RunState) -> String {
    match state {
        RunState::Idle => String::new(),
        RunState::Running => RUNNING_PLACEHOLDER.to_string(),
        RunState::Settled(result) => result.display_text().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionResult;

    #[test]
    fn test_nothing_before_settled() {
        assert_eq!(present_metrics(&RunState::Idle), None);
        assert_eq!(present_metrics(&RunState::Running), None);
        assert_eq!(present_output(&RunState::Idle), "");
        assert_eq!(present_output(&RunState::Running), RUNNING_PLACEHOLDER);
    }

    #[test]
    fn test_accepted_with_metrics() {
        let state = RunState::Settled(
            ExecutionResult::accepted("Sum: 30")
                .with_metrics(Some("0.04s".into()), Some("12MB".into())),
        );
        assert_eq!(
            present_metrics(&state),
            Some(DisplayMetrics {
                status: "Accepted".into(),
                elapsed: "0.04s".into(),
                memory: "12MB".into(),
            })
        );
        assert_eq!(present_output(&state), "Sum: 30");
    }

    #[test]
    fn test_missing_metrics_not_reported() {
        let state = RunState::Settled(ExecutionResult::error("Error: divide by zero"));
        let metrics = present_metrics(&state).unwrap();
        assert_eq!(metrics.status, "Error");
        assert_eq!(metrics.elapsed, NOT_REPORTED);
        assert_eq!(metrics.memory, NOT_REPORTED);
        assert_eq!(present_output(&state), "Error: divide by zero");
    }

    #[test]
    fn test_connection_error_not_available() {
        let state = RunState::Settled(ExecutionResult::connection_error("unreachable"));
        let metrics = present_metrics(&state).unwrap();
        assert_eq!(metrics.status, "Connection Error");
        assert_eq!(metrics.elapsed, NOT_AVAILABLE);
        assert_eq!(metrics.memory, NOT_AVAILABLE);
    }
}
