//! Dispatcher status and the health check built on it.

use serde::Serialize;

use crate::domain::{ConsumerState, SubscriptionName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformerInformation {
    pub name: String,
    pub state: ConsumerState,
}

/// One subscription: how many performers it should have and what they are doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStateItem {
    pub name: SubscriptionName,
    pub expected_performers: usize,
    pub performers: Vec<PerformerInformation>,
}

impl DispatcherStateItem {
    pub fn running_performers(&self) -> usize {
        self.performers.iter().filter(|p| p.state.is_running()).count()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.running_performers() == self.expected_performers
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Some subscriptions run fewer (or more) performers than expected.
    Degraded { subscriptions: Vec<SubscriptionName> },
    /// Performers are expected but none is running.
    Unhealthy { subscriptions: Vec<SubscriptionName> },
}

pub struct HealthCheck;

impl HealthCheck {
    pub fn evaluate(items: &[DispatcherStateItem]) -> HealthStatus {
        let mismatched: Vec<SubscriptionName> = items
            .iter()
            .filter(|item| !item.is_at_capacity())
            .map(|item| item.name.clone())
            .collect();
        if mismatched.is_empty() {
            return HealthStatus::Healthy;
        }

        let expected: usize = items.iter().map(|i| i.expected_performers).sum();
        let running: usize = items.iter().map(DispatcherStateItem::running_performers).sum();
        if expected > 0 && running == 0 {
            HealthStatus::Unhealthy {
                subscriptions: mismatched,
            }
        } else {
            HealthStatus::Degraded {
                subscriptions: mismatched,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn item(name: &str, expected: usize, states: &[ConsumerState]) -> DispatcherStateItem {
        DispatcherStateItem {
            name: SubscriptionName::new(name),
            expected_performers: expected,
            performers: states
                .iter()
                .enumerate()
                .map(|(i, state)| PerformerInformation {
                    name: format!("{name}-{i}"),
                    state: *state,
                })
                .collect(),
        }
    }

    #[rstest]
    #[case::all_running(
        vec![item("a", 2, &[ConsumerState::Open, ConsumerState::Open])],
        HealthStatus::Healthy
    )]
    #[case::nothing_expected(vec![item("a", 0, &[])], HealthStatus::Healthy)]
    #[case::one_closed(
        vec![
            item("a", 2, &[ConsumerState::Open, ConsumerState::Closed]),
            item("b", 1, &[ConsumerState::Open]),
        ],
        HealthStatus::Degraded { subscriptions: vec![SubscriptionName::new("a")] }
    )]
    #[case::all_down(
        vec![item("a", 1, &[ConsumerState::Closed]), item("b", 1, &[ConsumerState::Shut])],
        HealthStatus::Unhealthy {
            subscriptions: vec![SubscriptionName::new("a"), SubscriptionName::new("b")],
        }
    )]
    fn health_follows_expected_versus_running(
        #[case] items: Vec<DispatcherStateItem>,
        #[case] expected: HealthStatus,
    ) {
        assert_eq!(HealthCheck::evaluate(&items), expected);
    }

    #[test]
    fn health_serializes_with_a_status_tag() {
        let json = serde_json::to_value(HealthStatus::Degraded {
            subscriptions: vec![SubscriptionName::new("a")],
        })
        .unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["subscriptions"][0], "a");
    }
}
