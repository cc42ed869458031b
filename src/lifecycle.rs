//! Order status state machine.
//!
//! PLACED -> PREPARING -> READY -> COLLECTED. Every transition names exactly
//! one source state; stores apply it as a compare-and-set on the persisted
//! status so a stale terminal cannot skip or replay a step.

use chrono::{DateTime, Duration, Utc};

use crate::models::OrderStatus;
use crate::store::OrderPatch;

impl OrderStatus {
    /// The only legal successor, `None` once collected.
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Placed => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Collected),
            OrderStatus::Collected => None,
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.next() == Some(target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StartPreparing { eta_minutes: u32 },
    MarkReady,
    Collect,
}

impl Transition {
    pub fn source(self) -> OrderStatus {
        match self {
            Transition::StartPreparing { .. } => OrderStatus::Placed,
            Transition::MarkReady => OrderStatus::Preparing,
            Transition::Collect => OrderStatus::Ready,
        }
    }

    pub fn target(self) -> OrderStatus {
        match self {
            Transition::StartPreparing { .. } => OrderStatus::Preparing,
            Transition::MarkReady => OrderStatus::Ready,
            Transition::Collect => OrderStatus::Collected,
        }
    }

    /// Transition that moves an order into `target`. `eta_minutes` is only
    /// used for PREPARING.
    pub fn into_status(target: OrderStatus, eta_minutes: u32) -> Option<Transition> {
        match target {
            OrderStatus::Placed => None,
            OrderStatus::Preparing => Some(Transition::StartPreparing { eta_minutes }),
            OrderStatus::Ready => Some(Transition::MarkReady),
            OrderStatus::Collected => Some(Transition::Collect),
        }
    }

    /// Fields written when the transition is applied at `now`.
    pub fn patch(self, now: DateTime<Utc>) -> OrderPatch {
        let mut patch = OrderPatch {
            status: Some(self.target()),
            updated_at: Some(now),
            ..Default::default()
        };
        match self {
            Transition::StartPreparing { eta_minutes } => {
                patch.ready_at = Some(now + Duration::minutes(i64::from(eta_minutes)));
            }
            Transition::MarkReady => {}
            Transition::Collect => patch.closed_at = Some(now),
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_flow_has_single_successors() {
        let mut status = OrderStatus::Placed;
        let mut visited = vec![status];
        while let Some(next) = status.next() {
            assert!(status.can_transition_to(next));
            status = next;
            visited.push(status);
        }
        assert_eq!(visited, OrderStatus::ALL.to_vec());
        assert!(status.is_terminal());
    }

    #[test]
    fn test_no_skips_and_nothing_leaves_collected() {
        assert!(!OrderStatus::Placed.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Placed.can_transition_to(OrderStatus::Collected));
        assert!(!OrderStatus::Preparing.can_transition_to(OrderStatus::Collected));
        for target in OrderStatus::ALL {
            assert!(!OrderStatus::Collected.can_transition_to(target));
        }
    }

    #[test]
    fn test_transition_sources_and_targets_line_up() {
        for transition in [
            Transition::StartPreparing { eta_minutes: 5 },
            Transition::MarkReady,
            Transition::Collect,
        ] {
            assert!(transition.source().can_transition_to(transition.target()));
            assert_eq!(
                Transition::into_status(transition.target(), 5),
                Some(transition)
            );
        }
        assert_eq!(Transition::into_status(OrderStatus::Placed, 0), None);
    }

    #[test]
    fn test_patches_set_timestamps() {
        let now = Utc::now();
        let preparing = Transition::StartPreparing { eta_minutes: 10 }.patch(now);
        assert_eq!(preparing.status, Some(OrderStatus::Preparing));
        assert_eq!(preparing.ready_at, Some(now + Duration::minutes(10)));
        assert_eq!(preparing.closed_at, None);

        let collected = Transition::Collect.patch(now);
        assert_eq!(collected.closed_at, Some(now));
        assert_eq!(collected.ready_at, None);

        let ready = Transition::MarkReady.patch(now);
        assert_eq!(ready.status, Some(OrderStatus::Ready));
        assert_eq!(ready.updated_at, Some(now));
    }
}
