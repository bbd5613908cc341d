//! Owned scenario references
//!
//! Every strong path the driver holds to the probe target lives here, so a
//! single `release` can drop them all in a fixed order:
//! unsubscribe active subscriptions, drop the handles, then drop the target.
//! Dropping a handle that still has an active subscription would leave the
//! subscription rooting the target.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::client::{Context, ObservableQuery, QuerySubscription, Subscription};
use crate::error::{LeakProbeError, Result};
use crate::probe::ProbeTarget;

/// One step performed by [`OperationHandles::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStep {
    UnsubscribedQueryObserver,
    UnsubscribedSubscription,
    DroppedQueryObserver,
    DroppedSubscription,
    DroppedObservableQuery,
    DroppedTarget,
}

pub struct OperationHandles {
    target: Option<Arc<ProbeTarget>>,
    query: Option<ObservableQuery>,
    query_subscription: Option<QuerySubscription>,
    subscription: Option<Subscription>,
}

impl OperationHandles {
    pub fn new(target: Arc<ProbeTarget>) -> Self {
        Self {
            target: Some(target),
            query: None,
            query_subscription: None,
            subscription: None,
        }
    }

    /// Context handle for the next call; fails after release
    pub fn context(&self) -> Result<Context> {
        self.target
            .as_ref()
            .map(ProbeTarget::as_context)
            .ok_or_else(|| LeakProbeError::Scenario("probe target already released".to_string()))
    }

    pub fn hold_query(&mut self, query: ObservableQuery, subscription: QuerySubscription) {
        self.query = Some(query);
        self.query_subscription = Some(subscription);
    }

    pub fn hold_subscription(&mut self, subscription: Subscription) {
        self.subscription = Some(subscription);
    }

    pub fn query_subscription_mut(&mut self) -> Option<&mut QuerySubscription> {
        self.query_subscription.as_mut()
    }

    pub fn subscription_mut(&mut self) -> Option<&mut Subscription> {
        self.subscription.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.target.is_none()
            && self.query.is_none()
            && self.query_subscription.is_none()
            && self.subscription.is_none()
    }

    /// Drop every held reference. Returns the steps taken, in order; a
    /// second call takes none.
    pub fn release(&mut self) -> Vec<ReleaseStep> {
        let mut steps = Vec::new();

        if let Some(observer) = self.query_subscription.as_mut() {
            if observer.is_active() {
                observer.unsubscribe();
                steps.push(ReleaseStep::UnsubscribedQueryObserver);
            }
        }
        if let Some(subscription) = self.subscription.as_mut() {
            if subscription.is_active() {
                subscription.unsubscribe();
                steps.push(ReleaseStep::UnsubscribedSubscription);
            }
        }

        if self.query_subscription.take().is_some() {
            steps.push(ReleaseStep::DroppedQueryObserver);
        }
        if self.subscription.take().is_some() {
            steps.push(ReleaseStep::DroppedSubscription);
        }
        if self.query.take().is_some() {
            steps.push(ReleaseStep::DroppedObservableQuery);
        }
        if self.target.take().is_some() {
            steps.push(ReleaseStep::DroppedTarget);
        }

        if !steps.is_empty() {
            debug!(?steps, "Released scenario handles");
        }
        steps
    }
}

impl Drop for OperationHandles {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientOptions, Request};
    use crate::harness::fixtures::{Fixture, USER_QUERY, USER_UPDATED_SUBSCRIPTION};

    #[tokio::test]
    async fn test_release_order_and_idempotence() {
        let fixture = Fixture::new(ClientOptions::default());
        let target = ProbeTarget::new("handles");
        let weak = Arc::downgrade(&target);
        let mut handles = OperationHandles::new(target);

        let context = handles.context().unwrap();
        let query = fixture
            .client
            .watch_query(Request::new(USER_QUERY).unwrap().with_context(context.clone()))
            .unwrap();
        let observer = query.subscribe();
        handles.hold_query(query, observer);

        let subscription = fixture
            .client
            .subscribe(Request::new(USER_UPDATED_SUBSCRIPTION).unwrap().with_context(context))
            .unwrap();
        handles.hold_subscription(subscription);

        let steps = handles.release();
        assert_eq!(
            steps,
            vec![
                ReleaseStep::UnsubscribedQueryObserver,
                ReleaseStep::UnsubscribedSubscription,
                ReleaseStep::DroppedQueryObserver,
                ReleaseStep::DroppedSubscription,
                ReleaseStep::DroppedObservableQuery,
                ReleaseStep::DroppedTarget,
            ]
        );
        assert!(handles.is_released());
        assert!(handles.release().is_empty());
        assert!(handles.context().is_err());

        let stats = fixture.client.stats();
        assert_eq!(stats.active_subscriptions, 0);
        assert_eq!(stats.query_observers, 0);

        // The watched query's network fetch may still be in flight
        for _ in 0..100 {
            if weak.strong_count() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(weak.strong_count(), 0);
    }

    #[test]
    fn test_release_target_only() {
        let target = ProbeTarget::new("bare");
        let weak = Arc::downgrade(&target);
        let mut handles = OperationHandles::new(target);

        assert_eq!(handles.release(), vec![ReleaseStep::DroppedTarget]);
        assert_eq!(weak.strong_count(), 0);
    }

    #[test]
    fn test_new_holds_only_the_target_and_drop_releases() {
        let target = ProbeTarget::new("fresh");
        let weak = Arc::downgrade(&target);
        let mut handles = OperationHandles::new(target);

        assert!(!handles.is_released());
        assert!(handles.query_subscription_mut().is_none());
        assert!(handles.subscription_mut().is_none());
        assert_eq!(weak.strong_count(), 1);

        drop(handles);
        assert_eq!(weak.strong_count(), 0);
    }
}
