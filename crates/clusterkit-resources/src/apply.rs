//! Reconcile loop
//!
//! Applying one resource runs a full cycle: produce the desired content,
//! parse it into object handles, create or patch every object, then verify
//! each object is observable on the cluster. Any failure re-runs the whole
//! cycle under the retry policy. [`Applier::apply_all`] walks a resource set
//! in order and keeps going past failed resources.

use std::sync::Arc;

use clusterkit_common::retry::RetryPolicy;
use clusterkit_common::{Error, Result};
use clusterkit_kube::{
    create_or_patch, exists, result_for_content, ClusterClient, ObjectHandle, WriteOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ApplyErrors;
use crate::set::ResourceSet;
use crate::status::{StatusNotifier, StillWorking, TaskAction, TracingNotifier, STILL_WORKING_PERIOD};

/// Summary of one converged resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Objects created
    pub created: usize,
    /// Objects patched
    pub patched: usize,
    /// Objects already converged
    pub unchanged: usize,
}

impl ApplyReport {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.created += 1,
            WriteOutcome::Patched => self.patched += 1,
            WriteOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Number of writes sent to the cluster
    pub fn writes(&self) -> usize {
        self.created + self.patched
    }
}

/// Applies the resources of a set to a cluster
pub struct Applier {
    set: ResourceSet,
    client: Arc<dyn ClusterClient>,
    policy: RetryPolicy,
    notifier: Arc<dyn StatusNotifier>,
    cancel: CancellationToken,
}

impl Applier {
    /// Applier with the default retry policy and tracing notifications
    pub fn new(set: ResourceSet, client: Arc<dyn ClusterClient>) -> Self {
        Self {
            set,
            client,
            policy: RetryPolicy::default(),
            notifier: Arc::new(TracingNotifier),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the status notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Stop retrying once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The resource set being applied
    pub fn set(&self) -> &ResourceSet {
        &self.set
    }

    /// Apply one resource, retrying the whole cycle on failure.
    ///
    /// The task starts as `Configure` since nothing is known about the live
    /// objects yet; each written object then reports the action taken on it.
    pub async fn apply(&self, name: &str) -> Result<ApplyReport> {
        let task = format!("apply {}", name);
        self.notifier.start(&task, TaskAction::Configure);
        let ticker = StillWorking::start(
            self.notifier.clone(),
            task.clone(),
            STILL_WORKING_PERIOD,
            &self.cancel,
        );

        let result = self
            .policy
            .run(&task, &self.cancel, || self.attempt(name))
            .await;

        ticker.stop().await;
        self.notifier
            .complete(&task, result.as_ref().err().map(ToString::to_string));
        result
    }

    /// Apply every resource in declared order.
    ///
    /// A failed resource does not stop the others; every failure is
    /// reported in the returned aggregate.
    pub async fn apply_all(&self) -> std::result::Result<(), ApplyErrors> {
        let mut errors = ApplyErrors::new("apply");
        for name in self.set.names() {
            if self.cancel.is_cancelled() {
                errors.add(
                    name,
                    Error::Cancelled {
                        operation: format!("apply {}", name),
                    },
                );
                continue;
            }
            match self.apply(name).await {
                Ok(report) => {
                    info!(
                        resource = %name,
                        created = report.created,
                        patched = report.patched,
                        unchanged = report.unchanged,
                        "resource converged"
                    );
                }
                Err(e) => {
                    warn!(resource = %name, error = %e, "resource failed to converge");
                    errors.add(name, e);
                }
            }
        }
        errors.into_result()
    }

    /// One pass: render, write every object, verify every object.
    async fn attempt(&self, name: &str) -> Result<ApplyReport> {
        let content = self.set.desired_content(name).await?;
        debug!(resource = %name, bytes = content.len(), "desired content ready");

        let client = self.client.as_ref();
        let results = result_for_content(client, name, &content, true).await?;

        let mut report = ApplyReport::default();
        let mut written: Vec<ObjectHandle> = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            let mut handle = match result {
                Ok(handle) => handle,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            match create_or_patch(client, &mut handle).await {
                Ok(outcome) => {
                    debug!(resource = %name, object = %handle, outcome = ?outcome, "object written");
                    self.notifier.progress(
                        &format!("apply {}", name),
                        &format!("{} {}", TaskAction::from(outcome), handle),
                    );
                    report.record(outcome);
                    written.push(handle);
                }
                Err(e) => errors.push(e),
            }
        }

        for handle in &written {
            match exists(client, handle).await {
                Ok(true) => {}
                Ok(false) => errors.push(Error::NotObservable {
                    object: handle.reference(),
                }),
                Err(e) => errors.push(e),
            }
        }

        match errors.len() {
            0 => Ok(report),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Objects {
                source_name: name.to_string(),
                errors,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use clusterkit_common::kube_utils::build_api_resource;
    use clusterkit_kube::{ObjectPatch, ResolvedKind};
    use kube::core::GroupVersionKind;
    use mockall::mock;
    use serde_json::Value;

    use crate::registry::ResourceRegistry;
    use crate::status::MockStatusNotifier;

    mock! {
        Cluster {}

        #[async_trait]
        impl ClusterClient for Cluster {
            fn default_namespace(&self) -> String;
            async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResolvedKind>;
            async fn get(&self, handle: &ObjectHandle) -> Result<Value>;
            async fn create(&self, handle: &ObjectHandle) -> Result<Value>;
            async fn patch(&self, handle: &ObjectHandle, patch: &ObjectPatch) -> Result<Value>;
        }
    }

    const CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ clusterName }}\ndata:\n  a: b\n";

    fn resolving_mock() -> MockCluster {
        let mut mock = MockCluster::new();
        mock.expect_default_namespace()
            .returning(|| "default".to_string());
        mock.expect_resolve().returning(|gvk| {
            Ok(ResolvedKind {
                api_resource: build_api_resource(&gvk.version, &gvk.kind),
                namespaced: true,
            })
        });
        mock
    }

    fn set_with(names: &[&str]) -> ResourceSet {
        let registry = Arc::new(ResourceRegistry::from_entries([
            ("settings", CONFIG_MAP),
            ("broken", "value: {{ missing }}\n"),
        ]));
        let mut set = ResourceSet::new(registry);
        set.add_resources(names.iter().copied()).unwrap();
        set.add_data("clusterName", "demo01");
        set
    }

    #[tokio::test]
    async fn creates_a_missing_object_and_verifies_it() {
        let mut mock = resolving_mock();
        let mut gets = 0;
        mock.expect_get().times(2).returning(move |h| {
            gets += 1;
            if gets == 1 {
                Err(Error::not_found(h.reference()))
            } else {
                Ok(h.data().clone())
            }
        });
        mock.expect_create()
            .times(1)
            .returning(|h| Ok(h.data().clone()));

        let applier = Applier::new(set_with(&["settings"]), Arc::new(mock))
            .with_policy(RetryPolicy::once());
        let report = applier.apply("settings").await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.writes(), 1);
    }

    #[tokio::test]
    async fn progress_names_the_action_taken_on_each_object() {
        let mut mock = resolving_mock();
        let mut gets = 0;
        mock.expect_get().times(2).returning(move |h| {
            gets += 1;
            if gets == 1 {
                Err(Error::not_found(h.reference()))
            } else {
                Ok(h.data().clone())
            }
        });
        mock.expect_create()
            .times(1)
            .returning(|h| Ok(h.data().clone()));

        let mut notifier = MockStatusNotifier::new();
        notifier
            .expect_start()
            .times(1)
            .withf(|task, action| task.ends_with("settings") && *action == TaskAction::Configure)
            .return_const(());
        notifier
            .expect_progress()
            .times(1)
            .withf(|_, detail| detail.starts_with("create ") && detail.ends_with("default/demo01"))
            .return_const(());
        notifier.expect_still_working().return_const(());
        notifier
            .expect_complete()
            .times(1)
            .withf(|_, error| error.is_none())
            .return_const(());

        let applier = Applier::new(set_with(&["settings"]), Arc::new(mock))
            .with_policy(RetryPolicy::once())
            .with_notifier(Arc::new(notifier));
        applier.apply("settings").await.unwrap();
    }

    #[tokio::test]
    async fn render_errors_are_not_retried() {
        let mock = resolving_mock();
        let applier = Applier::new(set_with(&["broken"]), Arc::new(mock))
            .with_policy(RetryPolicy::fixed(6, Duration::from_millis(1)));
        let err = applier.apply("broken").await.unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
    }

    #[tokio::test]
    async fn unobservable_objects_fail_the_attempt() {
        let mut mock = resolving_mock();
        mock.expect_get()
            .returning(|h| Err(Error::not_found(h.reference())));
        mock.expect_create()
            .times(1)
            .returning(|h| Ok(h.data().clone()));

        let applier = Applier::new(set_with(&["settings"]), Arc::new(mock))
            .with_policy(RetryPolicy::once());
        let err = applier.apply("settings").await.unwrap_err();
        assert!(matches!(err, Error::NotObservable { ref object } if object == "ConfigMap default/demo01"));
    }

    #[tokio::test]
    async fn cancelled_applier_skips_remaining_resources() {
        let mock = resolving_mock();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let applier = Applier::new(set_with(&["settings"]), Arc::new(mock))
            .with_cancellation(cancel);

        let errors = applier.apply_all().await.unwrap_err();
        assert_eq!(errors.resources().collect::<Vec<_>>(), vec!["settings"]);
        assert!(matches!(errors.failures()[0].error, Error::Cancelled { .. }));
    }
}
