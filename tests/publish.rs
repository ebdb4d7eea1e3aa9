// ABOUTME: Integration tests for publishing against the in-memory backends.
// ABOUTME: Covers success, per-zone failures, cancellation, cleanup, and destroy.

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use templify::artifact::LocalArtifact;
use templify::config::Config;
use templify::diagnostics::WarningKind;
use templify::pipeline::PauseHook;
use templify::publish::{
    Capabilities, PublishError, PublishErrorKind, PublishResult, Publisher, keys, publish,
};
use templify::registry::{MemoryRegistry, RegistryCall};
use templify::storage::{MemoryStorage, StorageCall};
use templify::types::Zone;
use templify::ui::{SilentUi, Ui};
use tokio_util::sync::CancellationToken;

const IMAGE_BYTES: &[u8] = b"not really a qcow2 image";
const IMAGE_MD5: &str = "c0278437c2bf11b740d8adecf433e414";

fn zone(name: &str) -> Zone {
    Zone::new(name).unwrap()
}

fn config(zones: &[&str]) -> Config {
    let yaml = format!(
        "api_key: EXOkey\napi_secret: secret\nbucket: images\nzones: [{}]\ntemplate:\n  name: debian-12\n",
        zones.join(", ")
    );
    Config::from_yaml(&yaml).unwrap()
}

struct Fixture {
    storage: Arc<MemoryStorage>,
    registry: Arc<MemoryRegistry>,
    image: PathBuf,
    _dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("disk.qcow2");
        std::fs::write(&image, IMAGE_BYTES).unwrap();
        Self {
            storage: Arc::new(MemoryStorage::new()),
            registry: Arc::new(MemoryRegistry::new()),
            image,
            _dir: dir,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            storage: self.storage.clone(),
            registry: self.registry.clone(),
        }
    }

    fn artifact(&self) -> LocalArtifact {
        LocalArtifact::new("transcend.qemu", vec![self.image.clone()])
    }

    async fn publish(&self, config: &Config) -> Result<PublishResult, PublishError> {
        self.publish_with(config, &CancellationToken::new()).await
    }

    async fn publish_with(
        &self,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<PublishResult, PublishError> {
        publish(
            config,
            self.capabilities(),
            &self.artifact(),
            Arc::new(SilentUi),
            cancel,
        )
        .await
    }

    fn assert_object_cleaned(&self) {
        assert_eq!(self.storage.put_count(), self.storage.delete_count());
        assert_eq!(self.storage.object_count(), 0);
    }
}

mod success {
    use super::*;

    #[tokio::test]
    async fn publishes_home_zone_then_copies_in_order() {
        let fx = Fixture::new();
        let config = config(&["ch-gva-2", "de-fra-1", "at-vie-1"]);

        let result = fx.publish(&config).await.unwrap();

        let zones: Vec<_> = result.images().iter().map(|i| i.zone().clone()).collect();
        assert_eq!(zones, [zone("ch-gva-2"), zone("de-fra-1"), zone("at-vie-1")]);
        assert_eq!(result.home_image().zone(), &zone("ch-gva-2"));
        assert_eq!(fx.registry.register_count(), 1);
        assert_eq!(
            fx.registry.calls()[1..],
            [
                RegistryCall::Copy {
                    from: zone("ch-gva-2"),
                    to: zone("de-fra-1")
                },
                RegistryCall::Copy {
                    from: zone("ch-gva-2"),
                    to: zone("at-vie-1")
                },
            ]
        );
    }

    #[tokio::test]
    async fn keeps_templates_and_removes_staged_object() {
        let fx = Fixture::new();
        let config = config(&["ch-gva-2", "de-fra-1", "at-vie-1"]);

        fx.publish(&config).await.unwrap();

        assert_eq!(fx.registry.delete_count(), 0);
        assert_eq!(fx.registry.templates().len(), 3);
        assert_eq!(fx.storage.put_count(), 1);
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn registers_with_image_checksum() {
        let fx = Fixture::new();
        let result = fx.publish(&config(&["ch-gva-2"])).await.unwrap();

        for image in result.images() {
            assert_eq!(image.checksum(), Some(IMAGE_MD5));
            assert_eq!(image.name(), "debian-12");
        }
    }

    #[tokio::test]
    async fn uploads_under_run_unique_key() {
        let fx = Fixture::new();
        let result = fx.publish(&config(&["ch-gva-2"])).await.unwrap();

        let run_id = &result.generated_data()[keys::PUBLISH_RUN_ID];
        let expected_key = format!("templify/{run_id}/disk.qcow2");
        assert_eq!(
            fx.storage.calls()[0],
            StorageCall::Put {
                bucket: "images".to_string(),
                key: expected_key,
            }
        );
    }

    #[tokio::test]
    async fn two_runs_use_distinct_keys() {
        let fx = Fixture::new();
        let config = config(&["ch-gva-2"]);

        fx.publish(&config).await.unwrap();
        fx.publish(&config).await.unwrap();

        let keys: Vec<_> = fx
            .storage
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                StorageCall::Put { key, .. } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn single_zone_makes_no_copies() {
        let fx = Fixture::new();
        let result = fx.publish(&config(&["ch-gva-2"])).await.unwrap();

        assert_eq!(result.images().len(), 1);
        assert_eq!(fx.registry.copy_count(), 0);
    }

    #[tokio::test]
    async fn records_generated_data() {
        let fx = Fixture::new();
        let result = fx.publish(&config(&["ch-gva-2"])).await.unwrap();
        let data = result.generated_data();

        assert_eq!(data[keys::SOURCE_CHECKSUM], IMAGE_MD5);
        assert_eq!(data[keys::TEMPLATE_NAME], "debian-12");
        assert_eq!(data[keys::HOME_ZONE], "ch-gva-2");
        assert!(data[keys::SOURCE_OBJECT].starts_with("images/templify/"));
        assert!(data.contains_key(keys::PUBLISHED_AT));
    }

    #[tokio::test]
    async fn result_id_lists_every_zone() {
        let fx = Fixture::new();
        let result = fx.publish(&config(&["ch-gva-2", "de-fra-1"])).await.unwrap();

        let id = result.id();
        assert!(id.starts_with("ch-gva-2:"));
        assert!(id.contains(",de-fra-1:"));
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn copy_failure_removes_earlier_images_newest_first() {
        let fx = Fixture::new();
        fx.registry.fail_copy_to(zone("at-vie-1"), "quota exceeded");
        let config = config(&["ch-gva-2", "de-fra-1", "at-vie-1", "de-muc-1"]);

        let err = fx.publish(&config).await.unwrap_err();

        assert_eq!(err.kind(), PublishErrorKind::Rejected);
        assert!(err.to_string().contains("at-vie-1"));
        assert_eq!(fx.registry.copy_count(), 2, "de-muc-1 must not be attempted");
        assert_eq!(
            fx.registry.deleted_zones(),
            [zone("de-fra-1"), zone("ch-gva-2")]
        );
        assert!(fx.registry.templates().is_empty());
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn first_copy_failure_removes_home_image_only() {
        let fx = Fixture::new();
        fx.registry.fail_copy_to(zone("de-fra-1"), "unsupported zone");
        let config = config(&["ch-gva-2", "de-fra-1", "at-vie-1"]);

        fx.publish(&config).await.unwrap_err();

        assert_eq!(fx.registry.copy_count(), 1);
        assert_eq!(fx.registry.deleted_zones(), [zone("ch-gva-2")]);
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn register_failure_deletes_only_the_object() {
        let fx = Fixture::new();
        fx.registry.fail_register("invalid image format");

        let err = fx.publish(&config(&["ch-gva-2", "de-fra-1"])).await.unwrap_err();

        assert_eq!(err.kind(), PublishErrorKind::Rejected);
        assert_eq!(fx.registry.copy_count(), 0);
        assert_eq!(fx.registry.delete_count(), 0);
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn upload_failure_still_deletes_attempted_object() {
        let fx = Fixture::new();
        fx.storage.fail_puts("connection reset");

        let err = fx.publish(&config(&["ch-gva-2"])).await.unwrap_err();

        assert_eq!(err.kind(), PublishErrorKind::TransientRemote);
        assert!(fx.registry.calls().is_empty());
        assert_eq!(fx.storage.put_count(), 1);
        assert_eq!(fx.storage.delete_count(), 1);
    }

    #[tokio::test]
    async fn cleanup_failure_is_a_warning_and_others_still_run() {
        let fx = Fixture::new();
        fx.registry.fail_copy_to(zone("at-vie-1"), "quota exceeded");
        fx.registry.fail_delete_in(zone("de-fra-1"), "timeout");
        let config = config(&["ch-gva-2", "de-fra-1", "at-vie-1"]);

        let mut publisher = Publisher::new(&config, fx.capabilities());
        let err = publisher
            .run(&fx.artifact(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), PublishErrorKind::Rejected);
        assert!(err.to_string().contains("quota exceeded"));
        assert!(publisher.diagnostics().has_warnings());
        assert_eq!(
            fx.registry.deleted_zones(),
            [zone("de-fra-1"), zone("ch-gva-2")]
        );
        let left: Vec<_> = fx
            .registry
            .templates()
            .iter()
            .map(|t| t.zone().clone())
            .collect();
        assert_eq!(left, [zone("de-fra-1")]);
        fx.assert_object_cleaned();
    }
}

mod validation {
    use super::*;

    async fn assert_rejected_without_calls(fx: &Fixture, artifact: LocalArtifact) {
        let err = publish(
            &config(&["ch-gva-2"]),
            fx.capabilities(),
            &artifact,
            Arc::new(SilentUi),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), PublishErrorKind::Configuration);
        assert!(fx.storage.calls().is_empty());
        assert!(fx.registry.calls().is_empty());
    }

    #[tokio::test]
    async fn unsupported_producer_is_rejected() {
        let fx = Fixture::new();
        let artifact = LocalArtifact::new("packer.amazon-ebs", vec![fx.image.clone()]);
        assert_rejected_without_calls(&fx, artifact).await;
    }

    #[tokio::test]
    async fn multiple_files_are_rejected() {
        let fx = Fixture::new();
        let artifact = LocalArtifact::new(
            "packer.file",
            vec![fx.image.clone(), fx.image.with_extension("raw")],
        );
        assert_rejected_without_calls(&fx, artifact).await;
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let fx = Fixture::new();
        let artifact = LocalArtifact::from_file(fx.image.with_file_name("missing.qcow2"));
        assert_rejected_without_calls(&fx, artifact).await;
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let fx = Fixture::new();
        std::fs::write(&fx.image, b"").unwrap();
        assert_rejected_without_calls(&fx, fx.artifact()).await;
    }

    #[tokio::test]
    async fn repeated_zone_in_hand_built_config_is_rejected() {
        let fx = Fixture::new();
        let mut config = config(&["ch-gva-2", "de-fra-1"]);
        config.zones.push(zone("ch-gva-2"));

        let err = Publisher::new(&config, fx.capabilities())
            .run(&fx.artifact(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            PublishError::DuplicateZone { zone: z } if z.as_str() == "ch-gva-2"
        ));
        assert_eq!(err.kind(), PublishErrorKind::Configuration);
        assert!(fx.storage.calls().is_empty());
        assert!(fx.registry.calls().is_empty());
    }
}

mod cancellation {
    use super::*;

    /// Cancels the run once `after` completes.
    struct CancelAfter {
        after: &'static str,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl PauseHook for CancelAfter {
        async fn should_continue(&self, completed_step: &str) -> bool {
            if completed_step == self.after {
                self.cancel.cancel();
            }
            true
        }
    }

    #[tokio::test]
    async fn cancel_before_register_deletes_object_only() {
        let fx = Fixture::new();
        let config = config(&["ch-gva-2", "de-fra-1"]);
        let cancel = CancellationToken::new();

        let err = Publisher::new(&config, fx.capabilities())
            .with_pause(Arc::new(CancelAfter {
                after: "upload",
                cancel: cancel.clone(),
            }))
            .run(&fx.artifact(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(matches!(err, PublishError::Cancelled));
        assert_eq!(fx.registry.register_count(), 0);
        assert_eq!(fx.storage.put_count(), 1);
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn cancel_after_register_removes_home_image() {
        let fx = Fixture::new();
        let config = config(&["ch-gva-2", "de-fra-1"]);
        let cancel = CancellationToken::new();

        let err = Publisher::new(&config, fx.capabilities())
            .with_pause(Arc::new(CancelAfter {
                after: "register",
                cancel: cancel.clone(),
            }))
            .run(&fx.artifact(), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), PublishErrorKind::Cancelled);
        assert_eq!(fx.registry.copy_count(), 0);
        assert_eq!(fx.registry.deleted_zones(), [zone("ch-gva-2")]);
        fx.assert_object_cleaned();
    }

    fn cancel_soon() -> CancellationToken {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        cancel
    }

    async fn run_until_cancelled(
        fx: &Fixture,
        config: &Config,
    ) -> (PublishError, Vec<templify::diagnostics::Warning>) {
        let cancel = cancel_soon();
        let mut publisher = Publisher::new(config, fx.capabilities());
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            publisher.run(&fx.artifact(), &cancel),
        )
        .await
        .expect("cancellation should end the wait")
        .unwrap_err();
        (err, publisher.diagnostics().warnings().to_vec())
    }

    #[tokio::test]
    async fn cancel_interrupts_a_stuck_copy() {
        let fx = Fixture::new();
        fx.registry.stall_completion_in(zone("at-vie-1"));
        let config = config(&["ch-gva-2", "de-fra-1", "at-vie-1"]);

        let (err, warnings) = run_until_cancelled(&fx, &config).await;

        assert!(err.is_cancelled());
        assert_eq!(
            fx.registry.deleted_zones(),
            [zone("at-vie-1"), zone("de-fra-1"), zone("ch-gva-2")]
        );
        assert!(fx.registry.templates().is_empty());
        assert!(warnings.is_empty());
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn copy_created_before_cancel_is_deleted() {
        let fx = Fixture::new();
        fx.registry.stall_completion_in(zone("de-fra-1"));
        let config = config(&["ch-gva-2", "de-fra-1"]);

        let (err, warnings) = run_until_cancelled(&fx, &config).await;

        assert!(err.is_cancelled());
        assert_eq!(fx.registry.copy_count(), 1);
        assert_eq!(
            fx.registry.deleted_zones(),
            [zone("de-fra-1"), zone("ch-gva-2")]
        );
        assert!(fx.registry.templates().is_empty());
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn home_template_created_before_cancel_is_deleted() {
        let fx = Fixture::new();
        fx.registry.stall_completion_in(zone("ch-gva-2"));
        let config = config(&["ch-gva-2", "de-fra-1"]);

        let (err, _) = run_until_cancelled(&fx, &config).await;

        assert!(err.is_cancelled());
        assert_eq!(fx.registry.copy_count(), 0);
        assert_eq!(fx.registry.deleted_zones(), [zone("ch-gva-2")]);
        assert!(fx.registry.templates().is_empty());
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn unanswered_copy_request_warns_about_its_zone() {
        let fx = Fixture::new();
        fx.registry.hang_requests_to(zone("de-fra-1"));
        let config = config(&["ch-gva-2", "de-fra-1"]);

        let (err, warnings) = run_until_cancelled(&fx, &config).await;

        assert!(err.is_cancelled());
        assert_eq!(fx.registry.deleted_zones(), [zone("ch-gva-2")]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::CleanupFailed);
        assert!(warnings[0].message.contains("check de-fra-1"));
    }

    #[tokio::test]
    async fn unanswered_register_request_warns_about_its_zone() {
        let fx = Fixture::new();
        fx.registry.hang_requests_to(zone("ch-gva-2"));
        let config = config(&["ch-gva-2"]);

        let (err, warnings) = run_until_cancelled(&fx, &config).await;

        assert!(err.is_cancelled());
        assert_eq!(fx.registry.delete_count(), 0);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("check ch-gva-2"));
        fx.assert_object_cleaned();
    }

    #[tokio::test]
    async fn already_cancelled_run_touches_nothing() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fx
            .publish_with(&config(&["ch-gva-2"]), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(fx.storage.calls().is_empty());
        assert!(fx.registry.calls().is_empty());
    }
}

mod progress {
    use super::*;

    #[derive(Default)]
    struct RecordingUi {
        said: Mutex<Vec<String>>,
    }

    impl Ui for RecordingUi {
        fn say(&self, message: &str) {
            self.said.lock().push(message.to_string());
        }

        fn error(&self, message: &str) {
            self.said.lock().push(format!("error: {message}"));
        }
    }

    #[tokio::test]
    async fn reports_each_stage() {
        let fx = Fixture::new();
        let ui = Arc::new(RecordingUi::default());
        let config = config(&["ch-gva-2", "de-fra-1"]);

        publish(
            &config,
            fx.capabilities(),
            &fx.artifact(),
            ui.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let said = ui.said.lock().join("\n");
        assert!(said.contains("Uploading"));
        assert!(said.contains("Registering template \"debian-12\" in ch-gva-2"));
        assert!(said.contains("to de-fra-1"));
        assert!(said.contains("Deleting staged object"));
        assert!(!said.contains("error:"));
    }
}

mod destroy {
    use super::*;

    #[tokio::test]
    async fn deletes_every_image_in_publish_order() {
        let fx = Fixture::new();
        let result = fx
            .publish(&config(&["ch-gva-2", "de-fra-1", "at-vie-1"]))
            .await
            .unwrap();

        let report = result.destroy(fx.registry.as_ref()).await.unwrap();

        assert_eq!(report.deleted.len(), 3);
        assert_eq!(
            fx.registry.deleted_zones(),
            [zone("ch-gva-2"), zone("de-fra-1"), zone("at-vie-1")]
        );
        assert!(fx.registry.templates().is_empty());
    }

    #[tokio::test]
    async fn destroying_twice_is_harmless() {
        let fx = Fixture::new();
        let result = fx.publish(&config(&["ch-gva-2", "de-fra-1"])).await.unwrap();

        result.destroy(fx.registry.as_ref()).await.unwrap();
        let report = result.destroy(fx.registry.as_ref()).await.unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.already_gone.len(), 2);
    }

    #[tokio::test]
    async fn failed_delete_does_not_stop_the_rest() {
        let fx = Fixture::new();
        let result = fx
            .publish(&config(&["ch-gva-2", "de-fra-1", "at-vie-1"]))
            .await
            .unwrap();
        fx.registry.fail_delete_in(zone("de-fra-1"), "service unavailable");

        let err = result.destroy(fx.registry.as_ref()).await.unwrap_err();

        assert_eq!(err.attempted, 3);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].image.zone(), &zone("de-fra-1"));
        assert_eq!(fx.registry.delete_count(), 3);
        assert_eq!(fx.registry.templates().len(), 1);
    }

    #[tokio::test]
    async fn manifest_round_trip_destroys_the_same_images() {
        let fx = Fixture::new();
        let result = fx.publish(&config(&["ch-gva-2", "de-fra-1"])).await.unwrap();

        let restored = PublishResult::from_manifest(&result.to_manifest().unwrap()).unwrap();
        restored.destroy(fx.registry.as_ref()).await.unwrap();

        assert!(fx.registry.templates().is_empty());
    }
}

const EXTRA_ZONES: [&str; 5] = ["de-fra-1", "at-vie-1", "at-vie-2", "bg-sof-1", "de-muc-1"];

fn run_blocking<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

proptest! {
    #[test]
    fn failed_copy_unwinds_exactly_what_was_created(
        extra in 1usize..=EXTRA_ZONES.len(),
        fail_seed in any::<usize>(),
    ) {
        let fail_at = fail_seed % extra;
        let fx = Fixture::new();
        let mut zones = vec!["ch-gva-2"];
        zones.extend_from_slice(&EXTRA_ZONES[..extra]);
        fx.registry.fail_copy_to(zone(EXTRA_ZONES[fail_at]), "rejected");

        let outcome = run_blocking(fx.publish(&config(&zones)));

        prop_assert!(outcome.is_err());
        prop_assert_eq!(fx.registry.copy_count(), fail_at + 1);

        let mut expected: Vec<Zone> = zones[..=fail_at].iter().map(|z| zone(z)).collect();
        expected.reverse();
        prop_assert_eq!(fx.registry.deleted_zones(), expected);
        prop_assert!(fx.registry.templates().is_empty());
        prop_assert_eq!(fx.storage.put_count(), fx.storage.delete_count());
    }

    #[test]
    fn successful_publish_has_one_image_per_zone(extra in 0usize..=EXTRA_ZONES.len()) {
        let fx = Fixture::new();
        let mut zones = vec!["ch-gva-2"];
        zones.extend_from_slice(&EXTRA_ZONES[..extra]);

        let result = run_blocking(fx.publish(&config(&zones))).unwrap();

        let published: Vec<_> = result
            .images()
            .iter()
            .map(|i| i.zone().as_str().to_string())
            .collect();
        let expected: Vec<_> = zones.iter().map(|z| z.to_string()).collect();
        prop_assert_eq!(published, expected);
        prop_assert_eq!(fx.registry.delete_count(), 0);
        prop_assert_eq!(fx.storage.object_count(), 0);
    }
}
