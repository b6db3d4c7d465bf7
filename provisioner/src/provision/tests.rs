//! Unit tests for the provisioning orchestrator.

use super::*;
use crate::archive::{DEFAULT_ARCHIVE_NAME, LIBRARY_RESOURCE, MockResourceProvider};
use crate::error::{ConfigurationError, PipelineError, ProvisionError};
use crate::test_utils::{FakeWorkload, flat_library, wrapped_library};
use camino::Utf8PathBuf;
use logtest::Logger;
use rstest::{fixture, rstest};
use tempfile::TempDir;

const BOOKS: &str = "/books";

struct Deployment {
    _dir: TempDir,
    default_archive: DefaultArchive,
}

#[fixture]
fn deployment() -> Deployment {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = Utf8PathBuf::try_from(dir.path().join(DEFAULT_ARCHIVE_NAME))
        .expect("temp path is UTF-8");
    std::fs::write(&path, wrapped_library()).expect("write default archive");
    Deployment {
        _dir: dir,
        default_archive: DefaultArchive::at(path),
    }
}

fn resources_returning(bytes: Vec<u8>) -> MockResourceProvider {
    let mut resources = MockResourceProvider::new();
    resources
        .expect_fetch()
        .withf(|name| name == LIBRARY_RESOURCE)
        .returning(move |_| Ok(bytes.clone()));
    resources
}

fn unused_resources() -> MockResourceProvider {
    let mut resources = MockResourceProvider::new();
    resources.expect_fetch().never();
    resources
}

#[rstest]
#[case::skip("skip")]
#[case::clean("clean")]
fn empty_directory_is_provisioned_under_any_policy(
    deployment: Deployment,
    #[case] policy: &str,
) {
    let workload = FakeWorkload::new();
    workload.add_dir(BOOKS);
    let resources = resources_returning(Vec::new());

    let outcome = Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision(policy, Utf8Path::new(BOOKS))
        .expect("provision");

    assert!(matches!(
        outcome,
        ProvisionOutcome::Provisioned {
            cleaned: 0,
            source: ArchiveProvenance::Default,
            ..
        }
    ));
    assert!(workload.names(BOOKS).contains(&"metadata.db".to_owned()));
}

#[rstest]
fn missing_directory_counts_as_empty(deployment: Deployment) {
    let workload = FakeWorkload::new();
    let resources = resources_returning(flat_library());

    let outcome = Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision("skip", Utf8Path::new(BOOKS))
        .expect("provision");

    assert!(matches!(
        outcome,
        ProvisionOutcome::Provisioned {
            source: ArchiveProvenance::UserSupplied,
            ..
        }
    ));
    assert!(workload.names(BOOKS).contains(&"Jane Austen".to_owned()));
}

#[rstest]
fn skip_leaves_existing_content_untouched(deployment: Deployment) {
    let workload = FakeWorkload::new();
    workload.add_file("/books/sentinel.txt", b"keep me");
    let resources = unused_resources();

    let outcome = Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision("skip", Utf8Path::new(BOOKS))
        .expect("provision");

    assert_eq!(
        outcome,
        ProvisionOutcome::Skipped {
            policy: ProvisioningPolicy::Skip
        }
    );
    assert_eq!(workload.snapshot(BOOKS), vec!["sentinel.txt"]);
    assert!(!workload.mutated());
}

#[rstest]
fn clean_replaces_existing_content(deployment: Deployment) {
    let workload = FakeWorkload::new();
    workload.add_file("/books/sentinel.txt", b"remove me");
    workload.add_file("/books/Old Author/Old Book (3)/metadata.opf", b"old");
    let resources = resources_returning(Vec::new());

    let outcome = Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision("clean", Utf8Path::new(BOOKS))
        .expect("provision");

    assert!(matches!(
        outcome,
        ProvisionOutcome::Provisioned { cleaned: 2, .. }
    ));
    assert_eq!(workload.names(BOOKS), vec!["Jane Austen", "metadata.db"]);
}

#[rstest]
fn clean_converges_on_repeated_runs(deployment: Deployment) {
    let workload = FakeWorkload::new();
    workload.add_file("/books/sentinel.txt", b"remove me");
    let resources = resources_returning(Vec::new());
    let provisioner = Provisioner::new(&workload, &resources, deployment.default_archive);

    provisioner
        .provision("clean", Utf8Path::new(BOOKS))
        .expect("first run");
    let first = workload.snapshot(BOOKS);
    provisioner
        .provision("clean", Utf8Path::new(BOOKS))
        .expect("second run");

    assert_eq!(workload.snapshot(BOOKS), first);
}

#[rstest]
#[case::unknown("bad-value")]
#[case::wrong_case("Clean")]
#[case::padded(" skip")]
#[case::empty("")]
fn invalid_policy_mutates_nothing(deployment: Deployment, #[case] policy: &str) {
    let workload = FakeWorkload::new();
    workload.add_file("/books/sentinel.txt", b"keep me");
    let resources = unused_resources();

    let err = Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision(policy, Utf8Path::new(BOOKS))
        .expect_err("invalid policy");

    assert!(err.is_configuration());
    let ProvisionError::Configuration(ConfigurationError::InvalidPolicy { value }) = err else {
        panic!("expected an invalid policy error, got {err:?}");
    };
    assert_eq!(value, policy);
    assert!(workload.operations().is_empty());
}

#[test]
fn missing_default_archive_is_a_configuration_error() {
    let workload = FakeWorkload::new();
    workload.add_dir(BOOKS);
    let resources = resources_returning(Vec::new());
    let default = DefaultArchive::at("/nonexistent/charm/library.zip");

    let err = Provisioner::new(&workload, &resources, default)
        .provision("skip", Utf8Path::new(BOOKS))
        .expect_err("no default archive");

    assert!(matches!(
        err,
        ProvisionError::Configuration(ConfigurationError::MissingDefaultArchive { .. })
    ));
    assert!(!workload.mutated());
}

#[rstest]
fn resource_read_failure_is_reported(deployment: Deployment) {
    let workload = FakeWorkload::new();
    workload.add_dir(BOOKS);
    let mut resources = MockResourceProvider::new();
    resources
        .expect_fetch()
        .returning(|_| Err(std::io::Error::other("resource store offline")));

    let err = Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision("clean", Utf8Path::new(BOOKS))
        .expect_err("resource unavailable");

    assert!(err.to_string().contains("resource store offline"));
}

#[rstest]
fn pipeline_failure_propagates_unchanged(deployment: Deployment) {
    let workload = FakeWorkload::new();
    workload.add_dir(BOOKS);
    workload.fail_command("dtrx", 1, "unsupported format");
    let resources = resources_returning(b"garbage".to_vec());

    let err = Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision("clean", Utf8Path::new(BOOKS))
        .expect_err("extraction fails");

    assert!(matches!(
        err,
        ProvisionError::Pipeline(PipelineError::Extraction { exit_code: 1, .. })
    ));
}

#[rstest]
fn skip_is_logged(deployment: Deployment) {
    let mut logger = Logger::start();
    let workload = FakeWorkload::new();
    workload.add_file("/books/sentinel.txt", b"keep me");
    let resources = unused_resources();

    Provisioner::new(&workload, &resources, deployment.default_archive)
        .provision("skip", Utf8Path::new(BOOKS))
        .expect("provision");

    let mut logged = false;
    while let Some(record) = logger.pop() {
        if record.args().to_string().contains("skipping provisioning") {
            logged = true;
        }
    }
    assert!(logged, "expected a skip message to be logged");
}

#[test]
fn outcome_serializes_with_a_tag() {
    let outcome = ProvisionOutcome::Provisioned {
        policy: ProvisioningPolicy::Clean,
        cleaned: 3,
        source: ArchiveProvenance::UserSupplied,
    };
    let json = serde_json::to_value(&outcome).expect("serialize");
    assert_eq!(
        json,
        serde_json::json!({
            "outcome": "provisioned",
            "policy": "clean",
            "cleaned": 3,
            "source": "user-supplied",
        })
    );
}
