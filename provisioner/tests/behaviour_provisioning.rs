//! Behaviour-driven tests for library provisioning.
//!
//! Scenarios drive the provisioner against the in-memory workload with real
//! resource and default-archive files on disk.

use calibre_library_provisioner::LIBRARY_DIR;
use calibre_library_provisioner::archive::{
    ArchiveProvenance, DEFAULT_ARCHIVE_NAME, DefaultArchive, DirResourceProvider,
    LIBRARY_RESOURCE,
};
use calibre_library_provisioner::error::ProvisionError;
use calibre_library_provisioner::provision::{ProvisionOutcome, Provisioner};
use calibre_library_provisioner::test_utils::{FakeWorkload, flat_library, wrapped_library};
use camino::{Utf8Path, Utf8PathBuf};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use tempfile::TempDir;

const SENTINEL: &str = "/books/sentinel.txt";

struct ProvisioningWorld {
    workload: FakeWorkload,
    deployment: TempDir,
    result: RefCell<Option<Result<ProvisionOutcome, ProvisionError>>>,
}

impl ProvisioningWorld {
    fn new() -> Self {
        let deployment = tempfile::tempdir().expect("temp dir");
        let world = Self {
            workload: FakeWorkload::new(),
            deployment,
            result: RefCell::new(None),
        };
        std::fs::write(world.root().join(DEFAULT_ARCHIVE_NAME), flat_library())
            .expect("write default archive");
        world.attach_resource(&[]);
        world
    }

    fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::try_from(self.deployment.path().to_path_buf()).expect("temp path is UTF-8")
    }

    fn attach_resource(&self, bytes: &[u8]) {
        std::fs::write(self.root().join(LIBRARY_RESOURCE), bytes).expect("write resource");
    }

    fn provision(&self, policy: &str) {
        let resources = DirResourceProvider::new(self.root());
        let default_archive = DefaultArchive::in_charm_dir(&self.root());
        let result = Provisioner::new(&self.workload, &resources, default_archive)
            .provision(policy, Utf8Path::new(LIBRARY_DIR));
        self.result.replace(Some(result));
    }

    fn outcome(&self) -> ProvisionOutcome {
        match self.result.borrow().as_ref() {
            Some(Ok(outcome)) => outcome.clone(),
            Some(Err(err)) => panic!("provisioning failed: {err}"),
            None => panic!("provisioning has not run"),
        }
    }
}

#[fixture]
fn world() -> ProvisioningWorld {
    ProvisioningWorld::new()
}

#[given("the library directory contains a sentinel file")]
fn given_sentinel(world: &ProvisioningWorld) {
    world.workload.add_file(SENTINEL, b"sentinel");
}

#[given("an empty library directory")]
fn given_empty_library(world: &ProvisioningWorld) {
    world.workload.add_dir(LIBRARY_DIR);
}

#[given("the operator attached a wrapped library archive")]
fn given_wrapped_resource(world: &ProvisioningWorld) {
    world.attach_resource(&wrapped_library());
}

#[given("the operator attached an empty resource")]
fn given_empty_resource(world: &ProvisioningWorld) {
    world.attach_resource(&[]);
}

#[when("provisioning runs with policy {policy}")]
fn when_provisioning(world: &ProvisioningWorld, policy: String) {
    world.provision(&policy);
}

#[then("the sentinel file is still present")]
fn then_sentinel_present(world: &ProvisioningWorld) {
    assert!(matches!(world.outcome(), ProvisionOutcome::Skipped { .. }));
    assert_eq!(world.workload.read(SENTINEL).as_deref(), Some(&b"sentinel"[..]));
}

#[then("the sentinel file is gone")]
fn then_sentinel_gone(world: &ProvisioningWorld) {
    assert!(matches!(
        world.outcome(),
        ProvisionOutcome::Provisioned { .. }
    ));
    assert!(world.workload.read(SENTINEL).is_none());
}

#[then("the library root contains {name}")]
fn then_root_contains(world: &ProvisioningWorld, name: String) {
    let names = world.workload.names(LIBRARY_DIR);
    assert!(names.contains(&name), "{name} missing from {names:?}");
}

#[then("no intermediate directories remain")]
fn then_no_intermediates(world: &ProvisioningWorld) {
    let names = world.workload.names(LIBRARY_DIR);
    for leftover in ["library", "library.zip", "Calibre Library"] {
        assert!(
            !names.iter().any(|name| name == leftover),
            "{leftover} left in {names:?}"
        );
    }
}

#[then("the user-supplied archive was used")]
fn then_user_archive(world: &ProvisioningWorld) {
    assert!(matches!(
        world.outcome(),
        ProvisionOutcome::Provisioned {
            source: ArchiveProvenance::UserSupplied,
            ..
        }
    ));
}

#[then("the default archive was used")]
fn then_default_archive(world: &ProvisioningWorld) {
    assert!(matches!(
        world.outcome(),
        ProvisionOutcome::Provisioned {
            source: ArchiveProvenance::Default,
            ..
        }
    ));
}

#[then("provisioning is blocked by configuration")]
fn then_blocked(world: &ProvisioningWorld) {
    let result = world.result.borrow();
    match result.as_ref() {
        Some(Err(err)) => {
            assert!(err.is_configuration());
            assert_eq!(err.to_string(), "invalid library-write: 'bad-value'");
        }
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[then("the workload was not modified")]
fn then_not_modified(world: &ProvisioningWorld) {
    assert!(world.workload.operations().is_empty());
    assert_eq!(world.workload.snapshot(LIBRARY_DIR), vec!["sentinel.txt"]);
}

#[scenario(path = "tests/features/provisioning.feature", index = 0)]
fn scenario_skip_then_clean(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/provisioning.feature", index = 1)]
fn scenario_wrapped_archive(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/provisioning.feature", index = 2)]
fn scenario_invalid_policy(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/provisioning.feature", index = 3)]
fn scenario_empty_resource(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/provisioning.feature", index = 4)]
fn scenario_clean_converges(world: ProvisioningWorld) {
    let _ = world;
}
