//! Unit tests for the update pipeline.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use folio_config::{Config, ConfigError};
use rstest::rstest;
use time::OffsetDateTime;

use super::mocks::MockWriter;
use super::support::{Site, site, write};
use crate::{
    ConfigurableValidator, FileUpdater, HistoryAction, Locator, LocatorKind, PathViolation,
    SetupError, StrategyError, StrategySet, UpdateError, UpdateRequest, ValidationFailure,
};

#[test]
fn updater_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<FileUpdater>();
}

#[rstest]
fn update_records_backup_and_history(site: Site) {
    let path = site.template("home.blade.php", "<h1>Welcome to Our Site</h1>\n");
    let updater = site.updater();

    let report = updater
        .update(
            UpdateRequest::new(&path, Locator::text("Welcome to Our Site", "Welcome to Acme"))
                .with_actor("editor@example.com"),
        )
        .expect("update");

    assert_eq!(site.read(&path), "<h1>Welcome to Acme</h1>\n");
    assert_eq!(report.strategy, "text");
    assert_eq!(report.locator_kind, LocatorKind::Text);
    let backup_id = report.backup_id.expect("backup taken");

    let backups = updater.backups(&path).expect("list backups");
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].id, backup_id);

    let history = updater.history(&path).expect("history");
    let [entry] = history.as_slice() else {
        panic!("expected one entry, got {history:?}");
    };
    assert_eq!(entry.id, report.history_id);
    assert_eq!(entry.action, HistoryAction::Update);
    assert_eq!(entry.old_fragment, "Welcome to Our Site");
    assert_eq!(entry.new_fragment, "Welcome to Acme");
    assert_eq!(entry.locator_kind, Some(LocatorKind::Text));
    assert_eq!(entry.actor, "editor@example.com");
    assert_eq!(entry.backup_id.as_deref(), Some(backup_id.as_str()));
}

#[rstest]
fn restore_reproduces_the_backed_up_bytes(site: Site) {
    let original = "<p>One</p>\r\n<p>Two</p>\r\n";
    let path = site.template("crlf.html", original);
    let updater = site.updater();
    let report = updater
        .update(UpdateRequest::new(&path, Locator::text("Two", "Deux")))
        .expect("update");
    let backup_id = report.backup_id.expect("backup taken");

    let first = updater.restore(&path, &backup_id).expect("first restore");
    assert_eq!(fs::read(&path).expect("read"), original.as_bytes());
    let second = updater.restore(&path, &backup_id).expect("second restore");
    assert_eq!(fs::read(&path).expect("read"), original.as_bytes());

    assert_eq!(first.restored_from, backup_id);
    assert!(first.pre_restore_backup.is_some());
    assert_ne!(first.pre_restore_backup, second.pre_restore_backup);
    assert_eq!(updater.backups(&path).expect("list").len(), 3);

    let history = updater.history(&path).expect("history");
    assert_eq!(history.len(), 3);
    let last = history.last().expect("restore entry");
    assert_eq!(last.action, HistoryAction::Restore);
    assert_eq!(last.restored_from.as_deref(), Some(backup_id.as_str()));
}

#[rstest]
fn restore_refuses_unknown_and_foreign_backups(site: Site) {
    let first = site.template("first.html", "<p>a</p>");
    let second = site.template("second.html", "<p>b</p>");
    let updater = site.updater();
    let report = updater
        .update(UpdateRequest::new(&first, Locator::text("a", "A")))
        .expect("update");
    let backup_id = report.backup_id.expect("backup taken");

    let foreign = updater.restore(&second, &backup_id).expect_err("mismatch");
    assert!(matches!(foreign, UpdateError::BackupMismatch { .. }), "{foreign:?}");
    let unknown = updater.restore(&first, "no-such-backup").expect_err("unknown");
    assert!(matches!(unknown, UpdateError::BackupNotFound { .. }), "{unknown:?}");
    assert_eq!(site.read(&second), "<p>b</p>");
}

#[rstest]
fn failed_validation_leaves_the_file_untouched(site: Site) {
    let path = site.template("card.html", "<div><p>Hello</p></div>");
    let failure = ValidationFailure::new(path.clone(), "unclosed <div>").at_location(1, 1);
    let updater = site
        .updater()
        .with_validator(Arc::new(ConfigurableValidator::failing(vec![failure])));

    let error = updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect_err("validation should fail");

    match error {
        UpdateError::ValidationFailed { failures, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].message(), "unclosed <div>");
        }
        other => panic!("expected a validation failure, got {other:?}"),
    }
    assert_eq!(site.read(&path), "<div><p>Hello</p></div>");
    assert!(updater.history(&path).expect("history").is_empty());
}

#[rstest]
fn validation_can_be_skipped_per_request(site: Site) {
    let path = site.template("card.html", "<div><p>Hello</p></div>");
    let updater = site
        .updater()
        .with_validator(Arc::new(ConfigurableValidator::failing(vec![
            ValidationFailure::new(path.clone(), "always fails"),
        ])));

    updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")).with_validation(false))
        .expect("validation skipped");
    assert_eq!(site.read(&path), "<div><p>Hi</p></div>");
}

#[rstest]
fn unavailable_validator_is_transient(site: Site) {
    let path = site.template("card.html", "<p>Hello</p>");
    let updater = site
        .updater()
        .with_validator(Arc::new(ConfigurableValidator::unavailable("checker offline")));

    let error = updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect_err("validator unavailable");
    assert!(matches!(error, UpdateError::ValidatorUnavailable { .. }));
    assert!(error.is_transient());
    assert_eq!(site.read(&path), "<p>Hello</p>");
}

#[rstest]
fn backups_are_optional(site: Site) {
    let path = site.template("plain.html", "<p>Hello</p>");
    let updater = site.updater();

    let report = updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")).without_backup())
        .expect("update");

    assert!(report.backup_id.is_none());
    assert!(updater.backups(&path).expect("list").is_empty());
    let history = updater.history(&path).expect("history");
    assert_eq!(history.len(), 1);
    assert!(history[0].backup_id.is_none());
}

#[rstest]
fn binary_files_are_not_edited(site: Site) {
    let path = write(&site.views().join("blob.html"), &[0xff, 0xfe, 0x00, 0x41]);
    let updater = site.updater();

    let error = updater
        .update(UpdateRequest::new(&path, Locator::text("A", "B")))
        .expect_err("not UTF-8");
    assert!(matches!(error, UpdateError::FileRead { .. }), "{error:?}");
    assert_eq!(fs::read(&path).expect("read"), [0xff, 0xfe, 0x00, 0x41]);
}

#[rstest]
fn locators_without_a_strategy_are_reported(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let updater = site.updater().with_strategies(StrategySet::empty());

    let error = updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect_err("no strategy");
    assert!(matches!(
        error,
        UpdateError::StrategyNotFound {
            source: StrategyError::Unsupported { .. },
            ..
        }
    ));
}

#[rstest]
#[case::traversal("../../etc/passwd", PathViolation::Traversal)]
#[case::extension("notes.txt", PathViolation::DisallowedExtension)]
fn rejected_paths_are_never_touched(
    site: Site,
    #[case] target: &str,
    #[case] expected: PathViolation,
) {
    let mut writer = MockWriter::new();
    writer.expect_write().never();
    let updater = site.updater().with_writer(Arc::new(writer));

    let error = updater
        .update(UpdateRequest::new(target, Locator::text("root", "x")))
        .expect_err("rejected");

    match error {
        UpdateError::PathRejected { violation, .. } => assert_eq!(violation, expected),
        other => panic!("expected a path rejection, got {other:?}"),
    }
    assert_eq!(site.stored_backups(), 0);
}

#[rstest]
fn explicit_locks_exclude_other_writers(site: Site) {
    let path = site.template("page.html", "<p>One</p><p>Two</p>");
    let updater = site
        .updater()
        .with_lock_timeout(Duration::from_millis(50));
    let token = updater.lock(&path).expect("lock");

    let blocked = updater
        .update(UpdateRequest::new(&path, Locator::text("One", "1")))
        .expect_err("lock held elsewhere");
    assert!(matches!(blocked, UpdateError::LockTimeout { .. }), "{blocked:?}");

    updater
        .update_with_lock(UpdateRequest::new(&path, Locator::text("Two", "2")), &token)
        .expect("update under held lock");
    assert!(updater.unlock(&token));
    assert!(!updater.unlock(&token));

    updater
        .update(UpdateRequest::new(&path, Locator::text("One", "1")))
        .expect("lock released");
    assert_eq!(site.read(&path), "<p>1</p><p>2</p>");
}

#[rstest]
fn tokens_for_other_files_are_refused(site: Site) {
    let path = site.template("page.html", "<p>One</p>");
    let other = site.template("other.html", "<p>Other</p>");
    let updater = site.updater();
    let token = updater.lock(&other).expect("lock");

    let error = updater
        .update_with_lock(UpdateRequest::new(&path, Locator::text("One", "1")), &token)
        .expect_err("wrong token");
    assert!(matches!(error, UpdateError::LockNotHeld { .. }), "{error:?}");
    assert_eq!(site.read(&path), "<p>One</p>");
}

#[rstest]
fn history_failure_rolls_the_write_back(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let updater = site.updater();
    let ledger = site.history_path();
    if ledger.exists() {
        fs::remove_file(&ledger).expect("remove ledger");
    }
    fs::create_dir_all(&ledger).expect("block ledger");

    let error = updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect_err("history unavailable");

    assert!(matches!(error, UpdateError::HistoryFailed(_)), "{error:?}");
    assert_eq!(site.read(&path), "<p>Hello</p>");
}

#[rstest]
fn batch_items_on_one_file_serialise(site: Site) {
    let path = site.template("pair.html", "<p>A</p><p>B</p>");
    let updater = site.updater();

    let result = updater.batch_update(vec![
        UpdateRequest::new(&path, Locator::text("A", "A1")),
        UpdateRequest::new(&path, Locator::text("B", "B2")),
    ]);

    assert!(result.all_succeeded(), "{:?}", result.results);
    assert_eq!(site.read(&path), "<p>A1</p><p>B2</p>");
    let history = updater.history(&path).expect("history");
    assert_eq!(history.len(), 2);
    assert!(
        history
            .iter()
            .all(|entry| entry.batch_id.as_deref() == Some(result.batch_id.as_str()))
    );
}

#[rstest]
fn empty_batches_report_nothing(site: Site) {
    let result = site.updater().batch_update(Vec::new());
    assert_eq!((result.total, result.succeeded, result.failed), (0, 0, 0));
    assert!(result.all_succeeded());
}

#[rstest]
fn prune_removes_only_expired_records(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let updater = site.updater();
    updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect("update");

    let fresh = updater.prune(OffsetDateTime::now_utc()).expect("prune");
    assert_eq!((fresh.backups_removed, fresh.history_entries_removed), (0, 0));

    let later = OffsetDateTime::now_utc() + time::Duration::days(400);
    let expired = updater.prune(later).expect("prune");
    assert_eq!(
        (expired.backups_removed, expired.history_entries_removed),
        (1, 1)
    );
    assert!(updater.backups(&path).expect("list").is_empty());
    assert!(updater.history(&path).expect("history").is_empty());
}

#[rstest]
fn invalid_configuration_is_refused(site: Site) {
    let config = Config {
        lock_timeout_ms: 0,
        ..site.config()
    };
    let error = FileUpdater::from_config(&config, site.base()).expect_err("invalid");
    assert!(matches!(
        error,
        SetupError::Config(ConfigError::ZeroLockTimeout)
    ));
}

#[rstest]
fn relative_and_absolute_targets_share_history(site: Site) {
    let path = site.template("nested/page.html", "<p>Hello</p>");
    let updater = site.updater();
    updater
        .update(UpdateRequest::new(
            Path::new("nested/page.html"),
            Locator::text("Hello", "Hi"),
        ))
        .expect("update");

    assert_eq!(updater.history(&path).expect("history").len(), 1);
}
