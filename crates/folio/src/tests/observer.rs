//! Event and write-failure tests using mocked collaborators.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::rstest;

use super::mocks::{MockObserver, MockWriter};
use super::support::{Site, site};
use crate::{
    AtomicFileWriter, ContentWriter, Locator, RestoreReport, UpdateError, UpdateReport,
    UpdateRequest,
};

fn disk_full() -> io::Error {
    io::Error::other("disk full")
}

#[rstest]
fn successful_updates_announce_backup_and_change(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let mut observer = MockObserver::new();
    observer.expect_backup_created().once().return_const(());
    observer
        .expect_content_updated()
        .once()
        .withf(|report: &UpdateReport| report.bytes_written == "<p>Hi</p>".len())
        .return_const(());
    observer.expect_update_failed().never();
    let updater = site.updater().with_observer(Arc::new(observer));

    updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect("update");
}

#[rstest]
fn rejected_updates_only_report_the_failure(site: Site) {
    let mut observer = MockObserver::new();
    observer
        .expect_update_failed()
        .once()
        .withf(|_: &Path, error: &UpdateError| error.is_security_rejection())
        .return_const(());
    observer.expect_backup_created().never();
    observer.expect_content_updated().never();
    let updater = site.updater().with_observer(Arc::new(observer));

    updater
        .update(UpdateRequest::new("../../etc/passwd", Locator::text("root", "x")))
        .expect_err("rejected");
}

#[rstest]
fn restores_are_announced(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let backup_id = site
        .updater()
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect("update")
        .backup_id
        .expect("backup taken");

    let mut observer = MockObserver::new();
    observer.expect_backup_created().once().return_const(());
    let expected = backup_id.clone();
    observer
        .expect_content_restored()
        .once()
        .withf(move |report: &RestoreReport| report.restored_from == expected)
        .return_const(());
    let updater = site.updater().with_observer(Arc::new(observer));

    updater.restore(&path, &backup_id).expect("restore");
    assert_eq!(site.read(&path), "<p>Hello</p>");
}

#[rstest]
fn a_failed_write_is_retried_once(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let attempts = AtomicUsize::new(0);
    let mut writer = MockWriter::new();
    writer
        .expect_write()
        .times(2)
        .returning(move |path: &Path, contents: &[u8]| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(io::Error::other("transient"))
            } else {
                AtomicFileWriter.write(path, contents)
            }
        });
    let updater = site.updater().with_writer(Arc::new(writer));

    updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect("second attempt succeeds");
    assert_eq!(site.read(&path), "<p>Hi</p>");
}

#[rstest]
fn persistent_write_failures_restore_the_original(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let mut writer = MockWriter::new();
    writer
        .expect_write()
        .withf(|_: &Path, contents: &[u8]| contents == b"<p>Hi</p>".as_slice())
        .times(2)
        .returning(|_, _| Err(disk_full()));
    writer
        .expect_write()
        .withf(|_: &Path, contents: &[u8]| contents == b"<p>Hello</p>".as_slice())
        .once()
        .returning(|path: &Path, contents: &[u8]| AtomicFileWriter.write(path, contents));
    let updater = site.updater().with_writer(Arc::new(writer));

    let error = updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect_err("write fails");

    assert!(
        matches!(error, UpdateError::WriteFailed { restored: true, .. }),
        "{error:?}"
    );
    assert_eq!(site.read(&path), "<p>Hello</p>");
    assert!(updater.history(&path).expect("history").is_empty());
}

#[rstest]
fn failed_rollbacks_raise_a_data_risk_alert(site: Site) {
    let path = site.template("page.html", "<p>Hello</p>");
    let mut writer = MockWriter::new();
    writer
        .expect_write()
        .times(3)
        .returning(|_, _| Err(disk_full()));
    let mut observer = MockObserver::new();
    observer.expect_backup_created().once().return_const(());
    observer
        .expect_data_at_risk()
        .once()
        .withf(|_: &Path, error: &UpdateError| error.is_data_risk())
        .return_const(());
    observer.expect_update_failed().once().return_const(());
    observer.expect_content_updated().never();
    let updater = site
        .updater()
        .with_writer(Arc::new(writer))
        .with_observer(Arc::new(observer));

    let error = updater
        .update(UpdateRequest::new(&path, Locator::text("Hello", "Hi")))
        .expect_err("data at risk");

    assert!(error.is_data_risk(), "{error:?}");
    assert!(error.user_message().contains("operator"));
}
