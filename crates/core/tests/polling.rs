//! Background polling driven by the tokio scheduler.

use nutpipe_core::dao::{DiskNutDao, NutDao, NutDaoListener};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Forward(mpsc::UnboundedSender<String>);

impl NutDaoListener for Forward {
    fn polling(&self, _pattern: &str, _paths: &HashSet<String>) -> bool {
        true
    }

    fn nut_polled(&self, path: &str, _marker: u64) -> bool {
        let _ = self.0.send(path.to_string());
        true
    }
}

fn touch(path: &Path, content: &str, shift: u64) {
    fs::write(path, content).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(shift))
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_notifies_then_stops() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("site.css");
    fs::write(&file, "a{}").unwrap();

    let dao = DiskNutDao::at(temp.path()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: Arc<dyn NutDaoListener> = Arc::new(Forward(tx));
    dao.observe("site.css", &[listener]).unwrap();

    dao.set_polling_interval(1).unwrap();
    assert_eq!(dao.polling_interval(), 1);

    touch(&file, "b{}", 60);
    let changed = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no change notification")
        .unwrap();
    assert_eq!(changed, "site.css");

    dao.set_polling_interval(-1).unwrap();
    assert_eq!(dao.polling_interval(), -1);
    // Lets an in-flight cycle finish before the next change.
    tokio::time::sleep(Duration::from_millis(300)).await;
    while rx.try_recv().is_ok() {}

    touch(&file, "c{}", 120);
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_polling_without_runtime_is_bad_state() {
    let temp = TempDir::new().unwrap();
    let dao = DiskNutDao::at(temp.path()).unwrap();
    let err = dao.set_polling_interval(5).unwrap_err();
    assert_eq!(err.kind(), nutpipe_core::ErrorKind::BadState);
    // Disabling never needs one.
    dao.set_polling_interval(0).unwrap();
}
