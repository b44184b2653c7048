//! Config file watching for live layer tuning.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};

/// Spawns a watcher thread for `path`. The receiver yields one message per
/// relevant filesystem event; callers debounce.
pub fn watch_file(path: PathBuf) -> Receiver<()> {
    let (tx, rx) = mpsc::channel::<()>();
    thread::spawn(move || {
        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res {
                match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => {
                        let _ = tx.send(());
                    }
                    _ => {}
                }
            }
        });
        match watcher {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(path.as_path(), RecursiveMode::NonRecursive) {
                    log::warn!("cannot watch {:?}: {}", path, e);
                    return;
                }
                log::info!("watching {:?} for layer changes", path);
                loop {
                    thread::sleep(Duration::from_secs(3600));
                }
            }
            Err(e) => log::warn!("file watcher unavailable: {}", e),
        }
    });
    rx
}

/// Blocks for the next event, then swallows the burst that editors tend to
/// emit for a single save. `false` once the watcher is gone.
pub fn wait_for_change(rx: &Receiver<()>, settle: Duration) -> bool {
    if rx.recv().is_err() {
        return false;
    }
    while rx.recv_timeout(settle).is_ok() {}
    true
}
