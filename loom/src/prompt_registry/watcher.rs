//! Recursive file-watcher for a prompt (or agent-config) directory.
//! Debounces bursts of filesystem events and republishes them as a
//! single-consumer update feed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use tokio::sync::mpsc;

/// What happened to one file, after debouncing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsAction {
    Created,
    Modified,
    Removed,
}

#[derive(Clone, Debug)]
pub struct FsChange {
    pub path: PathBuf,
    pub action: FsAction,
}

/// Spawns a background debounced watcher over `root` (recursive) and returns
/// a receiver of coalesced `.yaml`/`.yml` file changes. The watcher and its
/// channel are dropped (and the underlying OS watch torn down) when the
/// returned handle is dropped.
pub fn watch(root: &Path, debounce: Duration) -> (mpsc::UnboundedReceiver<FsChange>, WatchHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| {
        let _ = raw_tx.send(res);
    })
    .expect("failed to create filesystem debouncer");

    let _ = debouncer.watcher().watch(root, notify::RecursiveMode::Recursive);

    tokio::spawn(async move {
        while let Some(res) = raw_rx.recv().await {
            if let Ok(events) = res {
                for ev in events {
                    if !is_yaml(&ev.path) {
                        continue;
                    }
                    let action = match ev.kind {
                        DebouncedEventKind::Any => {
                            if ev.path.exists() {
                                FsAction::Modified
                            } else {
                                FsAction::Removed
                            }
                        }
                        _ => FsAction::Modified,
                    };
                    if tx
                        .send(FsChange {
                            path: ev.path,
                            action,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    });

    (rx, WatchHandle { _debouncer: debouncer })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Keeps the underlying OS watch alive; drop to stop watching.
pub struct WatchHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}
