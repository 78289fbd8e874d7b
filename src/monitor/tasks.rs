//! Background Task Runner
//!
//! Listing and transfer jobs run on their own named threads. They hold only the
//! data they were started with and report back through the hand-off channel;
//! the registry is never touched from here.
//!
//! A send failure means the manager is gone, in which case the job stops quietly.

use crate::core::error::CameraError;
use crate::device::media;
use crate::device::tool::{CameraTool, CancelToken};
use crate::device::{DeviceId, DeviceState, StateParam};
use crate::monitor::events::{Message, TaskId, TransferMode};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Everything a transfer job needs, captured when it is started
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub id: DeviceId,
    pub task: TaskId,
    pub indexes: Vec<usize>,
    /// Listing the indexes refer to, used to find each fetched file
    pub files: Vec<String>,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub cancel: CancelToken,
}

/// Fetch the file listing of `id` and send it back as `FilesListed`
pub fn list_files_job(
    tool: Arc<dyn CameraTool>,
    id: DeviceId,
    task: TaskId,
    cancel: CancelToken,
    tx: Sender<Message>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("list-{}", id))
        .spawn(move || {
            let result = match tool.list_files(&id.port_path(), &cancel) {
                Ok(lines) => {
                    info!("Listed {} files on {}", lines.len(), id);
                    Ok(lines)
                }
                Err(e) => {
                    error!("Listing files on {} failed: {}", id, e);
                    Err(e.to_string())
                }
            };
            let _ = tx.send(Message::FilesListed { id, task, result });
        })
}

/// Transfer `request.indexes` one after another on a background thread
pub fn copy_files_job(
    tool: Arc<dyn CameraTool>,
    request: TransferRequest,
    tx: Sender<Message>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-{}", request.mode.verb(), request.id))
        .spawn(move || {
            run_transfer(tool.as_ref(), &request, &tx);
            let _ = tx.send(Message::TaskFinished {
                id: request.id,
                task: request.task,
            });
        })
}

struct Reporter<'a> {
    request: &'a TransferRequest,
    tx: &'a Sender<Message>,
}

impl Reporter<'_> {
    fn send(&self, state: DeviceState, param: impl Into<StateParam>) -> bool {
        self.tx
            .send(Message::Transition {
                id: self.request.id,
                task: self.request.task,
                state,
                param: param.into(),
            })
            .is_ok()
    }

    fn cancelled(&self, done: usize) {
        info!(
            "Transfer on {} cancelled after {} files",
            self.request.id, done
        );
        self.send(
            DeviceState::Idle,
            format!(
                "Cancelled after {} / {} files",
                done,
                self.request.indexes.len()
            ),
        );
    }
}

/// Body of a transfer job, runs on the calling thread
///
/// Indexes are fetched strictly in order. A failing index is recorded and the
/// rest still run. A fetch only counts once its file is in the destination. For moves the originals are deleted only once every fetch
/// succeeded, highest index first so the remaining numbering stays valid.
pub fn run_transfer(tool: &dyn CameraTool, request: &TransferRequest, tx: &Sender<Message>) {
    let reporter = Reporter { request, tx };
    let port_path = request.id.port_path();
    let mode = request.mode;
    let total = request.indexes.len();

    let mut succeeded = Vec::with_capacity(total);
    let mut failed = Vec::new();

    for (n, &index) in request.indexes.iter().enumerate() {
        if request.cancel.is_cancelled() {
            reporter.cancelled(n);
            return;
        }

        let progress = format!("{} {} / {}", mode.progress_verb(), n + 1, total);
        if !reporter.send(mode.state(), progress) {
            return;
        }

        match tool.get_file(&port_path, index, &request.destination, &request.cancel) {
            Ok(()) => match fetched_path(request, index) {
                Some(path) if path.exists() => {
                    debug!("Fetched file {} from {} to {}", index, port_path, path.display());
                    succeeded.push(index);
                }
                Some(path) => {
                    warn!("File {} on {} not copied: {} missing", index, port_path, path.display());
                    failed.push(index);
                }
                None => {
                    warn!("File {} on {} is not in the listing", index, port_path);
                    failed.push(index);
                }
            },
            Err(CameraError::Cancelled { .. }) => {
                reporter.cancelled(n);
                return;
            }
            Err(e) => {
                warn!("File {} on {} failed: {}", index, port_path, e);
                failed.push(index);
            }
        }
    }

    if !failed.is_empty() {
        error!(
            "{} of {} files failed to {} from {}: {:?}",
            failed.len(),
            total,
            mode.verb(),
            port_path,
            failed
        );
        reporter.send(
            DeviceState::Error,
            format!("{} files failed to {}..", failed.len(), mode.verb()),
        );
        return;
    }

    if mode == TransferMode::Move {
        let mut originals = succeeded.clone();
        originals.sort_unstable_by(|a, b| b.cmp(a));
        originals.dedup();

        let mut not_deleted = 0;
        for index in originals {
            match tool.delete_file(&port_path, index, &request.cancel) {
                Ok(()) => debug!("Deleted file {} on {}", index, port_path),
                Err(CameraError::Cancelled { .. }) => {
                    reporter.cancelled(total);
                    return;
                }
                Err(e) => {
                    warn!("Deleting file {} on {} failed: {}", index, port_path, e);
                    not_deleted += 1;
                }
            }
        }

        if not_deleted > 0 {
            reporter.send(
                DeviceState::Error,
                format!("{} files failed to {}..", not_deleted, mode.verb()),
            );
            return;
        }
    }

    info!(
        "{} {} files from {} to {}",
        mode.past_tense(),
        succeeded.len(),
        port_path,
        request.destination.display()
    );
    reporter.send(
        DeviceState::Done,
        format!("{} files {} successfully", succeeded.len(), mode.past_tense()),
    );
}

/// Where the file at 1-based `index` lands once fetched
fn fetched_path(request: &TransferRequest, index: usize) -> Option<PathBuf> {
    let line = request.files.get(index.checked_sub(1)?)?;
    Some(request.destination.join(media::file_name(line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::MockCameraTool;
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::Duration;
    use tempfile::TempDir;

    const PORT: &str = "usb:001,005";

    const FILES: [&str; 3] = [
        "/DCIM/100NIKON/DSC_0001.JPG",
        "/DCIM/100NIKON/DSC_0002.JPG",
        "/DCIM/100NIKON/DSC_0003.NEF",
    ];

    fn camera() -> MockCameraTool {
        MockCameraTool::new().with_camera("Nikon DSC D750", 1, 5, &FILES)
    }

    fn request(dir: &TempDir, indexes: Vec<usize>, mode: TransferMode) -> TransferRequest {
        TransferRequest {
            id: DeviceId::new(1, 5),
            task: 7,
            indexes,
            files: FILES.iter().map(|f| f.to_string()).collect(),
            destination: dir.path().to_path_buf(),
            mode,
            cancel: CancelToken::new(),
        }
    }

    fn transitions(rx: &Receiver<Message>) -> Vec<(DeviceState, String)> {
        rx.try_iter()
            .filter_map(|m| match m {
                Message::Transition { state, param, task, .. } => {
                    assert_eq!(task, 7);
                    Some((state, param.to_string()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fetches_in_given_order_with_progress() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        let (tx, rx) = unbounded();

        run_transfer(&tool, &request(&dir, vec![3, 1, 2], TransferMode::Copy), &tx);

        assert_eq!(tool.fetched(PORT), vec![3, 1, 2]);
        let seen = transitions(&rx);
        assert_eq!(
            seen,
            vec![
                (DeviceState::Copy, "Copying 1 / 3".to_string()),
                (DeviceState::Copy, "Copying 2 / 3".to_string()),
                (DeviceState::Copy, "Copying 3 / 3".to_string()),
                (DeviceState::Done, "3 files copied successfully".to_string()),
            ]
        );
        assert!(dir.path().join("DSC_0003.NEF").exists());
    }

    #[test]
    fn test_one_failure_does_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        tool.fail_get(PORT, 2);
        let (tx, rx) = unbounded();

        run_transfer(&tool, &request(&dir, vec![1, 2, 3], TransferMode::Copy), &tx);

        assert_eq!(tool.fetched(PORT), vec![1, 2, 3]);
        let seen = transitions(&rx);
        assert_eq!(
            seen.last(),
            Some(&(DeviceState::Error, "1 files failed to copy..".to_string()))
        );
        assert!(dir.path().join("DSC_0001.JPG").exists());
        assert!(!dir.path().join("DSC_0002.JPG").exists());
    }

    #[test]
    fn test_move_deletes_highest_index_first() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        let (tx, rx) = unbounded();

        run_transfer(&tool, &request(&dir, vec![1, 3, 2], TransferMode::Move), &tx);

        assert_eq!(tool.deleted(PORT), vec![3, 2, 1]);
        let seen = transitions(&rx);
        assert_eq!(seen[0], (DeviceState::Move, "Moving 1 / 3".to_string()));
        assert_eq!(
            seen.last(),
            Some(&(DeviceState::Done, "3 files moved successfully".to_string()))
        );
        assert!(tool.list_files(PORT, &CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn test_move_keeps_originals_when_a_fetch_fails() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        tool.fail_get(PORT, 3);
        let (tx, rx) = unbounded();

        run_transfer(&tool, &request(&dir, vec![1, 2, 3], TransferMode::Move), &tx);

        assert!(tool.deleted(PORT).is_empty());
        assert_eq!(
            transitions(&rx).last(),
            Some(&(DeviceState::Error, "1 files failed to move..".to_string()))
        );
    }

    #[test]
    fn test_fetch_without_file_counts_as_failed() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        tool.skip_write(PORT, 2);
        let (tx, rx) = unbounded();

        run_transfer(&tool, &request(&dir, vec![1, 2, 3], TransferMode::Move), &tx);

        assert_eq!(tool.fetched(PORT), vec![1, 2, 3]);
        assert!(!dir.path().join("DSC_0002.JPG").exists());
        assert!(tool.deleted(PORT).is_empty());
        assert_eq!(
            transitions(&rx).last(),
            Some(&(DeviceState::Error, "1 files failed to move..".to_string()))
        );
    }

    #[test]
    fn test_index_outside_listing_counts_as_failed() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        let (tx, rx) = unbounded();
        let mut req = request(&dir, vec![1, 2], TransferMode::Copy);
        req.files.truncate(1);

        run_transfer(&tool, &req, &tx);

        assert_eq!(
            transitions(&rx).last(),
            Some(&(DeviceState::Error, "1 files failed to copy..".to_string()))
        );
    }

    #[test]
    fn test_move_reports_failed_deletes() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        tool.fail_delete(PORT, 2);
        let (tx, rx) = unbounded();

        run_transfer(&tool, &request(&dir, vec![1, 2], TransferMode::Move), &tx);

        assert_eq!(tool.deleted(PORT), vec![2, 1]);
        assert_eq!(
            transitions(&rx).last(),
            Some(&(DeviceState::Error, "1 files failed to move..".to_string()))
        );
    }

    #[test]
    fn test_cancel_before_start_stops_immediately() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        let (tx, rx) = unbounded();
        let req = request(&dir, vec![1, 2, 3], TransferMode::Copy);
        req.cancel.cancel();

        run_transfer(&tool, &req, &tx);

        assert!(tool.fetched(PORT).is_empty());
        assert_eq!(
            transitions(&rx),
            vec![(DeviceState::Idle, "Cancelled after 0 / 3 files".to_string())]
        );
    }

    #[test]
    fn test_cancel_mid_transfer() {
        let dir = TempDir::new().unwrap();
        let tool = camera();
        tool.set_transfer_delay(Duration::from_secs(5));
        let (tx, rx) = unbounded();
        let req = request(&dir, vec![1, 2, 3], TransferMode::Copy);
        let token = req.cancel.clone();

        let handle = copy_files_job(Arc::new(tool.clone()), req, tx).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        token.cancel();
        handle.join().unwrap();

        assert_eq!(tool.fetched(PORT), vec![1]);
        let messages: Vec<_> = rx.try_iter().collect();
        assert!(matches!(
            messages.last(),
            Some(Message::TaskFinished { task: 7, .. })
        ));
        let last_transition = messages.iter().rev().find_map(|m| match m {
            Message::Transition { state, param, .. } => Some((*state, param.to_string())),
            _ => None,
        });
        assert_eq!(
            last_transition,
            Some((DeviceState::Idle, "Cancelled after 0 / 3 files".to_string()))
        );
    }

    #[test]
    fn test_list_job_reports_lines_and_errors() {
        let tool = camera();
        tool.fail_listing("usb:002,001", "*** Error: Could not claim the USB device ***");
        let tool: Arc<dyn CameraTool> = Arc::new(tool);
        let (tx, rx) = unbounded();

        list_files_job(tool.clone(), DeviceId::new(1, 5), 1, CancelToken::new(), tx.clone())
            .unwrap()
            .join()
            .unwrap();
        list_files_job(tool, DeviceId::new(2, 1), 2, CancelToken::new(), tx)
            .unwrap()
            .join()
            .unwrap();

        let results: Vec<_> = rx.try_iter().collect();
        match &results[0] {
            Message::FilesListed { task: 1, result: Ok(lines), .. } => assert_eq!(lines.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        match &results[1] {
            Message::FilesListed { task: 2, result: Err(text), .. } => {
                assert!(text.contains("Could not claim"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
