//! Capture worker loop.

use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;

use super::session::CaptureHandle;
use crate::audio::{AudioBackend, DeviceError};

/// Open the input device, report readiness, then read chunks into the
/// session until the handle is no longer current.
///
/// Read errors are logged and retried after one chunk's worth of time; they
/// never end the recording on their own.
pub(crate) fn run(
    handle: CaptureHandle,
    backend: &dyn AudioBackend,
    chunk_bytes: usize,
    retry_delay: Duration,
    ready: SyncSender<Result<(), DeviceError>>,
) {
    let mut input = match backend.open_input(handle.format()) {
        Ok(input) => input,
        Err(e) => {
            log::error!("capture: failed to open input device: {e}");
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    log::info!("capture: started");

    let mut chunk = vec![0u8; chunk_bytes.max(2)];
    let mut failures = 0u64;

    while handle.is_active() {
        match input.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                if !handle.append(&chunk[..n]) {
                    break;
                }
            }
            Err(e) => {
                failures += 1;
                log::error!("capture: device read failed: {e}");
                thread::sleep(retry_delay);
            }
        }
    }

    drop(input);
    if failures > 0 {
        log::warn!("capture: stopped after {failures} failed reads");
    } else {
        log::info!("capture: stopped");
    }
}
