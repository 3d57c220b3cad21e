//! Playback worker loop.
//!
//! The output device consumes audio on its own callback thread; this loop
//! only tracks *where* playback is. Every tick it adds the elapsed wall time
//! scaled by the current speed to the played duration, and publishes the
//! resulting cursor. When the played duration covers the rest of the buffer
//! the pass is complete.

use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::{Duration, Instant};

use super::session::{Finish, PlaybackHandle};
use crate::audio::{AudioBackend, DeviceError, OutputStream, PlaybackSource};

enum Outcome {
    Completed,
    Interrupted,
    Failed(DeviceError),
}

pub(crate) fn run(
    handle: PlaybackHandle,
    backend: &dyn AudioBackend,
    tick: Duration,
    ready: SyncSender<Result<(), DeviceError>>,
) {
    let mut ready = Some(ready);
    let format = handle.format();
    let pcm = handle.pcm();

    loop {
        let Some(start_ms) = handle.start_ms() else {
            break;
        };
        let start_offset = format.bytes_for_ms(start_ms).min(format.align_down(pcm.len()));
        let remaining_ms = format.duration_secs(pcm.len() - start_offset) * 1000.0;

        let source = PlaybackSource {
            pcm: handle.pcm(),
            format,
            start_offset,
            speed: handle.speed(),
        };
        let opened = backend
            .open_output(source)
            .and_then(|mut output| output.play().map(|()| output));
        let mut output = match opened {
            Ok(output) => output,
            Err(e) => {
                log::error!("playback: failed to start output: {e}");
                match ready.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e));
                    }
                    None => handle.abort(),
                }
                return;
            }
        };
        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }
        log::info!(
            "playback: playing {:.0} ms from {start_ms} ms",
            remaining_ms
        );

        let outcome = play_pass(&handle, output.as_mut(), start_ms, remaining_ms, tick);
        output.stop();
        drop(output);

        match outcome {
            Outcome::Completed => match handle.finish() {
                Finish::Repeat => {
                    log::debug!("playback: repeating from start");
                    continue;
                }
                Finish::Stopped => {
                    log::info!("playback: reached end");
                    break;
                }
            },
            Outcome::Interrupted => {
                log::info!("playback: stopped");
                break;
            }
            Outcome::Failed(e) => {
                log::error!("playback: device error: {e}");
                handle.abort();
                break;
            }
        }
    }
}

fn play_pass(
    handle: &PlaybackHandle,
    output: &mut dyn OutputStream,
    start_ms: u64,
    duration_ms: f64,
    tick: Duration,
) -> Outcome {
    let speed = handle.speed();
    let mut played_ms = 0.0_f64;
    let mut last = Instant::now();

    while played_ms < duration_ms {
        thread::sleep(tick);
        if !handle.is_active() {
            return Outcome::Interrupted;
        }
        if let Some(e) = output.take_error() {
            return Outcome::Failed(e);
        }

        let now = Instant::now();
        played_ms += now.duration_since(last).as_secs_f64() * 1000.0 * speed.get() as f64;
        last = now;

        let position = start_ms + played_ms.min(duration_ms) as u64;
        if !handle.advance(position) {
            return Outcome::Interrupted;
        }
    }
    Outcome::Completed
}
