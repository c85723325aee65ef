use tokio_util::sync::CancellationToken;

use super::device::{FrameStream, SensorEvent};
use super::recovery::RecoveryHandle;
use crate::session::FrameHandler;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Consecutive unacquirable frames treated as a lost device.
pub const NULL_FRAME_LOSS_THRESHOLD: u32 = 30;

/// Single consumer of the frame queue.
pub async fn frame_pump(
    mut stream: FrameStream,
    handler: FrameHandler,
    recovery: RecoveryHandle,
    cancel: CancellationToken,
) {
    let mut null_frames: u32 = 0;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            SensorEvent::Frame(frame) => {
                null_frames = 0;
                let outcome = handler.handle_frame(frame).await;
                log_debug!("frame handled: {outcome:?}");
            }
            SensorEvent::AcquisitionFailed => {
                null_frames += 1;
                if null_frames >= NULL_FRAME_LOSS_THRESHOLD {
                    log_warn!("{null_frames} consecutive frames could not be acquired");
                    recovery.report_device_lost("frame acquisition keeps failing");
                    null_frames = 0;
                }
            }
            SensorEvent::DeviceLost(reason) => {
                null_frames = 0;
                recovery.report_device_lost(reason);
            }
        }
    }

    log_info!("frame pump shutting down");
}
