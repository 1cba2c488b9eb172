//! FFmpeg-backed camera and microphone.

use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vigil_models::Frame;

use crate::collaborators::{AudioSource, FrameSource};
use crate::config::PerceptionConfig;
use crate::error::{PerceptionError, PerceptionResult};

/// How long the camera gets to deliver its first frame on open.
pub const CAMERA_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Locate the ffmpeg binary.
pub fn check_ffmpeg() -> PerceptionResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| PerceptionError::config_error("ffmpeg not found in PATH"))
}

/// Arguments for a raw RGB24 stream from the camera on stdout.
pub fn camera_args(config: &PerceptionConfig) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        config.camera_input_format.clone(),
        "-framerate".to_string(),
        config.camera_fps.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", config.frame_width, config.frame_height),
        "-i".to_string(),
        config.camera_device.clone(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-".to_string(),
    ]
}

/// Arguments for one mono 16-bit WAV recording on stdout.
pub fn microphone_args(
    input_format: &str,
    device: &str,
    sample_rate: u32,
    duration: Duration,
) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        input_format.to_string(),
        "-i".to_string(),
        device.to_string(),
        "-t".to_string(),
        format!("{:.3}", duration.as_secs_f64()),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        sample_rate.to_string(),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
        "-f".to_string(),
        "wav".to_string(),
        "-".to_string(),
    ]
}

/// Read one `width`x`height` RGB24 frame. `None` at end of stream.
pub fn read_frame<R: Read>(reader: &mut R, width: u32, height: u32) -> PerceptionResult<Option<Frame>> {
    let mut buf = vec![0u8; width as usize * height as usize * 3];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(Frame::new(width, height, buf))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(PerceptionError::camera(e.to_string())),
    }
}

/// Block until `reader` yields one full frame, at most `timeout`.
///
/// The reader is handed back with the frame so streaming can continue.
/// End of stream, a read error or the timeout all fail with a camera error.
pub fn await_first_frame<R>(
    mut reader: R,
    width: u32,
    height: u32,
    timeout: Duration,
) -> PerceptionResult<(R, Frame)>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("camera-open".to_string())
        .spawn(move || {
            let first = read_frame(&mut reader, width, height);
            let _ = tx.send((reader, first));
        })
        .map_err(|e| PerceptionError::camera(format!("failed to spawn reader: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok((reader, Ok(Some(frame)))) => Ok((reader, frame)),
        Ok((_, Ok(None))) => Err(PerceptionError::camera("camera stream ended before the first frame")),
        Ok((_, Err(e))) => Err(e),
        Err(_) => Err(PerceptionError::camera(format!(
            "no frame within {}s",
            timeout.as_secs_f64()
        ))),
    }
}

struct CameraProcess {
    child: Child,
    stdout: ChildStdout,
    /// Frame read while opening, returned by the first `read`
    pending: Option<Frame>,
}

/// Camera frames streamed from a long-running ffmpeg process.
pub struct FfmpegCamera {
    process: Mutex<CameraProcess>,
    width: u32,
    height: u32,
}

impl FfmpegCamera {
    /// Spawn ffmpeg against the configured device and wait for its first frame.
    ///
    /// Fails when the device cannot be opened, so startup can abort.
    pub fn open(config: &PerceptionConfig) -> PerceptionResult<Self> {
        check_ffmpeg()?;
        let args = camera_args(config);
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PerceptionError::camera(format!("failed to start ffmpeg: {e}")))?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(PerceptionError::camera("ffmpeg stdout not captured"));
        };

        let (stdout, first) = match await_first_frame(
            stdout,
            config.frame_width,
            config.frame_height,
            CAMERA_OPEN_TIMEOUT,
        ) {
            Ok(opened) => opened,
            Err(e) => {
                let _ = child.kill();
                let status = child.wait().map(|s| s.to_string()).unwrap_or_default();
                return Err(PerceptionError::camera(format!(
                    "{} failed to open: {} ({})",
                    config.camera_device, e, status
                )));
            }
        };

        info!(
            device = %config.camera_device,
            width = config.frame_width,
            height = config.frame_height,
            "Camera opened"
        );
        Ok(Self {
            process: Mutex::new(CameraProcess {
                child,
                stdout,
                pending: Some(first),
            }),
            width: config.frame_width,
            height: config.frame_height,
        })
    }
}

impl FrameSource for FfmpegCamera {
    fn read(&self) -> PerceptionResult<Option<Frame>> {
        let mut process = self.process.lock();
        if let Some(frame) = process.pending.take() {
            return Ok(Some(frame));
        }
        let frame = read_frame(&mut process.stdout, self.width, self.height)?;
        if frame.is_none() {
            if let Ok(Some(status)) = process.child.try_wait() {
                return Err(PerceptionError::camera(format!("ffmpeg exited with {status}")));
            }
        }
        Ok(frame)
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        let process = self.process.get_mut();
        if let Err(e) = process.child.kill() {
            debug!("Camera process already gone: {}", e);
        }
        let _ = process.child.wait();
    }
}

/// One ffmpeg invocation per recording.
pub struct FfmpegMicrophone {
    input_format: String,
    device: String,
    sample_rate: u32,
}

impl FfmpegMicrophone {
    pub fn new(config: &PerceptionConfig) -> Self {
        Self {
            input_format: config.audio_input_format.clone(),
            device: config.audio_device.clone(),
            sample_rate: config.audio_sample_rate,
        }
    }
}

impl AudioSource for FfmpegMicrophone {
    fn record(&self, duration: Duration) -> PerceptionResult<Option<Vec<u8>>> {
        if check_ffmpeg().is_err() {
            return Ok(None);
        }
        let args = microphone_args(&self.input_format, &self.device, self.sample_rate, duration);
        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| PerceptionError::microphone(e.to_string()))?;

        if !output.status.success() {
            warn!(
                "Microphone recording failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }
        if output.stdout.is_empty() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_camera_args_request_rgb24() {
        let config = PerceptionConfig::default();
        let args = camera_args(&config);
        let joined = args.join(" ");
        assert!(joined.contains("-f v4l2"));
        assert!(joined.contains("-video_size 640x480"));
        assert!(joined.contains("-i /dev/video0"));
        assert!(joined.ends_with("-pix_fmt rgb24 -"));
    }

    #[test]
    fn test_microphone_args() {
        let args = microphone_args("alsa", "default", 16000, Duration::from_millis(2500));
        let joined = args.join(" ");
        assert!(joined.contains("-t 2.500"));
        assert!(joined.contains("-ac 1 -ar 16000"));
        assert!(joined.ends_with("-f wav -"));
    }

    #[test]
    fn test_read_frame_splits_stream() {
        let mut bytes = vec![7u8; 2 * 2 * 3];
        bytes.extend(vec![9u8; 2 * 2 * 3]);
        bytes.extend([1u8, 2]);
        let mut reader = Cursor::new(bytes);

        assert_eq!(read_frame(&mut reader, 2, 2).unwrap(), Some(Frame::solid(2, 2, [7, 7, 7])));
        assert_eq!(read_frame(&mut reader, 2, 2).unwrap(), Some(Frame::solid(2, 2, [9, 9, 9])));
        // Partial trailing frame reads as end of stream.
        assert_eq!(read_frame(&mut reader, 2, 2).unwrap(), None);
    }

    #[test]
    fn test_first_frame_is_returned_with_reader() {
        let mut bytes = vec![3u8; 2 * 2 * 3];
        bytes.extend(vec![4u8; 2 * 2 * 3]);
        let (mut reader, first) =
            await_first_frame(Cursor::new(bytes), 2, 2, Duration::from_secs(5)).unwrap();
        assert_eq!(first, Frame::solid(2, 2, [3, 3, 3]));
        assert_eq!(read_frame(&mut reader, 2, 2).unwrap(), Some(Frame::solid(2, 2, [4, 4, 4])));
    }

    #[test]
    fn test_stream_ending_at_once_fails_open() {
        let err = await_first_frame(Cursor::new(Vec::new()), 2, 2, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, PerceptionError::Camera(_)), "{err}");
    }

    #[derive(Debug)]
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            thread::sleep(Duration::from_secs(2));
            Ok(0)
        }
    }

    #[test]
    fn test_silent_camera_times_out() {
        let started = std::time::Instant::now();
        let err = await_first_frame(Stalled, 2, 2, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, PerceptionError::Camera(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
