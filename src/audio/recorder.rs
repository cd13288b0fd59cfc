// WavRecorder - microphone capture into a 16-bit mono WAV file
//
// cpal::Stream is !Send, so each recording owns a dedicated thread that
// builds the input stream, drains the lock-free ring buffer into a hound
// writer, and finalizes the file when asked to stop. The audio callback only
// pushes samples and folds the block peak into an atomic.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::{log_capture_error, CaptureError};

/// Seconds of audio the ring buffer can hold before the callback drops samples
const RING_SECONDS: usize = 2;

/// Writer thread poll interval
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// How long `start` waits for the stream thread to report readiness
const READY_TIMEOUT: Duration = Duration::from_secs(3);

/// Description of an available input device
#[derive(Debug, Clone, PartialEq)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

struct ActiveRecording {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Result<(), CaptureError>>,
}

/// Records the default input device into WAV files, one file per `start`/`stop`.
pub struct WavRecorder {
    active: Mutex<Option<ActiveRecording>>,
    peak_bits: Arc<AtomicU32>,
}

impl WavRecorder {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            peak_bits: Arc::new(AtomicU32::new(0.0_f32.to_bits())),
        }
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, Option<ActiveRecording>>, CaptureError> {
        self.active.lock().map_err(|_| CaptureError::LockPoisoned {
            component: "wav_recorder".to_string(),
        })
    }

    pub fn is_recording(&self) -> bool {
        self.lock_active()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Open the default input device and start writing to `path`.
    ///
    /// Blocks until the stream is playing or has failed to open.
    pub fn start(&self, path: &Path) -> Result<(), CaptureError> {
        let mut guard = self.lock_active()?;
        if guard.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        self.peak_bits.store(0.0_f32.to_bits(), Ordering::Relaxed);
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = sync_channel(1);

        let thread_path = path.to_path_buf();
        let thread_stop = Arc::clone(&stop);
        let thread_peak = Arc::clone(&self.peak_bits);
        let thread = std::thread::Builder::new()
            .name("soundwatch-capture".to_string())
            .spawn(move || run_capture_thread(thread_path, thread_stop, thread_peak, ready_tx))
            .map_err(|err| CaptureError::StreamOpenFailed {
                reason: format!("cannot spawn capture thread: {}", err),
            })?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => {
                log::info!("[WavRecorder] Recording to {}", path.display());
                *guard = Some(ActiveRecording {
                    path: path.to_path_buf(),
                    stop,
                    thread,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                let _ = std::fs::remove_file(path);
                Err(err)
            }
            Err(_) => {
                stop.store(true, Ordering::Release);
                reap_abandoned(thread, path.to_path_buf());
                Err(CaptureError::StreamOpenFailed {
                    reason: "input stream did not start in time".to_string(),
                })
            }
        }
    }

    /// Peak absolute amplitude since the previous call, in [0, 1].
    pub fn take_peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.swap(0.0_f32.to_bits(), Ordering::AcqRel))
    }

    /// Stop recording, finalize the WAV file and return its path.
    pub fn stop(&self) -> Result<PathBuf, CaptureError> {
        let recording = self.lock_active()?.take().ok_or(CaptureError::NotActive)?;
        recording.stop.store(true, Ordering::Release);
        match recording.thread.join() {
            Ok(Ok(())) => Ok(recording.path),
            Ok(Err(err)) => {
                log_capture_error(&err, "finalize_recording");
                let _ = std::fs::remove_file(&recording.path);
                Err(err)
            }
            Err(_) => {
                let _ = std::fs::remove_file(&recording.path);
                Err(CaptureError::StreamFailure {
                    reason: "capture thread panicked".to_string(),
                })
            }
        }
    }

    /// Stop recording if active and delete the partial file.
    pub fn discard(&self) {
        match self.stop() {
            Ok(path) => {
                if let Err(err) = std::fs::remove_file(&path) {
                    log::warn!(
                        "[WavRecorder] Could not delete discarded recording {}: {}",
                        path.display(),
                        err
                    );
                }
            }
            Err(CaptureError::NotActive) => {}
            Err(err) => log_capture_error(&err, "discard_recording"),
        }
    }
}

impl Default for WavRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        self.discard();
    }
}

/// Wait for a capture thread that missed its readiness deadline, then delete
/// whatever file it wrote. Runs on its own thread so `start` can return.
fn reap_abandoned(
    thread: JoinHandle<Result<(), CaptureError>>,
    path: PathBuf,
) -> Option<JoinHandle<()>> {
    let spawned = std::thread::Builder::new()
        .name("soundwatch-capture-reaper".to_string())
        .spawn(move || {
            let _ = thread.join();
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!(
                        "[WavRecorder] Could not delete abandoned recording {}: {}",
                        path.display(),
                        err
                    );
                }
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::warn!("[WavRecorder] Cannot spawn reaper thread: {}", err);
            None
        }
    }
}

/// Enumerate input devices on the default host.
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()
        .map_err(|err| CaptureError::StreamOpenFailed {
            reason: format!("cannot enumerate input devices: {}", err),
        })?;

    let mut infos = Vec::new();
    for device in devices {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let config = device.default_input_config().ok();
        infos.push(InputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            sample_rate: config.as_ref().map(|c| c.sample_rate().0),
            channels: config.as_ref().map(|c| c.channels()),
        });
    }
    Ok(infos)
}

fn map_backend_description(description: &str) -> CaptureError {
    let lowered = description.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        CaptureError::PermissionDenied
    } else if lowered.contains("busy") || lowered.contains("unavailable") {
        CaptureError::DeviceUnavailable
    } else {
        CaptureError::StreamOpenFailed {
            reason: description.to_string(),
        }
    }
}

fn map_config_error(err: cpal::DefaultStreamConfigError) -> CaptureError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            map_backend_description(&err.description)
        }
        other => CaptureError::StreamOpenFailed {
            reason: other.to_string(),
        },
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::BuildStreamError::BackendSpecific { err } => map_backend_description(&err.description),
        other => CaptureError::StreamOpenFailed {
            reason: other.to_string(),
        },
    }
}

fn map_play_error(err: cpal::PlayStreamError) -> CaptureError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::PlayStreamError::BackendSpecific { err } => map_backend_description(&err.description),
    }
}

/// Fold `sample` into the stored peak if it is louder.
fn record_peak(peak_bits: &AtomicU32, sample: f32) {
    let _ = peak_bits.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |bits| {
        if sample > f32::from_bits(bits) {
            Some(sample.to_bits())
        } else {
            None
        }
    });
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: Producer<f32>,
    peak_bits: Arc<AtomicU32>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mut block_peak = 0.0_f32;
            // First channel only
            for frame in data.chunks(channels) {
                let sample = frame.first().map(|s| f32::from_sample(*s)).unwrap_or(0.0);
                block_peak = block_peak.max(sample.abs());
                let _ = producer.push(sample);
            }
            record_peak(&peak_bits, block_peak.min(1.0));
        },
        move |err| {
            log::error!("[WavRecorder] Input stream error: {}", err);
            failed.store(true, Ordering::Release);
        },
        None,
    )
}

fn drain_into<W>(
    consumer: &mut Consumer<f32>,
    writer: &mut hound::WavWriter<W>,
) -> Result<(), CaptureError>
where
    W: std::io::Write + std::io::Seek,
{
    while let Ok(sample) = consumer.pop() {
        let scaled = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(scaled)?;
    }
    Ok(())
}

fn run_capture_thread(
    path: PathBuf,
    stop: Arc<AtomicBool>,
    peak_bits: Arc<AtomicU32>,
    ready_tx: SyncSender<Result<(), CaptureError>>,
) -> Result<(), CaptureError> {
    let opened = open_stream(&path, peak_bits);
    let (stream, mut consumer, mut writer, failed) = match opened {
        Ok(parts) => {
            let _ = ready_tx.send(Ok(()));
            parts
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err.clone()));
            return Err(err);
        }
    };

    let mut outcome = Ok(());
    while !stop.load(Ordering::Acquire) {
        if failed.load(Ordering::Acquire) {
            outcome = Err(CaptureError::StreamFailure {
                reason: "input stream reported an error".to_string(),
            });
            break;
        }
        if let Err(err) = drain_into(&mut consumer, &mut writer) {
            outcome = Err(err);
            break;
        }
        std::thread::sleep(DRAIN_INTERVAL);
    }

    drop(stream);
    if outcome.is_ok() {
        outcome = drain_into(&mut consumer, &mut writer);
    }
    writer.finalize()?;
    outcome
}

type OpenedStream = (
    cpal::Stream,
    Consumer<f32>,
    hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    Arc<AtomicBool>,
);

fn open_stream(path: &Path, peak_bits: Arc<AtomicU32>) -> Result<OpenedStream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::DeviceUnavailable)?;
    let supported = device.default_input_config().map_err(map_config_error)?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: config.sample_rate.0,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let writer = hound::WavWriter::create(path, spec)?;

    let capacity = config.sample_rate.0 as usize * RING_SECONDS;
    let (producer, consumer) = RingBuffer::<f32>::new(capacity);
    let failed = Arc::new(AtomicBool::new(false));
    let callback_failed = Arc::clone(&failed);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_input_stream::<f32>(&device, &config, producer, peak_bits, callback_failed)
        }
        cpal::SampleFormat::I16 => {
            build_input_stream::<i16>(&device, &config, producer, peak_bits, callback_failed)
        }
        cpal::SampleFormat::U16 => {
            build_input_stream::<u16>(&device, &config, producer, peak_bits, callback_failed)
        }
        other => {
            return Err(CaptureError::StreamOpenFailed {
                reason: format!("unsupported input sample format {:?}", other),
            })
        }
    }
    .map_err(map_build_error)?;

    stream.play().map_err(map_play_error)?;
    Ok((stream, consumer, writer, failed))
}
