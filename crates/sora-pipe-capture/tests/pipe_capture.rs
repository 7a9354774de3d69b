//! End-to-end capture through a real FIFO and a regular file.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sora_core::{I420Frame, VideoSink};
use sora_pipe_capture::{CaptureError, PipeCaptureConfig, PipeVideoCapturer};

const WIDTH: u32 = 32;
const HEIGHT: u32 = 24;
const FRAME_SIZE: usize = 32 * 24 * 3 / 2;

struct Recorder(Mutex<Sender<I420Frame>>);

impl VideoSink for Recorder {
    fn on_frame(&self, frame: &I420Frame) {
        let _ = self.0.lock().unwrap().send(frame.clone());
    }
}

fn recorder() -> (Arc<Recorder>, Receiver<I420Frame>) {
    let (tx, rx) = mpsc::channel();
    (Arc::new(Recorder(Mutex::new(tx))), rx)
}

fn mkfifo(dir: &Path) -> PathBuf {
    let path = dir.join("video.fifo");
    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);
    path
}

/// Descriptors of this process currently open on `path`.
#[cfg(target_os = "linux")]
fn open_descriptors(path: &Path) -> usize {
    std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
        .filter(|target| target == path)
        .count()
}

fn pattern_frame(index: u8) -> Vec<u8> {
    (0..FRAME_SIZE).map(|i| (i as u8).wrapping_add(index.wrapping_mul(31))).collect()
}

fn config(path: &Path) -> PipeCaptureConfig {
    PipeCaptureConfig {
        video_fifo: path.to_str().unwrap().to_owned(),
        width: WIDTH,
        height: HEIGHT,
        framerate: 30,
        ready_timeout: Duration::from_millis(50),
    }
}

#[test]
fn frames_written_to_fifo_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = mkfifo(dir.path());

    let writer_path = fifo.clone();
    let writer = thread::spawn(move || {
        let mut w = OpenOptions::new().write(true).open(writer_path).unwrap();
        for i in 0..5u8 {
            w.write_all(&pattern_frame(i)).unwrap();
        }
    });

    let (sink, frames) = recorder();
    let capturer = PipeVideoCapturer::create(&config(&fifo), sink).unwrap();
    writer.join().unwrap();

    for i in 0..5u8 {
        let frame = frames.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(frame.width(), WIDTH);
        assert_eq!(frame.height(), HEIGHT);
        assert_eq!(frame.data().as_ref(), pattern_frame(i).as_slice());
    }
    assert!(frames.recv_timeout(Duration::from_millis(200)).is_err());
    drop(capturer);
}

#[test]
fn timestamps_are_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = mkfifo(dir.path());

    let writer_path = fifo.clone();
    let writer = thread::spawn(move || {
        let mut w = OpenOptions::new().write(true).open(writer_path).unwrap();
        for i in 0..3u8 {
            w.write_all(&pattern_frame(i)).unwrap();
        }
    });

    let (sink, frames) = recorder();
    let _capturer = PipeVideoCapturer::create(&config(&fifo), sink).unwrap();
    writer.join().unwrap();

    let stamps: Vec<u64> = (0..3)
        .map(|_| frames.recv_timeout(Duration::from_secs(5)).unwrap().timestamp_us())
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{stamps:?}");
}

#[test]
fn partial_frame_then_close_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = mkfifo(dir.path());

    let writer_path = fifo.clone();
    let writer = thread::spawn(move || {
        let mut w = OpenOptions::new().write(true).open(writer_path).unwrap();
        w.write_all(&pattern_frame(0)[..FRAME_SIZE / 2]).unwrap();
    });

    let (sink, frames) = recorder();
    let _capturer = PipeVideoCapturer::create(&config(&fifo), sink).unwrap();
    writer.join().unwrap();

    assert!(frames.recv_timeout(Duration::from_millis(500)).is_err());
}

#[test]
fn restart_with_new_size_rereads_from_the_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.yuv");
    let contents: Vec<u8> = (0..3072u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &contents).unwrap();

    let (sink, frames) = recorder();
    let mut capturer = PipeVideoCapturer::new(sink).with_ready_timeout(Duration::from_millis(50));
    capturer.init(path.to_str().unwrap()).unwrap();

    // 32x32 → 1536-byte frames, two per file.
    capturer.start_capture(32, 32, 30).unwrap();
    for i in 0..2 {
        let frame = frames.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(frame.data().as_ref(), &contents[i * 1536..(i + 1) * 1536]);
    }

    #[cfg(target_os = "linux")]
    assert_eq!(open_descriptors(&path), 1);

    // 64x32 → one 3072-byte frame, read from offset zero of a fresh descriptor.
    capturer.start_capture(64, 32, 30).unwrap();
    #[cfg(target_os = "linux")]
    assert_eq!(open_descriptors(&path), 1, "old descriptor left open");
    let frame = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((frame.width(), frame.height()), (64, 32));
    assert_eq!(frame.data().as_ref(), contents.as_slice());
    assert!(frames.recv_timeout(Duration::from_millis(200)).is_err());

    capturer.stop_capture();
    capturer.stop_capture();
    assert!(!capturer.is_started());
    #[cfg(target_os = "linux")]
    assert_eq!(open_descriptors(&path), 0);
}

#[test]
fn create_fails_for_missing_path() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _frames) = recorder();
    let err = PipeVideoCapturer::create(&config(&dir.path().join("missing")), sink).err().unwrap();
    assert!(matches!(err, CaptureError::Open { .. }));
}
