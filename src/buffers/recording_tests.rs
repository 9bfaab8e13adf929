//! Tests for the recording buffer

use super::*;
use crate::clock::ManualClock;
use std::sync::atomic::{AtomicUsize, Ordering};

const NOW: i64 = 1_700_000_000;

/// Source whose streams see the data as it was when they were opened,
/// like a file handle with a cached length.
#[derive(Clone, Default)]
struct MockSource {
    data: Arc<Mutex<Vec<u8>>>,
    opens: Arc<AtomicUsize>,
    opened_urls: Arc<Mutex<Vec<String>>>,
    existing: Vec<String>,
    /// Opens after this many succeed fail with `TimedOut`
    fail_after: Option<usize>,
}

impl MockSource {
    fn with_data(data: &[u8]) -> Self {
        let source = Self::default();
        source.append(data);
        source
    }

    fn append(&self, more: &[u8]) {
        self.data.lock().unwrap().extend_from_slice(more);
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct MockStream {
    snapshot: Vec<u8>,
    position: u64,
}

impl StreamSource for MockSource {
    type Stream = MockStream;

    fn open(&self, url: &str, offset: u64) -> io::Result<MockStream> {
        let opened = self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| opened >= n) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "backend went away"));
        }
        self.opened_urls.lock().unwrap().push(url.to_string());
        Ok(MockStream {
            snapshot: self.data.lock().unwrap().clone(),
            position: offset,
        })
    }

    fn exists(&self, url: &str) -> bool {
        self.existing.iter().any(|e| e == url)
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = (self.position as usize).min(self.snapshot.len());
        let n = buf.len().min(self.snapshot.len() - start);
        buf[..n].copy_from_slice(&self.snapshot[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for MockStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(d) => (self.position as i64 + d) as u64,
            SeekFrom::End(d) => (self.snapshot.len() as i64 + d) as u64,
        };
        Ok(self.position)
    }
}

impl InputStream for MockStream {
    fn length(&self) -> u64 {
        self.snapshot.len() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }
}

fn buffer(source: &MockSource, offset: i64, clock: &ManualClock) -> RecordingBuffer<MockSource> {
    RecordingBuffer::new(source.clone(), offset).with_clock(Arc::new(clock.clone()))
}

fn live_recording(started_secs_ago: i64) -> RecordingInfo {
    RecordingInfo {
        recording_time: NOW - started_secs_ago,
        duration: 3600,
        directory: String::new(),
    }
}

fn finished_recording() -> RecordingInfo {
    RecordingInfo {
        recording_time: NOW - 7200,
        duration: 3600,
        directory: String::new(),
    }
}

#[test]
fn test_finished_recording_has_fixed_duration() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &finished_recording()).unwrap();

    assert_eq!(buf.duration(), 3600);
    clock.advance(1000);
    assert_eq!(buf.duration(), 3600);
    assert!(!buf.is_live());
    assert!(buf.duration_probe().is_none());
    assert_eq!(buf.stream_times().start_time, NOW - 7200);
}

#[test]
fn test_finished_recording_never_reopens() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &finished_recording()).unwrap();

    let mut data = [0u8; 8];
    assert_eq!(buf.read(&mut data).unwrap(), 4);
    source.append(b"efgh");
    assert_eq!(buf.read(&mut data).unwrap(), 0);
    assert_eq!(source.opens(), 1);
}

#[test]
fn test_recording_ending_exactly_now_is_finished() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    let recording = RecordingInfo {
        recording_time: NOW - 3600,
        duration: 3600,
        directory: String::new(),
    };
    buf.open("http://backend/rec.ts", &recording).unwrap();
    assert!(!buf.is_live());
    assert_eq!(buf.duration(), 3600);
}

#[test]
fn test_live_start_time_includes_server_offset() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 30, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();

    assert!(buf.is_live());
    assert_eq!(buf.stream_times().start_time, NOW - 70);
    assert!(buf.duration_probe().is_some());
}

#[test]
fn test_duration_inside_settle_margin_is_zero() {
    let source = MockSource::with_data(&[0u8; 1000]);
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(5)).unwrap();

    assert!(buf.is_live());
    assert_eq!(buf.duration(), 0);
    assert!(!buf.is_live());
}

#[test]
fn test_duration_reader_behind_writer_stays_live() {
    let source = MockSource::with_data(&[0u8; 1000]);
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();
    buf.seek(SeekFrom::Start(999)).unwrap();

    // 1000 bytes / 90 s = 11 bytes/s, 1 byte left: 11 >= 10
    assert_eq!(buf.duration(), 90);
    assert!(buf.is_live());
}

#[test]
fn test_duration_reader_caught_up_clears_liveness() {
    let source = MockSource::with_data(&[0u8; 500]);
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();
    buf.seek(SeekFrom::Start(499)).unwrap();

    // 500 / 90 = 5 bytes/s, 1 byte left: 5 < 10
    assert_eq!(buf.duration(), 90);
    assert!(!buf.is_live());

    // liveness comes back once the reader falls behind again
    buf.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(buf.duration(), 90);
    assert!(buf.is_live());
}

#[test]
fn test_empty_read_while_live_reopens_at_position() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();

    let mut data = [0u8; 8];
    assert_eq!(buf.read(&mut data).unwrap(), 4);
    assert_eq!(&data[..4], b"abcd");

    source.append(b"efgh");
    let n = buf.read(&mut data).unwrap();
    assert_eq!(n, 4);
    assert_eq!(&data[..4], b"efgh");
    assert_eq!(source.opens(), 2);
    assert_eq!(buf.position(), 8);
    assert_eq!(buf.length(), 8);
}

#[test]
fn test_second_empty_read_is_end_of_data() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();

    let mut data = [0u8; 8];
    assert_eq!(buf.read(&mut data).unwrap(), 4);
    assert_eq!(buf.read(&mut data).unwrap(), 0);
    // exactly one reopen for the empty read
    assert_eq!(source.opens(), 2);
    assert_eq!(buf.position(), 4);
}

#[test]
fn test_no_reopen_once_liveness_cleared() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(5)).unwrap();

    let mut data = [0u8; 8];
    assert_eq!(buf.read(&mut data).unwrap(), 4);
    assert_eq!(buf.duration(), 0);
    assert!(!buf.is_live());

    assert_eq!(buf.read(&mut data).unwrap(), 0);
    assert_eq!(source.opens(), 1);
}

#[test]
fn test_stream_times_pts_range() {
    let source = MockSource::with_data(&[0u8; 1000]);
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);

    buf.open("http://backend/rec.ts", &finished_recording()).unwrap();
    let times = buf.stream_times();
    assert_eq!(times.pts_start, 0);
    assert_eq!(times.pts_begin, 0);
    assert_eq!(times.pts_end, 3600 * DVD_TIME_BASE);

    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();
    assert_eq!(buf.stream_times().pts_end, 90 * DVD_TIME_BASE);
}

#[test]
fn test_directory_url() {
    assert_eq!(directory_url(r"\\server\share\rec.ts"), "smb://server/share/rec.ts");
    assert_eq!(directory_url(r"C:\Recordings\rec.ts"), "C:/Recordings/rec.ts");
    assert_eq!(directory_url("/srv/recordings/rec.ts"), "/srv/recordings/rec.ts");
}

#[test]
fn test_open_prefers_reachable_directory() {
    let source = MockSource {
        existing: vec!["smb://server/share/rec.ts".to_string()],
        ..MockSource::with_data(b"abcd")
    };
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    let recording = RecordingInfo {
        directory: r"\\server\share\rec.ts".to_string(),
        ..finished_recording()
    };
    buf.open("http://backend/rec.ts", &recording).unwrap();
    assert_eq!(buf.recording_url(), "smb://server/share/rec.ts");
    assert_eq!(
        source.opened_urls.lock().unwrap().as_slice(),
        ["smb://server/share/rec.ts".to_string()]
    );
}

#[test]
fn test_open_falls_back_to_backend_url() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    let recording = RecordingInfo {
        directory: r"\\server\share\rec.ts".to_string(),
        ..live_recording(100)
    };
    buf.open("http://backend/rec.ts", &recording).unwrap();
    assert_eq!(buf.recording_url(), "http://backend/rec.ts");

    // reopen goes to the same resolved URL
    let mut data = [0u8; 8];
    buf.read(&mut data).unwrap();
    buf.read(&mut data).unwrap();
    assert_eq!(
        source.opened_urls.lock().unwrap().as_slice(),
        ["http://backend/rec.ts".to_string(), "http://backend/rec.ts".to_string()]
    );
}

#[test]
fn test_probe_polls_from_another_thread() {
    let source = MockSource::with_data(&[0u8; 1000]);
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();

    let probe = buf.duration_probe().unwrap();
    let handle = std::thread::spawn(move || (probe.duration(), probe.is_live()));
    let (duration, live) = handle.join().unwrap();
    assert_eq!(duration, 90);
    assert!(live);
}

#[test]
fn test_unopened_buffer() {
    let source = MockSource::default();
    let mut buf = RecordingBuffer::new(source, 0);
    let mut data = [0u8; 4];
    let err = buf.read(&mut data).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    assert_eq!(buf.duration(), 0);
    assert_eq!(buf.position(), 0);
    assert!(!buf.is_open());
}

#[test]
fn test_close_releases_stream() {
    let source = MockSource::with_data(b"abcd");
    let clock = ManualClock::new(NOW);
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();
    assert!(buf.is_open());
    buf.close();
    assert!(!buf.is_open());
    assert!(!buf.is_live());
    assert!(buf.seek(SeekFrom::Start(0)).is_err());
}

#[test]
fn test_failed_reopen_keeps_current_stream() {
    let clock = ManualClock::new(NOW);
    let source = MockSource {
        fail_after: Some(1),
        ..MockSource::with_data(b"abcd")
    };
    let mut buf = buffer(&source, 0, &clock);
    buf.open("http://backend/rec.ts", &live_recording(100)).unwrap();

    let mut data = [0u8; 4];
    assert_eq!(buf.read(&mut data).unwrap(), 4);
    let err = buf.read(&mut data).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert_eq!(source.opens(), 2);

    // the first handle is still usable
    assert!(buf.is_open());
    assert_eq!(buf.position(), 4);
    assert_eq!(buf.length(), 4);
    assert_eq!(buf.seek(SeekFrom::Start(0)).unwrap(), 0);
    assert_eq!(buf.read(&mut data).unwrap(), 4);
    assert_eq!(&data, b"abcd");
}

#[test]
fn test_extreme_recording_times_saturate() {
    let clock = ManualClock::new(NOW);
    let source = MockSource::with_data(b"abcd");
    let mut buf = buffer(&source, 3600, &clock);
    let recording = RecordingInfo {
        recording_time: i64::MAX - 10,
        duration: 3600,
        directory: String::new(),
    };
    buf.open("http://backend/rec.ts", &recording).unwrap();
    assert!(buf.is_live());

    let times = buf.stream_times();
    assert_eq!(times.start_time, i64::MAX);
    assert_eq!(times.pts_end, 0);
    assert!(!buf.is_live());
}
