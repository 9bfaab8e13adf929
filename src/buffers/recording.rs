//! Buffer for playing back recordings, including ones still in progress
//!
//! While a recording is being written its underlying stream can report
//! end-of-file before the backend has finished. For such recordings the
//! buffer estimates an apparent duration from wall-clock time, tracks
//! whether the writer is still ahead of the reader, and reopens the stream
//! once when a read comes back empty.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

use super::input::{InputStream, StreamSource};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;

/// PTS ticks per second
pub const DVD_TIME_BASE: i64 = 1_000_000;

/// Seconds subtracted from wall-clock elapsed time while recording
const LIVE_SETTLE_SECS: i64 = 10;
/// Below this many "remaining bytes x bytes per second" the reader has caught up
const CAUGHT_UP_THRESHOLD: u64 = 10;

/// Recording metadata as reported by the backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingInfo {
    /// Start of the recording, Unix seconds (backend clock)
    pub recording_time: i64,
    /// Scheduled duration in seconds
    pub duration: i64,
    /// Local or network path of the recording file, empty if unknown
    pub directory: String,
}

/// Stream timing reported to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTimes {
    pub start_time: i64,
    pub pts_start: i64,
    pub pts_begin: i64,
    pub pts_end: i64,
}

/// Map a recording directory to a URL the stream source understands:
/// backslashes become slashes and UNC paths become `smb:` URLs.
pub fn directory_url(directory: &str) -> String {
    let path = directory.replace('\\', "/");
    if path.starts_with("//") {
        format!("smb:{}", path)
    } else {
        path
    }
}

/// Prefer the recording's own file when the source can reach it
pub fn resolve_recording_url<S: StreamSource + ?Sized>(
    source: &S,
    url: &str,
    directory: &str,
) -> String {
    if !directory.is_empty() {
        let local = directory_url(directory);
        if source.exists(&local) {
            return local;
        }
    }
    url.to_string()
}

struct LiveState<T> {
    stream: Option<T>,
    is_live: bool,
}

impl<T: InputStream> LiveState<T> {
    fn stream_mut(&mut self) -> io::Result<&mut T> {
        self.stream.as_mut().ok_or_else(not_open)
    }
}

/// Recording still being written; shared with [`DurationProbe`]s
struct LiveRecording<T> {
    start_time: i64,
    state: Arc<Mutex<LiveState<T>>>,
}

/// Finished recording; its duration never changes
struct StaticDuration<T> {
    duration: i64,
    stream: Option<T>,
}

impl<T: InputStream> StaticDuration<T> {
    fn stream_mut(&mut self) -> io::Result<&mut T> {
        self.stream.as_mut().ok_or_else(not_open)
    }
}

enum Timing<T> {
    Static(StaticDuration<T>),
    Live(LiveRecording<T>),
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "recording buffer is not open")
}

fn lock<T>(state: &Mutex<LiveState<T>>) -> MutexGuard<'_, LiveState<T>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Apparent duration of a live recording; updates the liveness flag
fn live_duration<T: InputStream>(start_time: i64, state: &Mutex<LiveState<T>>, now: i64) -> i64 {
    let mut state = lock(state);
    let elapsed = now.saturating_sub(start_time).saturating_sub(LIVE_SETTLE_SECS);
    if elapsed <= 0 {
        state.is_live = false;
        return 0;
    }

    let (length, position) = state
        .stream
        .as_ref()
        .map(|s| (s.length(), s.position()))
        .unwrap_or((0, 0));
    let bytes_per_sec = length / elapsed as u64;
    let remaining = length.saturating_sub(position);
    state.is_live = remaining.saturating_mul(bytes_per_sec) >= CAUGHT_UP_THRESHOLD;
    elapsed
}

/// Handle for polling the duration of a live recording from another thread
pub struct DurationProbe<T> {
    start_time: i64,
    state: Arc<Mutex<LiveState<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T> Clone for DurationProbe<T> {
    fn clone(&self) -> Self {
        Self {
            start_time: self.start_time,
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T: InputStream> DurationProbe<T> {
    pub fn duration(&self) -> i64 {
        live_duration(self.start_time, &self.state, self.clock.now())
    }

    pub fn is_live(&self) -> bool {
        lock(&self.state).is_live
    }
}

/// Playback buffer over a recording
pub struct RecordingBuffer<S: StreamSource> {
    source: S,
    clock: Arc<dyn Clock>,
    server_time_offset: i64,
    recording_url: String,
    start_time: i64,
    timing: Option<Timing<S::Stream>>,
}

impl<S: StreamSource> RecordingBuffer<S> {
    pub fn new(source: S, server_time_offset: i64) -> Self {
        Self {
            source,
            clock: Arc::new(SystemClock),
            server_time_offset,
            recording_url: String::new(),
            start_time: 0,
            timing: None,
        }
    }

    /// Buffer using the server clock offset of `settings`
    pub fn from_settings(source: S, settings: &Settings) -> Self {
        Self::new(source, settings.server_time_offset)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open `url` (or the recording's own file, when reachable) for playback
    pub fn open(&mut self, url: &str, recording: &RecordingInfo) -> io::Result<()> {
        self.close();
        log::debug!(
            "RecordingBuffer::open in progress {} {}",
            recording.duration,
            recording.recording_time
        );

        let now = self.clock.now();
        let live = recording.recording_time.saturating_add(recording.duration) > now;

        self.recording_url = resolve_recording_url(&self.source, url, &recording.directory);
        let stream = self.source.open(&self.recording_url, 0)?;

        self.timing = Some(if live {
            self.start_time = recording.recording_time.saturating_add(self.server_time_offset);
            Timing::Live(LiveRecording {
                start_time: self.start_time,
                state: Arc::new(Mutex::new(LiveState {
                    stream: Some(stream),
                    is_live: true,
                })),
            })
        } else {
            self.start_time = recording.recording_time;
            Timing::Static(StaticDuration {
                duration: recording.duration,
                stream: Some(stream),
            })
        });
        Ok(())
    }

    pub fn close(&mut self) {
        self.timing = None;
    }

    pub fn is_open(&self) -> bool {
        self.timing.is_some()
    }

    /// URL the stream was opened from
    pub fn recording_url(&self) -> &str {
        &self.recording_url
    }

    /// Seconds of playable content
    pub fn duration(&self) -> i64 {
        match self.timing {
            None => 0,
            Some(Timing::Static(ref s)) => s.duration,
            Some(Timing::Live(ref live)) => {
                live_duration(live.start_time, &live.state, self.clock.now())
            }
        }
    }

    /// Whether the recording is believed to still be growing
    pub fn is_live(&self) -> bool {
        match self.timing {
            Some(Timing::Live(ref live)) => lock(&live.state).is_live,
            _ => false,
        }
    }

    /// Probe sharing this buffer's live state; `None` for finished recordings
    pub fn duration_probe(&self) -> Option<DurationProbe<S::Stream>> {
        match self.timing {
            Some(Timing::Live(ref live)) => Some(DurationProbe {
                start_time: live.start_time,
                state: Arc::clone(&live.state),
                clock: Arc::clone(&self.clock),
            }),
            _ => None,
        }
    }

    /// Read into `buf`. For a live recording an empty read reopens the
    /// stream at the same position and reads once more.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(Timing::Static(ref mut s)) = self.timing {
            return s.stream_mut()?.read(buf);
        }
        let live = match self.timing {
            Some(Timing::Live(ref live)) => live,
            _ => return Err(not_open()),
        };

        let mut state = lock(&live.state);
        let read = state.stream_mut()?.read(buf)?;
        if read > 0 || !state.is_live {
            return Ok(read);
        }

        let (length, position) = {
            let stream = state.stream_mut()?;
            (stream.length(), stream.position())
        };
        log::debug!("read: empty while live, length {} position {}", length, position);

        // The old handle stays in place unless the new one is usable
        let mut stream = self.source.open(&self.recording_url, 0)?;
        stream.seek(SeekFrom::Start(position))?;
        let stream = state.stream.insert(stream);
        let read = stream.read(buf)?;
        log::debug!("read: reopened, length {} position {}", stream.length(), stream.position());
        Ok(read)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.timing {
            None => Err(not_open()),
            Some(Timing::Static(ref mut s)) => s.stream_mut()?.seek(pos),
            Some(Timing::Live(ref live)) => lock(&live.state).stream_mut()?.seek(pos),
        }
    }

    pub fn position(&self) -> u64 {
        match self.timing {
            None => 0,
            Some(Timing::Static(ref s)) => s.stream.as_ref().map(|s| s.position()).unwrap_or(0),
            Some(Timing::Live(ref live)) => lock(&live.state)
                .stream
                .as_ref()
                .map(|s| s.position())
                .unwrap_or(0),
        }
    }

    pub fn length(&self) -> u64 {
        match self.timing {
            None => 0,
            Some(Timing::Static(ref s)) => s.stream.as_ref().map(|s| s.length()).unwrap_or(0),
            Some(Timing::Live(ref live)) => lock(&live.state)
                .stream
                .as_ref()
                .map(|s| s.length())
                .unwrap_or(0),
        }
    }

    pub fn can_pause_stream(&self) -> bool {
        true
    }

    pub fn can_seek_stream(&self) -> bool {
        true
    }

    pub fn stream_times(&self) -> StreamTimes {
        StreamTimes {
            start_time: self.start_time,
            pts_start: 0,
            pts_begin: 0,
            pts_end: self.duration().saturating_mul(DVD_TIME_BASE),
        }
    }
}

impl<S: StreamSource> Read for RecordingBuffer<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RecordingBuffer::read(self, buf)
    }
}

#[cfg(test)]
#[path = "recording_tests.rs"]
mod tests;
