//! Playback buffers
//!
//! Contains the input stream sources and the recording buffer.

mod input;
mod recording;

// Re-export public types
pub use input::{
    AnyInput,
    AutoSource,
    FileInput,
    FileSource,
    HttpInput,
    HttpSource,
    InputStream,
    StreamSource,
};
pub use recording::{
    directory_url,
    resolve_recording_url,
    DurationProbe,
    RecordingBuffer,
    RecordingInfo,
    StreamTimes,
    DVD_TIME_BASE,
};
