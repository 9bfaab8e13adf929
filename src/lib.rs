//! NextPVR client core
//!
//! Settings management for a NextPVR backend connection and a playback
//! buffer for recordings that may still be in progress.

pub mod addon;
pub mod api;
pub mod buffers;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod settings_xml;
pub mod store;

pub use addon::Addon;
pub use api::{BackendRequest, BackendSettings, HttpBackend};
pub use buffers::{AutoSource, RecordingBuffer, RecordingInfo, StreamSource, StreamTimes};
pub use clock::{Clock, SystemClock};
pub use config::{AddonStatus, Settings, StreamingMethod};
pub use error::{BackendError, SettingsError, SettingsResult};
pub use notify::{LogNotifier, Notifier};
pub use store::{MemoryStore, SettingValue, SettingsStore, XmlSettingsStore};
