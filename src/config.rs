//! Add-on settings management
//!
//! [`Settings`] holds every user and backend-derived setting. User values
//! come from a [`SettingsStore`]; backend values from the backend's
//! `setting.list` call, refreshed on each connection.

use serde::{Deserialize, Serialize};

use crate::api::{format_server_mac, BackendRequest, BackendSettings, SETTINGS_LIST_PATH};
use crate::clock::Clock;
use crate::notify::{notify_version_required, Notifier};
use crate::store::{SettingValue, SettingsStore};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8866;
pub const DEFAULT_PIN: &str = "0000";
pub const DEFAULT_GUIDE_ARTWORK: bool = false;
pub const DEFAULT_LIVE_STREAM: StreamingMethod = StreamingMethod::RealTime;

/// Oldest backend this client talks to
pub const MIN_BACKEND_VERSION: i32 = 40204;
pub const MIN_BACKEND_VERSION_STRING: &str = "4.2.4";

/// First v5 backend
pub const BACKEND_V5: i32 = 50000;
/// First v5 backend with working client-side streaming options
pub const BACKEND_V5_0_2: i32 = 50002;

/// Status handed back to the host after a settings operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddonStatus {
    Ok,
    /// Settings must be re-read by the host
    NeedSettings,
    /// The add-on must be restarted
    NeedRestart,
    /// Connection must not be retried
    PermanentFailure,
}

/// Live TV streaming method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StreamingMethod {
    /// Legacy alias of ClientTimeshift
    Timeshift,
    /// Legacy alias of ClientTimeshift
    RollingFile,
    #[default]
    RealTime,
    /// Removed from v5 backends
    Transcoded,
    ClientTimeshift,
    /// "Use the v4 setting"
    Default,
}

impl StreamingMethod {
    /// Convert to index for storage
    pub fn to_index(&self) -> i32 {
        match self {
            StreamingMethod::Timeshift => 0,
            StreamingMethod::RollingFile => 1,
            StreamingMethod::RealTime => 2,
            StreamingMethod::Transcoded => 3,
            StreamingMethod::ClientTimeshift => 4,
            StreamingMethod::Default => 99,
        }
    }

    /// Create from storage index
    pub fn from_index(i: i32) -> Option<Self> {
        match i {
            0 => Some(StreamingMethod::Timeshift),
            1 => Some(StreamingMethod::RollingFile),
            2 => Some(StreamingMethod::RealTime),
            3 => Some(StreamingMethod::Transcoded),
            4 => Some(StreamingMethod::ClientTimeshift),
            99 => Some(StreamingMethod::Default),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamingMethod::Timeshift => "Timeshift",
            StreamingMethod::RollingFile => "Rolling File",
            StreamingMethod::RealTime => "Real Time",
            StreamingMethod::Transcoded => "Transcoded",
            StreamingMethod::ClientTimeshift => "Client Timeshift",
            StreamingMethod::Default => "Default",
        }
    }
}

/// Backend version ranges with distinct streaming-method rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTier {
    /// below 5.0.0: single legacy setting, no transcoding
    Legacy,
    /// 5.0.0 and 5.0.1: only real time streaming works
    Broken,
    /// 5.0.2 and newer: per-version setting with legacy fallback
    Current,
}

impl VersionTier {
    pub fn for_version(version: i32) -> Self {
        if version < BACKEND_V5 {
            VersionTier::Legacy
        } else if version < BACKEND_V5_0_2 {
            VersionTier::Broken
        } else {
            VersionTier::Current
        }
    }
}

/// Outcome of the streaming method policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodResolution {
    pub method: StreamingMethod,
    /// Set when the user must be told to upgrade the backend to this version
    pub upgrade_to: Option<&'static str>,
}

/// Resolve the effective streaming method from the legacy (`livestreamingmethod`)
/// and current (`livestreamingmethod5`) setting values.
pub fn resolve_streaming_method(
    backend_version: i32,
    legacy: StreamingMethod,
    current: Option<StreamingMethod>,
) -> MethodResolution {
    match VersionTier::for_version(backend_version) {
        VersionTier::Legacy => match legacy {
            StreamingMethod::Transcoded => MethodResolution {
                method: StreamingMethod::RealTime,
                upgrade_to: Some("5"),
            },
            method => MethodResolution {
                method,
                upgrade_to: None,
            },
        },
        VersionTier::Broken => MethodResolution {
            method: StreamingMethod::RealTime,
            upgrade_to: Some("5.0.3"),
        },
        VersionTier::Current => {
            let method = match current.unwrap_or(legacy) {
                StreamingMethod::Default => legacy,
                method => method,
            };
            let method = match method {
                StreamingMethod::RollingFile | StreamingMethod::Timeshift => {
                    StreamingMethod::ClientTimeshift
                }
                method => method,
            };
            MethodResolution {
                method,
                upgrade_to: None,
            }
        }
    }
}

/// Wake-on-LAN to these hosts would wake ourselves
pub fn is_loopback_host(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "::1")
}

/// All add-on settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Connection
    pub hostname: String,
    pub port: u16,
    pub pin: String,
    pub host_mac: String,
    pub enable_wol: bool,
    pub wol_timeout: i32,

    // Behaviour
    pub download_guide_artwork: bool,
    pub guide_art_portrait: bool,
    pub remote_access: bool,
    pub flatten_recording: bool,
    pub kodi_look: bool,
    pub show_radio: bool,
    pub show_recording_size: bool,
    pub send_sid_with_metadata: bool,

    // Streaming
    pub prebuffer: i32,
    pub prebuffer5: i32,
    pub live_chunk_size: i32,
    pub chunk_recording: i32,
    pub resolution: String,
    pub live_streaming_method: StreamingMethod,

    // Backend derived
    pub backend_version: i32,
    pub default_pre_padding: i32,
    pub default_post_padding: i32,
    pub show_new: bool,
    pub recording_directories: Vec<String>,
    pub server_time_offset: i64,
    pub timeshift_buffer_seconds: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            pin: DEFAULT_PIN.to_string(),
            host_mac: String::new(),
            enable_wol: false,
            wol_timeout: 20,
            download_guide_artwork: DEFAULT_GUIDE_ARTWORK,
            guide_art_portrait: false,
            remote_access: false,
            flatten_recording: false,
            kodi_look: false,
            show_radio: true,
            show_recording_size: false,
            send_sid_with_metadata: false,
            prebuffer: 8,
            prebuffer5: 0,
            live_chunk_size: 64,
            chunk_recording: 32,
            resolution: "720".to_string(),
            live_streaming_method: DEFAULT_LIVE_STREAM,
            backend_version: 0,
            default_pre_padding: 1,
            default_post_padding: 2,
            show_new: false,
            recording_directories: Vec::new(),
            server_time_offset: 0,
            timeshift_buffer_seconds: 0,
        }
    }
}

impl Settings {
    /// Populate user settings from the store, falling back to defaults for
    /// absent or unreadable keys.
    pub fn read_from_store<S: SettingsStore + ?Sized>(&mut self, store: &S) {
        // Connection
        self.hostname = match store.get_string("host") {
            Some(host) => percent_encoding::percent_decode_str(&host)
                .decode_utf8_lossy()
                .into_owned(),
            None => DEFAULT_HOST.to_string(),
        };

        self.port = match store.get_int("port").and_then(|p| u16::try_from(p).ok()) {
            Some(port) => port,
            None => {
                log::error!(
                    "Couldn't get 'port' setting, falling back to '{}' as default",
                    DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        };

        self.pin = store.get_string("pin").unwrap_or_else(|| DEFAULT_PIN.to_string());
        self.host_mac = store.get_string("host_mac").unwrap_or_default();

        self.enable_wol = if self.host_mac.is_empty() || is_loopback_host(&self.hostname) {
            false
        } else {
            store.get_bool("wolenable").unwrap_or(false)
        };
        self.wol_timeout = store.get_int("woltimeout").unwrap_or(20);

        // Behaviour
        self.download_guide_artwork = store
            .get_bool("guideartwork")
            .unwrap_or(DEFAULT_GUIDE_ARTWORK);
        self.remote_access = store.get_bool("remoteaccess").unwrap_or(false);
        self.flatten_recording = store.get_bool("flattenrecording").unwrap_or(false);
        self.kodi_look = store.get_bool("kodilook").unwrap_or(false);
        self.show_radio = store.get_bool("showradio").unwrap_or(true);

        // Streaming
        self.prebuffer = store.get_int("prebuffer").unwrap_or(8);
        self.prebuffer5 = store.get_int("prebuffer5").unwrap_or(0);
        self.live_chunk_size = store.get_int("chunklivetv").unwrap_or(64);
        self.chunk_recording = store.get_int("chunkrecording").unwrap_or(32);
        self.resolution = store
            .get_string("resolution")
            .unwrap_or_else(|| "720".to_string());

        log::debug!(
            "settings: host='{}', port={}, mac={:.4}...",
            self.hostname,
            self.port,
            self.host_mac
        );
    }

    /// Query `setting.list` and apply the backend-derived settings.
    ///
    /// Returns [`AddonStatus::PermanentFailure`] only for a backend older
    /// than [`MIN_BACKEND_VERSION`]. An unreachable backend or unreadable
    /// response leaves every backend-derived value as it was.
    pub fn read_backend_settings<B, S>(
        &mut self,
        backend: &B,
        store: &mut S,
        notifier: &dyn Notifier,
        clock: &dyn Clock,
    ) -> AddonStatus
    where
        B: BackendRequest + ?Sized,
        S: SettingsStore + ?Sized,
    {
        let body = match backend.do_request(SETTINGS_LIST_PATH) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Could not read backend settings: {}", e);
                return AddonStatus::Ok;
            }
        };
        let reported = match BackendSettings::parse(&body) {
            Ok(reported) => reported,
            Err(e) => {
                log::warn!("Could not parse backend settings: {}", e);
                return AddonStatus::Ok;
            }
        };
        self.apply_backend_settings(&reported, store, notifier, clock)
    }

    /// Apply an already parsed `setting.list` response
    pub fn apply_backend_settings<S: SettingsStore + ?Sized>(
        &mut self,
        reported: &BackendSettings,
        store: &mut S,
        notifier: &dyn Notifier,
        clock: &dyn Clock,
    ) -> AddonStatus {
        if let Some(version) = reported.version {
            self.backend_version = version;
            log::info!("NextPVR version: {}", version);

            if version < MIN_BACKEND_VERSION {
                log::error!(
                    "NextPVR version '{}' is too old. Please upgrade to '{}' or higher!",
                    version,
                    MIN_BACKEND_VERSION_STRING
                );
                notify_version_required(notifier, MIN_BACKEND_VERSION_STRING);
                return AddonStatus::PermanentFailure;
            }
        }

        self.default_pre_padding = reported.pre_padding.unwrap_or(1);
        self.default_post_padding = reported.post_padding.unwrap_or(2);
        self.show_new = reported.show_new.unwrap_or(false);

        if let Some(ref directories) = reported.recording_directories {
            self.recording_directories = directories.clone();
        }

        if let Some(epoch) = reported.time_epoch {
            self.server_time_offset = clock.now() - epoch;
            log::info!("Server time offset in seconds: {}", self.server_time_offset);
        }

        if let Some(slip) = reported.slip_seconds {
            self.timeshift_buffer_seconds = slip;
            log::info!("time shift buffer in seconds == {}", slip);
        }

        if let Some(ref raw) = reported.server_mac {
            match format_server_mac(raw) {
                Some(mac) => {
                    log::debug!("Server MAC address {:.4}...", mac);
                    if self.host_mac != mac {
                        store.set_string("host_mac", &mac);
                        self.host_mac = mac;
                    }
                }
                None => log::warn!("Ignoring malformed server MAC '{}'", raw),
            }
        }

        AddonStatus::Ok
    }

    /// Resolve settings whose meaning depends on the backend version.
    /// Must run after [`Settings::read_backend_settings`].
    pub fn set_version_specific_settings<S: SettingsStore + ?Sized>(
        &mut self,
        store: &S,
        notifier: &dyn Notifier,
    ) {
        self.live_streaming_method = DEFAULT_LIVE_STREAM;
        if let Some(legacy) = read_method(store, "livestreamingmethod") {
            let current = match VersionTier::for_version(self.backend_version) {
                VersionTier::Current => read_method(store, "livestreamingmethod5"),
                _ => None,
            };
            let resolution = resolve_streaming_method(self.backend_version, legacy, current);
            self.live_streaming_method = resolution.method;
            if let Some(required) = resolution.upgrade_to {
                notify_version_required(notifier, required);
            }
        }

        if self.backend_version >= BACKEND_V5 {
            self.send_sid_with_metadata = false;
            if self.pin != DEFAULT_PIN && self.remote_access {
                self.download_guide_artwork = false;
                self.send_sid_with_metadata = true;
            }
            self.guide_art_portrait = store.get_bool("guideartworkportrait").unwrap_or(false);
            self.show_recording_size = store.get_bool("recordingsize").unwrap_or(false);
        } else {
            self.send_sid_with_metadata = true;
            self.guide_art_portrait = false;
            self.show_recording_size = false;
        }
    }

    /// Pre-buffer size for the connected backend generation
    pub fn effective_prebuffer(&self) -> i32 {
        if self.backend_version >= BACKEND_V5 {
            self.prebuffer5
        } else {
            self.prebuffer
        }
    }

    /// Apply one changed setting. Unknown keys and wrongly typed values are
    /// ignored.
    pub fn set_value(&mut self, name: &str, value: &SettingValue) -> AddonStatus {
        use AddonStatus::{NeedRestart, NeedSettings};

        match name {
            "host" => update(name, &mut self.hostname, value.as_str().map(str::to_string), NeedRestart),
            "port" => update(
                name,
                &mut self.port,
                value.as_int().and_then(|p| u16::try_from(p).ok()),
                NeedRestart,
            ),
            "pin" => update(name, &mut self.pin, value.as_str().map(str::to_string), NeedRestart),
            "remoteaccess" => update(name, &mut self.remote_access, value.as_bool(), NeedRestart),
            "showradio" => update(name, &mut self.show_radio, value.as_bool(), NeedRestart),
            "guideartwork" => update(name, &mut self.download_guide_artwork, value.as_bool(), NeedSettings),
            "guideartworkportrait" => update(name, &mut self.guide_art_portrait, value.as_bool(), NeedSettings),
            "recordingsize" => update(name, &mut self.show_recording_size, value.as_bool(), NeedSettings),
            "flattenrecording" => update(name, &mut self.flatten_recording, value.as_bool(), NeedSettings),
            "kodilook" => update(name, &mut self.kodi_look, value.as_bool(), NeedSettings),
            "host_mac" => update(name, &mut self.host_mac, value.as_str().map(str::to_string), AddonStatus::Ok),
            "livestreamingmethod" if self.backend_version < BACKEND_V5 => update(
                name,
                &mut self.live_streaming_method,
                value.as_int().and_then(StreamingMethod::from_index),
                NeedRestart,
            ),
            "livestreamingmethod5" if self.backend_version >= BACKEND_V5 => {
                match value.as_int().and_then(StreamingMethod::from_index) {
                    Some(StreamingMethod::Default) | None => AddonStatus::Ok,
                    method => update(name, &mut self.live_streaming_method, method, NeedRestart),
                }
            }
            "prebuffer" => update(name, &mut self.prebuffer, value.as_int(), AddonStatus::Ok),
            "prebuffer5" => update(name, &mut self.prebuffer5, value.as_int(), AddonStatus::Ok),
            "chunklivetv" => update(name, &mut self.live_chunk_size, value.as_int(), AddonStatus::Ok),
            "chunkrecording" => update(name, &mut self.chunk_recording, value.as_int(), AddonStatus::Ok),
            "resolution" => update(name, &mut self.resolution, value.as_str().map(str::to_string), AddonStatus::Ok),
            _ => AddonStatus::Ok,
        }
    }
}

fn read_method<S: SettingsStore + ?Sized>(store: &S, key: &str) -> Option<StreamingMethod> {
    store.get_int(key).and_then(StreamingMethod::from_index)
}

/// Store `new` in `field`, returning `on_change` if the value differed
fn update<T: PartialEq + std::fmt::Debug>(
    name: &str,
    field: &mut T,
    new: Option<T>,
    on_change: AddonStatus,
) -> AddonStatus {
    match new {
        Some(value) if *field != value => {
            log::info!("Changed Setting '{}' from {:?} to {:?}", name, field, value);
            *field = value;
            on_change
        }
        _ => AddonStatus::Ok,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
