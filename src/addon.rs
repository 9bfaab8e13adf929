//! Add-on instance
//!
//! Owns the settings together with the store they came from and the
//! notification channel. Collaborators receive `&Settings` from here.

use std::sync::Arc;

use crate::api::{BackendRequest, HttpBackend};
use crate::buffers::{RecordingBuffer, StreamSource};
use crate::clock::{Clock, SystemClock};
use crate::config::{AddonStatus, Settings};
use crate::notify::Notifier;
use crate::store::{SettingValue, SettingsStore};

pub struct Addon<S: SettingsStore> {
    settings: Settings,
    store: S,
    notifier: Box<dyn Notifier>,
    clock: Arc<dyn Clock>,
    /// Set after the first successful connection
    client_attached: bool,
}

impl<S: SettingsStore> Addon<S> {
    /// Create the add-on and read user settings from `store`
    pub fn new(store: S, notifier: Box<dyn Notifier>) -> Self {
        let mut settings = Settings::default();
        settings.read_from_store(&store);
        Self {
            settings,
            store,
            notifier,
            clock: Arc::new(SystemClock),
            client_attached: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_connected(&self) -> bool {
        self.client_attached
    }

    /// HTTP client for the configured backend
    pub fn http_backend(&self) -> HttpBackend {
        HttpBackend::new(&self.settings.hostname, self.settings.port)
    }

    /// Refresh backend-derived settings and resolve version specific ones.
    /// Called on every (re)connection.
    pub fn connect<B: BackendRequest + ?Sized>(&mut self, backend: &B) -> AddonStatus {
        let status = self.settings.read_backend_settings(
            backend,
            &mut self.store,
            self.notifier.as_ref(),
            self.clock.as_ref(),
        );
        if status == AddonStatus::PermanentFailure {
            self.client_attached = false;
            return status;
        }
        self.settings
            .set_version_specific_settings(&self.store, self.notifier.as_ref());
        self.client_attached = true;
        AddonStatus::Ok
    }

    /// Re-read user settings, keeping backend-derived values
    pub fn reload(&mut self) {
        self.settings.read_from_store(&self.store);
        if self.client_attached {
            self.settings
                .set_version_specific_settings(&self.store, self.notifier.as_ref());
        }
    }

    /// Setting change notification from the host. Ignored until the first
    /// connection so initial discovery never asks for a restart.
    pub fn set_setting(&mut self, name: &str, value: &SettingValue) -> AddonStatus {
        if !self.client_attached {
            return AddonStatus::Ok;
        }
        self.settings.set_value(name, value)
    }

    /// Buffer for playing recordings from this backend
    pub fn recording_buffer<Src: StreamSource>(&self, source: Src) -> RecordingBuffer<Src> {
        RecordingBuffer::from_settings(source, &self.settings).with_clock(Arc::clone(&self.clock))
    }
}
