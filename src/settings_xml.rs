//! Persisted add-on settings document
//!
//! The host keeps add-on settings in a `settings.xml` shaped like
//!
//! ```xml
//! <settings version="2">
//!     <setting id="host">192.168.1.10</setting>
//!     <setting id="port" default="true">8866</setting>
//! </settings>
//! ```
//!
//! The layout belongs to the host. Updates load the whole document, change
//! one entry and rewrite the whole file; unknown attributes are preserved.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::Writer;

use crate::error::{SettingsError, SettingsResult};

/// Add-on id used for the profile directory
pub const ADDON_ID: &str = "pvr.nextpvr";

/// One `<setting>` element
#[derive(Debug, Clone, PartialEq)]
pub struct SettingEntry {
    /// All attributes in document order, `id` included
    pub attributes: Vec<(String, String)>,
    /// Text node, `None` when the element is empty
    pub value: Option<String>,
}

impl SettingEntry {
    pub fn new(id: &str, value: &str) -> Self {
        Self {
            attributes: vec![("id".to_string(), id.to_string())],
            value: Some(value.to_string()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.as_str())
    }
}

/// What [`SettingsDocument::set`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Updated,
    Appended,
}

/// In-memory copy of `settings.xml`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    pub root_attributes: Vec<(String, String)>,
    pub entries: Vec<SettingEntry>,
}

impl SettingsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a settings document. Elements other than `setting` directly
    /// under the root are dropped.
    pub fn parse(xml: &str) -> SettingsResult<Self> {
        let mut reader = Reader::from_str(xml);

        let mut doc = SettingsDocument::new();
        let mut found_root = false;
        let mut depth = 0usize;
        let mut current: Option<SettingEntry> = None;
        let mut text = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    depth += 1;
                    match (depth, e.name().as_ref()) {
                        (1, b"settings") => {
                            found_root = true;
                            doc.root_attributes = attributes(&e)?;
                        }
                        (2, b"setting") if found_root => {
                            current = Some(SettingEntry {
                                attributes: attributes(&e)?,
                                value: None,
                            });
                            text.clear();
                        }
                        _ => {}
                    }
                }
                Event::Empty(e) => match (depth, e.name().as_ref()) {
                    (0, b"settings") => {
                        found_root = true;
                        doc.root_attributes = attributes(&e)?;
                    }
                    (1, b"setting") if found_root => {
                        doc.entries.push(SettingEntry {
                            attributes: attributes(&e)?,
                            value: None,
                        });
                    }
                    _ => {}
                },
                Event::Text(e) => {
                    if current.is_some() && depth == 2 {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::CData(e) => {
                    if current.is_some() && depth == 2 {
                        let raw = String::from_utf8_lossy(&e).into_owned();
                        text.push_str(&escape(raw.as_str()));
                    }
                }
                Event::GeneralRef(e) => {
                    if current.is_some() && depth == 2 {
                        text.push('&');
                        text.push_str(&String::from_utf8_lossy(&e));
                        text.push(';');
                    }
                }
                Event::End(_) => {
                    if depth == 2 {
                        if let Some(mut entry) = current.take() {
                            if !text.is_empty() {
                                entry.value = Some(unescape(text.as_str())?.into_owned());
                            }
                            doc.entries.push(entry);
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !found_root {
            return Err(SettingsError::MissingRoot);
        }
        Ok(doc)
    }

    pub fn load(path: &Path) -> SettingsResult<Self> {
        if !path.exists() {
            return Err(SettingsError::DocumentMissing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Value of the first entry with `id`
    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id() == Some(id))
            .and_then(|e| e.value.as_deref())
    }

    /// Replace the text of entry `id`, or append a new entry.
    ///
    /// An empty `<setting id=".." default="true" />` gains a text node and
    /// loses its `default` marker.
    pub fn set(&mut self, id: &str, value: &str) -> SaveOutcome {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id() == Some(id)) {
            if entry.value.is_none() {
                entry.attributes.retain(|(k, _)| k != "default");
            }
            entry.value = Some(value.to_string());
            return SaveOutcome::Updated;
        }
        self.entries.push(SettingEntry::new(id, value));
        SaveOutcome::Appended
    }

    pub fn to_xml(&self) -> SettingsResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;

        let mut root = BytesStart::new("settings");
        for (k, v) in &self.root_attributes {
            root.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Start(root))?;

        for entry in &self.entries {
            let mut start = BytesStart::new("setting");
            for (k, v) in &entry.attributes {
                start.push_attribute((k.as_str(), v.as_str()));
            }
            match entry.value {
                Some(ref value) => {
                    writer.write_event(Event::Start(start))?;
                    writer.write_event(Event::Text(BytesText::new(value)))?;
                    writer.write_event(Event::End(BytesEnd::new("setting")))?;
                }
                None => writer.write_event(Event::Empty(start))?,
            }
        }

        writer.write_event(Event::End(BytesEnd::new("settings")))?;
        let mut xml = String::from_utf8_lossy(&writer.into_inner()).into_owned();
        xml.push('\n');
        Ok(xml)
    }

    pub fn save(&self, path: &Path) -> SettingsResult<()> {
        fs::write(path, self.to_xml()?)?;
        Ok(())
    }
}

fn attributes(e: &BytesStart) -> SettingsResult<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
        attrs.push((key, unescape(raw.as_str())?.into_owned()));
    }
    Ok(attrs)
}

/// Profile path of the add-on's `settings.xml`
pub fn default_settings_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("addon_data");
    path.push(ADDON_ID);
    path.push("settings.xml");
    path
}

/// Persist a single key/value pair into the document at `path`,
/// rewriting the whole file.
pub fn save_setting(path: &Path, name: &str, value: &str) -> SettingsResult<SaveOutcome> {
    let mut doc = SettingsDocument::load(path)?;
    let outcome = doc.set(name, value);
    doc.save(path)?;
    log::debug!("Saved setting '{}' to {} ({:?})", name, path.display(), outcome);
    Ok(outcome)
}
