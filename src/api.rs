//! NextPVR backend HTTP+XML client

use std::collections::HashMap;
use std::time::Duration;

use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::BackendError;

/// Endpoint listing server-side settings
pub const SETTINGS_LIST_PATH: &str = "/service?method=setting.list";

/// A request against the backend returning the response body
pub trait BackendRequest {
    fn do_request(&self, path: &str) -> Result<String, BackendError>;
}

/// Blocking HTTP client for the backend
pub struct HttpBackend {
    host: String,
    port: u16,
    user_agent: String,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(host: &str, port: u16) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .timeout_connect(Some(Duration::from_secs(10)))
            .build()
            .new_agent();
        Self {
            host: host.to_string(),
            port,
            user_agent: format!("nextpvr-client/{}", env!("CARGO_PKG_VERSION")),
            agent,
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn base_url(&self) -> String {
        base_url(&self.host, self.port)
    }
}

/// `http://host:port`, bracketing IPv6 literals
pub fn base_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{}]:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

impl BackendRequest for HttpBackend {
    fn do_request(&self, path: &str) -> Result<String, BackendError> {
        let url = format!("{}{}", self.base_url(), path);
        log::debug!("GET {}", url);

        let mut response = self
            .agent
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .call()?;

        let status = response.status();
        if status != 200 {
            return Err(BackendError::Status(status.as_u16()));
        }

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| BackendError::Body(e.to_string()))
    }
}

/// Values reported by `setting.list`. Absent elements stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendSettings {
    pub version: Option<i32>,
    pub pre_padding: Option<i32>,
    pub post_padding: Option<i32>,
    pub show_new: Option<bool>,
    pub recording_directories: Option<Vec<String>>,
    pub time_epoch: Option<i64>,
    pub slip_seconds: Option<i32>,
    pub server_mac: Option<String>,
}

impl BackendSettings {
    /// Parse a `setting.list` response; values are the text of the root
    /// element's direct children.
    pub fn parse(xml: &str) -> Result<Self, BackendError> {
        let fields = root_children(xml)?;
        let int = |name: &str| fields.get(name).and_then(|v| v.trim().parse::<i32>().ok());

        Ok(Self {
            version: int("NextPVRVersion"),
            pre_padding: int("PrePadding"),
            post_padding: int("PostPadding"),
            show_new: fields
                .get("ShowNewInGuide")
                .and_then(|v| crate::store::parse_bool(v)),
            recording_directories: fields.get("RecordingDirectories").map(|v| {
                if v.is_empty() {
                    Vec::new()
                } else {
                    v.split(',').map(str::to_string).collect()
                }
            }),
            time_epoch: fields
                .get("TimeEpoch")
                .and_then(|v| v.trim().parse::<i64>().ok()),
            slip_seconds: int("SlipSeconds"),
            server_mac: fields.get("ServerMAC").map(|v| v.trim().to_string()),
        })
    }
}

/// First text value of each direct child of the root element
fn root_children(xml: &str) -> Result<HashMap<String, String>, BackendError> {
    let mut reader = Reader::from_str(xml);

    let mut fields = HashMap::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| BackendError::Parse(format!("XML error at byte {}: {}", position, e)))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    saw_root = true;
                } else if depth == 2 {
                    current = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    text.clear();
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    saw_root = true;
                } else if depth == 1 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    fields.entry(name).or_insert_with(String::new);
                }
            }
            Event::Text(e) if depth == 2 => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::GeneralRef(e) if depth == 2 => {
                text.push('&');
                text.push_str(&String::from_utf8_lossy(&e));
                text.push(';');
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some(name) = current.take() {
                        let value = unescape(text.trim())
                            .map(|v| v.into_owned())
                            .unwrap_or_else(|_| text.trim().to_string());
                        fields.entry(name).or_insert(value);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(BackendError::Parse("empty document".to_string()));
    }
    Ok(fields)
}

/// Insert `:` every two characters of a 12 character MAC,
/// e.g. `A1B2C3D4E5F6` -> `A1:B2:C3:D4:E5:F6`
pub fn format_server_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.len() != 12 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let pairs: Vec<&str> = (0..12).step_by(2).map(|i| &raw[i..i + 2]).collect();
    Some(pairs.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<rsp stat="ok">
  <NextPVRVersion>50203</NextPVRVersion>
  <ReadableVersion>5.2.3</ReadableVersion>
  <PrePadding>3</PrePadding>
  <PostPadding>7</PostPadding>
  <ShowNewInGuide>true</ShowNewInGuide>
  <RecordingDirectories>[Movies],[TV Shows]</RecordingDirectories>
  <TimeEpoch>1700000000</TimeEpoch>
  <SlipSeconds>1800</SlipSeconds>
  <ServerMAC>A1B2C3D4E5F6</ServerMAC>
</rsp>"#;

    #[test]
    fn test_parse_setting_list() {
        let settings = BackendSettings::parse(RESPONSE).unwrap();
        assert_eq!(settings.version, Some(50203));
        assert_eq!(settings.pre_padding, Some(3));
        assert_eq!(settings.post_padding, Some(7));
        assert_eq!(settings.show_new, Some(true));
        assert_eq!(
            settings.recording_directories,
            Some(vec!["[Movies]".to_string(), "[TV Shows]".to_string()])
        );
        assert_eq!(settings.time_epoch, Some(1_700_000_000));
        assert_eq!(settings.slip_seconds, Some(1800));
        assert_eq!(settings.server_mac.as_deref(), Some("A1B2C3D4E5F6"));
    }

    #[test]
    fn test_parse_partial_response() {
        let settings =
            BackendSettings::parse("<rsp stat=\"ok\"><NextPVRVersion>40204</NextPVRVersion></rsp>")
                .unwrap();
        assert_eq!(settings.version, Some(40204));
        assert_eq!(settings.pre_padding, None);
        assert_eq!(settings.recording_directories, None);
        assert_eq!(settings.server_mac, None);
    }

    #[test]
    fn test_nested_elements_are_not_root_children() {
        let settings = BackendSettings::parse(
            "<rsp><group><PrePadding>9</PrePadding></group><PrePadding>4</PrePadding></rsp>",
        )
        .unwrap();
        assert_eq!(settings.pre_padding, Some(4));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(BackendSettings::parse("").is_err());
        assert!(BackendSettings::parse("<rsp><a></b></rsp>").is_err());
    }

    #[test]
    fn test_format_server_mac() {
        assert_eq!(
            format_server_mac("A1B2C3D4E5F6").as_deref(),
            Some("A1:B2:C3:D4:E5:F6")
        );
        assert_eq!(format_server_mac("a1b2c3d4e5f6").as_deref(), Some("a1:b2:c3:d4:e5:f6"));
        assert_eq!(format_server_mac("A1B2C3"), None);
        assert_eq!(format_server_mac("A1:B2:C3:D4"), None);
        assert_eq!(format_server_mac("ZZB2C3D4E5F6"), None);
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("192.168.1.2", 8866), "http://192.168.1.2:8866");
        assert_eq!(base_url("::1", 8866), "http://[::1]:8866");
        assert_eq!(base_url("[::1]", 8866), "http://[::1]:8866");
    }
}
