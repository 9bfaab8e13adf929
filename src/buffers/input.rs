//! Seekable input streams used by the buffers
//!
//! A [`StreamSource`] opens [`InputStream`]s by URL. Local paths and
//! `file://` URLs go through [`FileSource`], `http(s)://` URLs through
//! [`HttpSource`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

/// A readable, seekable byte stream with a known current length
pub trait InputStream: Read + Seek + Send {
    /// Length as currently known to the stream
    fn length(&self) -> u64;
    /// Current read offset
    fn position(&self) -> u64;
}

/// Opens input streams for a URL
pub trait StreamSource: Send + Sync {
    type Stream: InputStream;

    /// Open `url` positioned at `offset`
    fn open(&self, url: &str, offset: u64) -> io::Result<Self::Stream>;

    /// Whether `url` can be opened
    fn exists(&self, url: &str) -> bool;
}

fn local_path(url: &str) -> Option<&str> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(path);
    }
    // Anything with a scheme is not local (Windows drive letters excepted)
    match url.find("://") {
        Some(_) => None,
        None if url.starts_with("smb:") => None,
        None => Some(url),
    }
}

/// Local file source
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

/// Open local file
#[derive(Debug)]
pub struct FileInput {
    file: File,
    position: u64,
}

impl StreamSource for FileSource {
    type Stream = FileInput;

    fn open(&self, url: &str, offset: u64) -> io::Result<FileInput> {
        let path = local_path(url).ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, format!("not a local path: {}", url))
        })?;
        let mut file = File::open(path)?;
        let position = file.seek(SeekFrom::Start(offset))?;
        Ok(FileInput { file, position })
    }

    fn exists(&self, url: &str) -> bool {
        local_path(url).map(|p| Path::new(p).is_file()).unwrap_or(false)
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.file.seek(pos)?;
        Ok(self.position)
    }
}

impl InputStream for FileInput {
    fn length(&self) -> u64 {
        self.file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// HTTP source using ranged GET requests
#[derive(Clone)]
pub struct HttpSource {
    agent: ureq::Agent,
    user_agent: String,
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSource {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(10)))
            .build()
            .new_agent();
        Self {
            agent,
            user_agent: format!("nextpvr-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn request(&self, url: &str, offset: u64) -> io::Result<(ureq::BodyReader<'static>, u64)> {
        let mut request = self.agent.get(url).header("User-Agent", &self.user_agent);
        if offset > 0 {
            request = request.header("Range", &format!("bytes={}-", offset));
        }
        let response = request.call().map_err(io::Error::other)?;

        let status = response.status();
        if status != 200 && status != 206 {
            return Err(io::Error::other(format!("HTTP error: {}", status)));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let length = header("Content-Range")
            .and_then(|v| v.rsplit('/').next().and_then(|total| total.parse().ok()))
            .or_else(|| {
                header("Content-Length")
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|len| if status == 206 { len + offset } else { len })
            })
            .unwrap_or(0);

        // A server ignoring the range restarts from zero
        let start = if status == 206 { offset } else { 0 };
        let mut reader = response.into_body().into_reader();
        if start < offset {
            io::copy(&mut (&mut reader).take(offset - start), &mut io::sink())?;
        }
        Ok((reader, length))
    }
}

/// Open HTTP stream
pub struct HttpInput {
    source: HttpSource,
    url: String,
    reader: ureq::BodyReader<'static>,
    position: u64,
    length: u64,
}

impl StreamSource for HttpSource {
    type Stream = HttpInput;

    fn open(&self, url: &str, offset: u64) -> io::Result<HttpInput> {
        let (reader, length) = self.request(url, offset)?;
        Ok(HttpInput {
            source: self.clone(),
            url: url.to_string(),
            reader,
            position: offset,
            length,
        })
    }

    fn exists(&self, url: &str) -> bool {
        self.agent.head(url).call().is_ok()
    }
}

impl Read for HttpInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.position += n as u64;
        self.length = self.length.max(self.position);
        Ok(n)
    }
}

impl Seek for HttpInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
            SeekFrom::End(d) => self.length.checked_add_signed(d),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;

        if target != self.position {
            let (reader, length) = self.source.request(&self.url, target)?;
            self.reader = reader;
            self.length = length.max(target);
            self.position = target;
        }
        Ok(self.position)
    }
}

impl InputStream for HttpInput {
    fn length(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Stream opened through [`AutoSource`]
pub enum AnyInput {
    File(FileInput),
    Http(Box<HttpInput>),
}

/// Source dispatching on the URL scheme
#[derive(Default)]
pub struct AutoSource {
    file: FileSource,
    http: HttpSource,
}

impl AutoSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl StreamSource for AutoSource {
    type Stream = AnyInput;

    fn open(&self, url: &str, offset: u64) -> io::Result<AnyInput> {
        if is_http(url) {
            self.http.open(url, offset).map(|i| AnyInput::Http(Box::new(i)))
        } else {
            self.file.open(url, offset).map(AnyInput::File)
        }
    }

    fn exists(&self, url: &str) -> bool {
        if is_http(url) {
            self.http.exists(url)
        } else {
            self.file.exists(url)
        }
    }
}

impl Read for AnyInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            AnyInput::File(i) => i.read(buf),
            AnyInput::Http(i) => i.read(buf),
        }
    }
}

impl Seek for AnyInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            AnyInput::File(i) => i.seek(pos),
            AnyInput::Http(i) => i.seek(pos),
        }
    }
}

impl InputStream for AnyInput {
    fn length(&self) -> u64 {
        match self {
            AnyInput::File(i) => i.length(),
            AnyInput::Http(i) => i.length(),
        }
    }

    fn position(&self) -> u64 {
        match self {
            AnyInput::File(i) => i.position(),
            AnyInput::Http(i) => i.position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("/tmp/a.ts"), Some("/tmp/a.ts"));
        assert_eq!(local_path("file:///tmp/a.ts"), Some("/tmp/a.ts"));
        assert_eq!(local_path("http://host/a.ts"), None);
        assert_eq!(local_path("smb://server/share/a.ts"), None);
    }

    #[test]
    fn test_file_source_open_read_seek() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let url = file.path().to_string_lossy().to_string();

        let source = FileSource;
        assert!(source.exists(&url));
        assert!(!source.exists("/definitely/not/here.ts"));

        let mut input = source.open(&url, 4).unwrap();
        assert_eq!(input.position(), 4);
        assert_eq!(input.length(), 10);

        let mut buf = [0u8; 3];
        assert_eq!(input.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"456");
        assert_eq!(input.position(), 7);

        assert_eq!(input.seek(SeekFrom::Start(1)).unwrap(), 1);
        assert_eq!(input.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"123");
    }

    #[test]
    fn test_file_length_follows_growth() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let input = FileSource.open(&file.path().to_string_lossy(), 0).unwrap();
        assert_eq!(input.length(), 3);
        file.write_all(b"def").unwrap();
        file.flush().unwrap();
        assert_eq!(input.length(), 6);
    }

    #[test]
    fn test_file_source_rejects_remote_urls() {
        let err = FileSource.open("http://host/a.ts", 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
