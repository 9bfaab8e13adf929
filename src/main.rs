//! NextPVR client - command line front end
//!
//! Loads the add-on settings, connects to the backend and prints the
//! resolved settings, or copies a recording through the recording buffer.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use nextpvr_client::buffers::{AutoSource, RecordingInfo};
use nextpvr_client::settings_xml::default_settings_path;
use nextpvr_client::{Addon, AddonStatus, LogNotifier, Settings, SettingsStore, XmlSettingsStore};

const USAGE: &str = "\
Usage: nextpvr-client [OPTIONS] [show]
       nextpvr-client [OPTIONS] copy <URL> <OUTPUT> [--start EPOCH] [--duration SECS] [--dir PATH]

Options:
  --settings PATH   settings.xml to read (default: add-on profile)
  --host HOST       override the backend host
  --port PORT       override the backend port
  --json            print settings as JSON
  -h, --help        show this help";

/// Settings file with command line overrides on top
struct CliStore {
    file: XmlSettingsStore,
    overrides: HashMap<String, String>,
}

impl SettingsStore for CliStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.overrides
            .get(key)
            .cloned()
            .or_else(|| self.file.get_string(key))
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.file.set_string(key, value);
    }
}

enum Command {
    Show,
    Copy {
        url: String,
        output: PathBuf,
        recording: RecordingInfo,
    },
}

struct Options {
    settings_path: PathBuf,
    overrides: HashMap<String, String>,
    json: bool,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut settings_path = None;
    let mut overrides = HashMap::new();
    let mut json = false;
    let mut positional = Vec::new();
    let mut recording = RecordingInfo::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match arg.as_str() {
            "--settings" => settings_path = Some(PathBuf::from(value(arg)?)),
            "--host" => {
                overrides.insert("host".to_string(), value(arg)?);
            }
            "--port" => {
                overrides.insert("port".to_string(), value(arg)?);
            }
            "--json" => json = true,
            "--start" => recording.recording_time = parse_number(arg, &value(arg)?)?,
            "--duration" => recording.duration = parse_number(arg, &value(arg)?)?,
            "--dir" => recording.directory = value(arg)?,
            "-h" | "--help" => return Err(String::new()),
            flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
            _ => positional.push(arg.clone()),
        }
    }

    let command = match positional.first().map(String::as_str) {
        None | Some("show") => Command::Show,
        Some("copy") => match (positional.get(1), positional.get(2)) {
            (Some(url), Some(output)) => Command::Copy {
                url: url.clone(),
                output: PathBuf::from(output),
                recording,
            },
            _ => return Err("copy requires <URL> <OUTPUT>".to_string()),
        },
        Some(other) => return Err(format!("unknown command {}", other)),
    };

    Ok(Options {
        settings_path: settings_path.unwrap_or_else(default_settings_path),
        overrides,
        json,
        command,
    })
}

fn parse_number(flag: &str, value: &str) -> Result<i64, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", flag, value))
}

fn print_settings(settings: &Settings, json: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let text = serde_json::to_string_pretty(settings).map_err(io::Error::other)?;
        return writeln!(out, "{}", text);
    }

    writeln!(out, "Backend:            {}:{}", settings.hostname, settings.port)?;
    writeln!(out, "Backend version:    {}", settings.backend_version)?;
    writeln!(out, "Server MAC:         {}", settings.host_mac)?;
    writeln!(out, "Wake on LAN:        {} ({}s)", settings.enable_wol, settings.wol_timeout)?;
    writeln!(out, "Clock offset:       {}s", settings.server_time_offset)?;
    writeln!(out, "Live streaming:     {}", settings.live_streaming_method.label())?;
    writeln!(out, "Prebuffer:          {}", settings.effective_prebuffer())?;
    writeln!(out, "Timeshift buffer:   {}s", settings.timeshift_buffer_seconds)?;
    writeln!(
        out,
        "Padding:            {} / {} min",
        settings.default_pre_padding, settings.default_post_padding
    )?;
    writeln!(out, "Send SID:           {}", settings.send_sid_with_metadata)?;
    writeln!(out, "Guide artwork:      {}", settings.download_guide_artwork)?;
    for dir in &settings.recording_directories {
        writeln!(out, "Recording dir:      {}", dir)?;
    }
    Ok(())
}

fn copy_recording(
    addon: &Addon<CliStore>,
    url: &str,
    output: &Path,
    recording: &RecordingInfo,
) -> io::Result<u64> {
    let mut buffer = addon.recording_buffer(AutoSource::new());
    buffer.open(url, recording)?;
    log::info!(
        "Copying {} (live: {}, duration: {}s)",
        buffer.recording_url(),
        buffer.is_live(),
        buffer.duration()
    );

    let mut out = BufWriter::new(File::create(output)?);
    let copied = io::copy(&mut buffer, &mut out)?;
    out.flush()?;
    buffer.close();
    Ok(copied)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            if !e.is_empty() {
                eprintln!("Error: {}", e);
            }
            eprintln!("{}", USAGE);
            return if e.is_empty() { ExitCode::SUCCESS } else { ExitCode::from(64) };
        }
    };

    let store = CliStore {
        file: XmlSettingsStore::load_or_empty(&options.settings_path),
        overrides: options.overrides,
    };
    let mut addon = Addon::new(store, Box::new(LogNotifier));

    let backend = addon.http_backend();
    log::info!("Connecting to {}", backend.base_url());
    if addon.connect(&backend) == AddonStatus::PermanentFailure {
        return ExitCode::from(2);
    }

    let result = match options.command {
        Command::Show => print_settings(addon.settings(), options.json),
        Command::Copy {
            ref url,
            ref output,
            ref recording,
        } => copy_recording(&addon, url, output, recording).map(|bytes| {
            log::info!("Wrote {} bytes to {}", bytes, output.display());
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
