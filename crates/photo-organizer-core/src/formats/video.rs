use chrono::NaiveDateTime;
use nom_exif::{MediaParser, MediaSource, TrackInfo, TrackInfoTag};
use serde_json::Value;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::date::exif::entry_to_date;
use crate::date::{validate, CanonicalDate};
use crate::error::ExtractError;
use crate::formats::DateExtractor;

pub const FFPROBE_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Tag keys holding the recording time, in priority order.
const VIDEO_DATE_KEYS: &[&str] = &[
    "creation_time",
    "date",
    "date_recorded",
    "com.apple.quicktime.creationdate",
];

/// The AVI `IDIT` chunk lives in the header list near the start.
const MAX_AVI_SCAN: u64 = 1024 * 1024;

/// Container-level recording dates. Tries ffprobe first when it is on the
/// PATH, then the built-in track parser.
#[derive(Debug)]
pub struct VideoExtractor {
    program: String,
    timeout: Duration,
    available: OnceLock<bool>,
}

impl Default for VideoExtractor {
    fn default() -> Self {
        Self::with_program("ffprobe", FFPROBE_TIMEOUT)
    }
}

impl VideoExtractor {
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            available: OnceLock::new(),
        }
    }

    /// Probed once with `-version`, then cached.
    pub fn ffprobe_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let mut cmd = Command::new(&self.program);
            cmd.arg("-version");
            let ok = matches!(run_with_timeout(cmd, self.timeout), Ok(Some(_)));
            if !ok {
                log::info!("{} not found; using built-in video metadata parser", self.program);
            }
            ok
        })
    }

    fn probe(&self, path: &Path) -> Option<CanonicalDate> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path);
        match run_with_timeout(cmd, self.timeout) {
            Ok(Some(stdout)) => parse_ffprobe_json(&stdout),
            Ok(None) => None,
            Err(e) => {
                log::debug!("{} failed on {}: {}", self.program, path.display(), e);
                None
            }
        }
    }
}

impl DateExtractor for VideoExtractor {
    fn name(&self) -> &'static str {
        "video"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        if self.ffprobe_available() {
            if let Some(date) = self.probe(path) {
                return Ok(Some(date));
            }
        }

        let is_avi = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("avi"));
        if is_avi {
            return read_avi_idit(path);
        }

        read_track_info(path)
    }
}

/// Run a child process, killing it if it outlives `timeout`.
///
/// Returns stdout on a successful exit, `None` on a non-zero exit or timeout.
/// The timeout is hard: the call returns even if a grandchild still holds
/// the stdout pipe.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // own group, so wrapper scripts go down with their children
        cmd.process_group(0);
    }
    let mut child = cmd.spawn()?;

    // drain stdout concurrently so a chatty child cannot block on a full pipe
    let reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        })
    });

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            kill_process_group(&mut child);
            // not joined: the reader is left to finish on its own
            drop(reader);
            log::warn!("child process timed out after {:?}", timeout);
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let output = match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "stdout reader panicked"))??,
        None => Vec::new(),
    };

    Ok(status.success().then_some(output))
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .arg("-KILL")
            .arg(format!("-{}", child.id()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Pick the first valid date out of ffprobe's `-show_format -show_streams`
/// JSON: format tags first, then each stream in order.
pub fn parse_ffprobe_json(stdout: &[u8]) -> Option<CanonicalDate> {
    let v: Value = serde_json::from_slice(stdout).ok()?;

    let mut tag_sets = Vec::new();
    if let Some(tags) = v["format"]["tags"].as_object() {
        tag_sets.push(tags);
    }
    if let Some(streams) = v["streams"].as_array() {
        tag_sets.extend(streams.iter().filter_map(|s| s["tags"].as_object()));
    }

    for tags in tag_sets {
        for key in VIDEO_DATE_KEYS {
            let value = tags
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .and_then(|(_, v)| v.as_str());
            if let Some(date) = validate(value) {
                return Some(date);
            }
        }
    }
    None
}

fn read_track_info(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    let ms = MediaSource::file_path(path)?;
    if !ms.has_track() {
        return Ok(None);
    }

    let mut parser = MediaParser::new();
    let info: TrackInfo = parser.parse(ms)?;
    Ok(info.get(TrackInfoTag::CreateDate).and_then(entry_to_date))
}

fn read_avi_idit(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    let file = File::open(path)?;
    let mut data = Vec::new();
    file.take(MAX_AVI_SCAN).read_to_end(&mut data)?;

    if !(data.starts_with(b"RIFF") && data.get(8..12) == Some(b"AVI ".as_slice())) {
        return Err(ExtractError::malformed("avi", "not a RIFF AVI file"));
    }
    Ok(find_idit(&data).and_then(|text| parse_idit(&text)))
}

fn find_idit(data: &[u8]) -> Option<String> {
    let i = data.windows(4).position(|w| w == b"IDIT")?;
    let size = u32::from_le_bytes(data.get(i + 4..i + 8)?.try_into().ok()?) as usize;
    let end = (i + 8).checked_add(size)?.min(data.len());
    let raw = data.get(i + 8..end)?;
    Some(String::from_utf8_lossy(raw).trim_end_matches('\0').to_string())
}

/// `IDIT` is usually ctime-style (`Thu Aug 11 10:21:52 2005`), sometimes EXIF style.
fn parse_idit(text: &str) -> Option<CanonicalDate> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match NaiveDateTime::parse_from_str(&normalized, "%a %b %d %H:%M:%S %Y") {
        Ok(dt) => CanonicalDate::from_naive(dt),
        Err(_) => validate(Some(&normalized)),
    }
}
