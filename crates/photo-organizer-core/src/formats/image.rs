use ::image::{ImageDecoder, ImageReader};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::date::exif::{date_from_exif, find_tiff_block, parse_tiff_block, DATE_TAGS};
use crate::date::{validate, CanonicalDate};
use crate::error::ExtractError;
use crate::formats::DateExtractor;

/// How far into a file the raw `Exif\0\0` scan looks.
const MAX_EXIF_SCAN: u64 = 8 * 1024 * 1024;

/// GIF comments live between frames; large animations are cut off here.
const MAX_GIF_READ: u64 = 16 * 1024 * 1024;

const PNG_KEYS: &[&str] = &["creation_time", "date:create", "date:modify"];
const GIF_KEYS: &[&str] = &["date:create", "date:modify", "creation_time"];

/// PNG text chunks (`tEXt`, `zTXt`, `iTXt`) written by ImageMagick, ffmpeg
/// and most screenshot tools.
#[derive(Debug, Default)]
pub struct PngTextExtractor;

impl DateExtractor for PngTextExtractor {
    fn name(&self) -> &'static str {
        "png"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        let file = File::open(path)?;
        let mut reader = png::Decoder::new(BufReader::new(file)).read_info()?;
        if let Some(date) = date_from_text_pairs(&text_pairs(reader.info())) {
            return Ok(Some(date));
        }

        // ImageMagick writes date:create/date:modify after IDAT
        let mut frame = vec![0; reader.output_buffer_size()];
        reader.next_frame(&mut frame)?;
        reader.finish()?;
        Ok(date_from_text_pairs(&text_pairs(reader.info())))
    }
}

fn text_pairs(info: &png::Info) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for c in &info.uncompressed_latin1_text {
        pairs.push((c.keyword.clone(), c.text.clone()));
    }
    for c in &info.compressed_latin1_text {
        if let Ok(text) = c.get_text() {
            pairs.push((c.keyword.clone(), text));
        }
    }
    for c in &info.utf8_text {
        if let Ok(text) = c.get_text() {
            pairs.push((c.keyword.clone(), text));
        }
    }
    pairs
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace(' ', "_")
}

fn date_from_text_pairs(pairs: &[(String, String)]) -> Option<CanonicalDate> {
    for wanted in PNG_KEYS {
        for (key, value) in pairs {
            if normalize_key(key) == *wanted {
                if let Some(date) = validate(Some(value)) {
                    return Some(date);
                }
            }
        }
    }
    None
}

/// Dates that ImageMagick-style tools leave in GIF comment extensions.
#[derive(Debug, Default)]
pub struct GifCommentExtractor;

impl DateExtractor for GifCommentExtractor {
    fn name(&self) -> &'static str {
        "gif"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        let file = File::open(path)?;
        let mut data = Vec::new();
        file.take(MAX_GIF_READ).read_to_end(&mut data)?;

        let comments = gif_comments(&data)?;
        Ok(date_from_comments(&comments))
    }
}

/// Walk the GIF block structure and collect every comment extension.
fn gif_comments(data: &[u8]) -> Result<Vec<String>, ExtractError> {
    if data.len() < 13 || !(data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) {
        return Err(ExtractError::malformed("gif", "missing GIF header"));
    }

    let mut pos = 13;
    let flags = data[10];
    if flags & 0x80 != 0 {
        pos += 3 * (1usize << ((flags & 0x07) + 1));
    }

    let mut comments = Vec::new();
    while let Some(&block) = data.get(pos) {
        match block {
            0x21 => {
                let label = data.get(pos + 1).copied();
                let (body, next) = read_sub_blocks(data, pos + 2);
                if label == Some(0xFE) {
                    comments.push(String::from_utf8_lossy(&body).into_owned());
                }
                pos = next;
            }
            0x2C => {
                let Some(&local_flags) = data.get(pos + 9) else {
                    break;
                };
                pos += 10;
                if local_flags & 0x80 != 0 {
                    pos += 3 * (1usize << ((local_flags & 0x07) + 1));
                }
                // LZW minimum code size, then image data sub-blocks
                let (_, next) = read_sub_blocks(data, pos + 1);
                pos = next;
            }
            0x3B => break,
            _ => break,
        }
    }

    Ok(comments)
}

/// Concatenate sub-blocks starting at `pos`; returns the body and the
/// position after the terminator. Truncated input ends the walk.
fn read_sub_blocks(data: &[u8], mut pos: usize) -> (Vec<u8>, usize) {
    let mut body = Vec::new();
    while let Some(&len) = data.get(pos) {
        pos += 1;
        if len == 0 {
            return (body, pos);
        }
        let end = pos + len as usize;
        match data.get(pos..end) {
            Some(chunk) => body.extend_from_slice(chunk),
            None => {
                body.extend_from_slice(&data[pos.min(data.len())..]);
                return (body, data.len());
            }
        }
        pos = end;
    }
    (body, data.len())
}

fn date_from_comments(comments: &[String]) -> Option<CanonicalDate> {
    for key in GIF_KEYS {
        for line in comments.iter().flat_map(|c| c.lines()) {
            let line = line.trim();
            let Some(head) = line.get(..key.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(key) {
                continue;
            }
            let rest = line[key.len()..].trim_start();
            let Some(value) = rest.strip_prefix('=').or_else(|| rest.strip_prefix(':')) else {
                continue;
            };
            if let Some(date) = validate(Some(value.trim())) {
                return Some(date);
            }
        }
    }
    None
}

/// Containers that carry a plain EXIF block: WebP, TIFF, JPEG 2000, MPO, AVIF.
#[derive(Debug, Default)]
pub struct EmbeddedExifExtractor;

impl DateExtractor for EmbeddedExifExtractor {
    fn name(&self) -> &'static str {
        "embedded-exif"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        match read_container(path) {
            Ok(Some(date)) => return Ok(Some(date)),
            Ok(None) => {}
            Err(e) => log::debug!("container EXIF reader failed on {}: {}", path.display(), e),
        }

        match read_via_decoder(path) {
            Ok(Some(date)) => return Ok(Some(date)),
            Ok(None) => {}
            Err(e) => log::debug!("image decoder EXIF failed on {}: {}", path.display(), e),
        }

        scan_for_exif(path)
    }
}

fn read_container(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    let file = File::open(path)?;
    let mut bufreader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(exif) => Ok(date_from_exif(&exif, &DATE_TAGS)),
        Err(exif::Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_via_decoder(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let Some(raw) = decoder.exif_metadata()? else {
        return Ok(None);
    };
    let tiff = match raw.strip_prefix(b"Exif\0\0") {
        Some(rest) => rest.to_vec(),
        None => raw,
    };
    let exif = parse_tiff_block(tiff)?;
    Ok(date_from_exif(&exif, &DATE_TAGS))
}

fn scan_for_exif(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    let file = File::open(path)?;
    let mut data = Vec::new();
    file.take(MAX_EXIF_SCAN).read_to_end(&mut data)?;

    let Some(block) = find_tiff_block(&data) else {
        return Ok(None);
    };
    let exif = parse_tiff_block(block.to_vec())?;
    Ok(date_from_exif(&exif, &DATE_TAGS))
}

/// BMP has no metadata container. Registered so `.bmp` is a known image
/// type; the generic stages still run.
#[derive(Debug, Default)]
pub struct BmpExtractor;

impl DateExtractor for BmpExtractor {
    fn name(&self) -> &'static str {
        "bmp"
    }

    fn read(&self, _path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        Ok(None)
    }
}
