//! Last-resort metadata: an XMP packet found anywhere in the first few MiB.

use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use super::validate::{validate, CanonicalDate};
use crate::error::ExtractError;
use crate::formats::DateExtractor;

/// XMP packets sit near the start of well-formed files.
pub const MAX_XMP_SCAN: u64 = 3 * 1024 * 1024;

/// Window taken after the opening marker when no closing marker was read.
pub const TRUNCATED_XMP_WINDOW: usize = 64 * 1024;

const OPEN_MARKERS: &[&[u8]] = &[b"<x:xmpmeta", b"<rdf:RDF"];
const CLOSE_MARKERS: &[&[u8]] = &[b"</x:xmpmeta>", b"</rdf:RDF>"];

const DATE_TOKEN: &str = r#"[>\s"'=]*(\d{4}[-:]\d{2}[-:]\d{2}[T ]\d{2}:\d{2}:\d{2}[^\s<"']*)"#;

static DATE_TAGS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        "exif:DateTimeOriginal",
        "photoshop:DateCreated",
        "xmp:CreateDate",
        "xmp:ModifyDate",
    ]
    .into_iter()
    .map(|tag| (tag, Regex::new(&format!("{}{}", regex::escape(tag), DATE_TOKEN)).unwrap()))
    .collect()
});

/// Scan a file's leading bytes for XMP date tags.
pub fn extract_xmp_date(path: &Path) -> Option<CanonicalDate> {
    match read_head(path) {
        Ok(data) => scan_xmp_bytes(&data),
        Err(e) => {
            log::debug!("Could not read XMP from {}: {}", path.display(), e);
            None
        }
    }
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut data = Vec::new();
    file.take(MAX_XMP_SCAN).read_to_end(&mut data)?;
    Ok(data)
}

/// Locate an XMP packet in `data` and return its best date tag.
pub fn scan_xmp_bytes(data: &[u8]) -> Option<CanonicalDate> {
    let start = OPEN_MARKERS.iter().find_map(|m| find(data, m, 0))?;

    let end = CLOSE_MARKERS
        .iter()
        .find_map(|m| find(data, m, start).map(|pos| pos + m.len()))
        .unwrap_or_else(|| (start + TRUNCATED_XMP_WINDOW).min(data.len()));

    let text = String::from_utf8_lossy(&data[start..end]);

    for (tag, re) in DATE_TAGS.iter() {
        for caps in re.captures_iter(&text) {
            if let Some(date) = validate(caps.get(1).map(|m| m.as_str())) {
                log::debug!("Found XMP date [{}]: {}", tag, date);
                return Some(date);
            }
        }
    }

    None
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// The XMP stage as a resolver stage.
#[derive(Debug, Default)]
pub struct XmpScanner;

impl DateExtractor for XmpScanner {
    fn name(&self) -> &'static str {
        "xmp"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        Ok(extract_xmp_date(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PACKET: &str = r#"<?xpacket begin=""?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF>
  <rdf:Description xmp:ModifyDate="2020-05-05T05:05:05+02:00"
                   xmp:CreateDate="2019-05-04T10:11:12+02:00">
   <exif:DateTimeOriginal>2018-01-02T03:04:05.00</exif:DateTimeOriginal>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#;

    #[test]
    fn test_priority_order() {
        let mut data = vec![0xFFu8, 0xD8, 0x00, 0x10];
        data.extend_from_slice(PACKET.as_bytes());
        let date = scan_xmp_bytes(&data).unwrap();
        assert_eq!(date.to_string(), "2018:01:02 03:04:05");
    }

    #[test]
    fn test_attribute_form_and_fallback_tags() {
        let packet = PACKET.replace("2018-01-02T03:04:05.00", "0000-00-00T00:00:00");
        let date = scan_xmp_bytes(packet.as_bytes()).unwrap();
        assert_eq!(date.to_string(), "2019:05:04 10:11:12");
    }

    #[test]
    fn test_photoshop_date_created() {
        let xmp = concat!(
            "<rdf:RDF><photoshop:DateCreated>2011-11-11T11:11:11",
            "</photoshop:DateCreated></rdf:RDF>"
        );
        assert_eq!(scan_xmp_bytes(xmp.as_bytes()).unwrap().to_string(), "2011:11:11 11:11:11");
    }

    #[test]
    fn test_no_packet() {
        let loose = b"just some bytes xmp:CreateDate=\"2019-05-04T10:11:12\"";
        assert!(scan_xmp_bytes(loose).is_none());
        assert!(scan_xmp_bytes(b"").is_none());
    }

    #[test]
    fn test_truncated_packet_uses_window() {
        let xmp = "<x:xmpmeta><rdf:Description xmp:CreateDate=\"2017-07-07T07:07:07\"";
        assert_eq!(scan_xmp_bytes(xmp.as_bytes()).unwrap().to_string(), "2017:07:07 07:07:07");
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut data =
            b"<x:xmpmeta>\xff\xfe<xmp:CreateDate>2016-06-06T06:06:06Z</xmp:CreateDate>".to_vec();
        data.extend_from_slice(b"</x:xmpmeta>");
        assert_eq!(scan_xmp_bytes(&data).unwrap().to_string(), "2016:06:06 06:06:06");
    }

    #[test]
    fn test_reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 1024]).unwrap();
        file.write_all(PACKET.as_bytes()).unwrap();
        file.flush().unwrap();
        assert_eq!(extract_xmp_date(file.path()).unwrap().to_string(), "2018:01:02 03:04:05");
    }

    #[test]
    fn test_missing_file() {
        assert!(extract_xmp_date(Path::new("/nonexistent/file.jpg")).is_none());
    }
}
