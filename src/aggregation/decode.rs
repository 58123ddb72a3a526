//! Batch decoding: gzip container handling and per-line parsing.

use std::io::{BufReader, Cursor};

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::models::WafLog;

/// Errors opening a compressed log batch
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("batch is not a gzip stream ({size} bytes, bad magic)")]
    NotGzip { size: usize },
}

/// Errors decoding a single log line
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed log line: {0}")]
    Malformed(#[from] serde_json::Error),
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a raw batch as a line-oriented reader over its decompressed content.
///
/// The gzip magic is checked up front so an invalid container fails here
/// rather than surfacing as a read error mid-scan. The returned reader is
/// one-pass; resources are released when it is dropped.
pub fn open_batch(bytes: Vec<u8>) -> Result<BufReader<GzDecoder<Cursor<Vec<u8>>>>, DecodeError> {
    if bytes.len() < GZIP_MAGIC.len() || bytes[..2] != GZIP_MAGIC {
        return Err(DecodeError::NotGzip { size: bytes.len() });
    }

    Ok(BufReader::new(GzDecoder::new(Cursor::new(bytes))))
}

/// Decode one line of a log batch into a [`WafLog`].
///
/// Failures are line-scoped: the caller skips the line and keeps scanning.
pub fn parse_log_line(line: &str) -> Result<WafLog, ParseError> {
    let record = serde_json::from_str(line)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{BufRead, Write};

    fn gzip(content: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_open_batch_reads_lines() {
        let bytes = gzip("first line\nsecond line\n");
        let reader = open_batch(bytes).unwrap();

        let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["first line", "second line"]);
    }

    #[test]
    fn test_open_batch_rejects_plain_text() {
        let result = open_batch(b"not compressed at all".to_vec());
        assert!(matches!(result, Err(DecodeError::NotGzip { .. })));
    }

    #[test]
    fn test_open_batch_rejects_empty_input() {
        assert!(matches!(
            open_batch(Vec::new()),
            Err(DecodeError::NotGzip { size: 0 })
        ));
    }

    #[test]
    fn test_parse_log_line_valid() {
        let record = parse_log_line(
            r#"{"action":"BLOCK","terminatingRuleId":"RULE_A","httpRequest":{"clientIp":"1.2.3.4"}}"#,
        )
        .unwrap();
        assert_eq!(record.http_request.client_ip, "1.2.3.4");
    }

    #[test]
    fn test_parse_log_line_malformed() {
        assert!(parse_log_line("{not json").is_err());
        assert!(parse_log_line("plain text line").is_err());
    }
}
