// Signal file: parsed header plus its resident payload and extended keywords

use crate::core::codec::{self, HeaderOverrides, Payload};
use crate::core::constants::{BLOCK_SIZE, HEADER_SIZE};
use crate::core::error::{Result, SignalError};
use crate::core::format::SignalHeader;
use crate::core::keywords::{format_ext_keywords, parse_ext_keywords, Keyword};
use crate::core::view::{encode_scalars, TypedView};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SignalFile {
    path: Option<PathBuf>,
    header: SignalHeader,
    bytes: Vec<u8>,
    ext_keywords: Vec<Keyword>,
}

impl SignalFile {
    /// Parse a complete in-memory file. Pipe headers carry no payload, so
    /// only resident files have their data range checked.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let header = codec::parse_header(&bytes)?;

        if !header.pipe && header.detached == 0 {
            let start = header.data_offset();
            let len = header.data_len();
            let out_of_range = SignalError::OutOfRange {
                offset: start,
                len,
                available: bytes.len(),
            };
            match start.checked_add(len) {
                Some(end) if end <= bytes.len() => {}
                _ => return Err(out_of_range),
            }
        }

        let ext_keywords = Self::read_ext_keywords(&header, &bytes);
        Ok(Self {
            path: None,
            header,
            bytes,
            ext_keywords,
        })
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path)?;
        let mut file = Self::open(bytes)?;
        info!(
            "Opened {} ({} atoms, format {})",
            path.display(),
            file.header.size,
            file.header.format
        );
        file.path = Some(path);
        Ok(file)
    }

    fn read_ext_keywords(header: &SignalHeader, bytes: &[u8]) -> Vec<Keyword> {
        if header.ext_start <= 0 || header.ext_size <= 0 {
            return Vec::new();
        }
        let start = header.ext_start as usize * BLOCK_SIZE;
        let end = start + header.ext_size as usize;
        if end > bytes.len() {
            warn!(
                "Extended header at {}..{} lies past end of file ({} bytes)",
                start,
                end,
                bytes.len()
            );
            return Vec::new();
        }
        let keywords = parse_ext_keywords(&bytes[start..end], header.head_rep);
        debug!("Read {} extended header keywords", keywords.len());
        keywords
    }

    /// Build a resident file from samples (interleaved re/im for complex).
    pub fn from_samples(overrides: &HeaderOverrides, samples: &[f64]) -> Result<Self> {
        let header = codec::synthesize(overrides, Payload::Samples(samples))?;
        let mut bytes = codec::serialize_header(&header)?;
        encode_scalars(
            samples,
            header.format.scalar_type(),
            header.data_rep,
            &mut bytes,
        );
        Ok(Self {
            path: None,
            header,
            bytes,
            ext_keywords: Vec::new(),
        })
    }

    /// A payload-less file describing a streaming pipe.
    pub fn pipe(overrides: &HeaderOverrides, capacity_bytes: usize) -> Result<Self> {
        let header = codec::synthesize(overrides, Payload::Pipe { capacity_bytes })?;
        let bytes = codec::serialize_header(&header)?;
        Ok(Self {
            path: None,
            header,
            bytes,
            ext_keywords: Vec::new(),
        })
    }

    pub fn header(&self) -> &SignalHeader {
        &self.header
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn ext_keywords(&self) -> &[Keyword] {
        &self.ext_keywords
    }

    pub fn ext_keyword(&self, tag: &str) -> Option<&Keyword> {
        self.ext_keywords.iter().find(|k| k.tag == tag)
    }

    pub fn set_ext_keywords(&mut self, keywords: Vec<Keyword>) {
        self.ext_keywords = keywords;
    }

    /// View over the whole resident payload.
    pub fn view(&self) -> Result<TypedView<'_>> {
        self.view_range(0, self.header.size)
    }

    /// View over atoms `first..first + atoms`.
    pub fn view_range(&self, first: usize, atoms: usize) -> Result<TypedView<'_>> {
        if first + atoms > self.header.size {
            return Err(SignalError::OutOfRange {
                offset: first,
                len: atoms,
                available: self.header.size,
            });
        }
        let bits = first * self.header.format.bits_per_atom();
        if bits % 8 != 0 {
            // packed-bit views must start on a byte boundary
            return Err(SignalError::OutOfRange {
                offset: first,
                len: atoms,
                available: self.header.size,
            });
        }
        codec::view(
            &self.header,
            &self.bytes,
            self.header.data_offset() + bits / 8,
            atoms,
        )
    }

    /// Serialize header, payload and extended header. The extended header
    /// starts on the first block boundary after the payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = self.header.clone();
        let payload_start = header.data_offset();
        let payload_len = if header.pipe { 0 } else { header.data_len() };
        let payload = self
            .bytes
            .get(payload_start..payload_start.saturating_add(payload_len))
            .ok_or(SignalError::OutOfRange {
                offset: payload_start,
                len: payload_len,
                available: self.bytes.len(),
            })?;

        let ext = format_ext_keywords(&self.ext_keywords, header.head_rep);
        header.data_start = HEADER_SIZE as f64;
        if ext.is_empty() {
            header.ext_start = 0;
            header.ext_size = 0;
        } else {
            let data_end = HEADER_SIZE + payload_len;
            header.ext_start = data_end.div_ceil(BLOCK_SIZE) as i32;
            header.ext_size = ext.len() as i32;
        }

        let mut out = codec::serialize_header(&header)?;
        out.extend_from_slice(payload);
        if !ext.is_empty() {
            out.resize(header.ext_start as usize * BLOCK_SIZE, 0);
            out.extend_from_slice(&ext);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::FormatCode;
    use crate::core::keywords::KeywordValue;
    use std::io::Write;

    fn overrides(format: &str) -> HeaderOverrides {
        HeaderOverrides {
            format: Some(FormatCode::new(format).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_samples_and_view() {
        let samples: Vec<f64> = (0..10).map(|i| i as f64 - 3.0).collect();
        let file = SignalFile::from_samples(&overrides("SI"), &samples).unwrap();
        assert_eq!(file.view().unwrap().to_vec(), samples);
        assert_eq!(file.view_range(4, 3).unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(file.view_range(8, 3).is_err());
    }

    #[test]
    fn test_reopen_with_ext_keywords() {
        let samples = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let mut file = SignalFile::from_samples(&overrides("CF"), &samples).unwrap();
        file.set_ext_keywords(vec![
            Keyword::new("CENTER_FREQ", KeywordValue::Double(vec![1.5e9])),
            Keyword::new("SITE", KeywordValue::Ascii("north".into())),
        ]);

        let bytes = file.to_bytes().unwrap();
        // 24 payload bytes, then two keyword records of 32 and 24 bytes
        assert_eq!(bytes.len(), 2 * BLOCK_SIZE + 56);
        let reopened = SignalFile::open(bytes).unwrap();
        assert_eq!(reopened.header().ext_start, 2);
        assert_eq!(reopened.view().unwrap().to_vec(), samples.to_vec());
        assert_eq!(reopened.ext_keywords(), file.ext_keywords());
        assert_eq!(
            reopened.ext_keyword("CENTER_FREQ").and_then(|k| k.value.as_f64()),
            Some(1.5e9)
        );
    }

    #[test]
    fn test_open_rejects_short_payload() {
        let file = SignalFile::from_samples(&overrides("SD"), &[1.0; 8]).unwrap();
        let mut bytes = file.to_bytes().unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            SignalFile::open(bytes),
            Err(SignalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_open_rejects_hostile_extents() {
        let file = SignalFile::from_samples(&overrides("SF"), &[1.0; 4]).unwrap();
        let mut header = file.header().clone();
        header.data_start = 1e30;
        let bytes = codec::serialize_header(&header).unwrap();
        assert!(SignalFile::open(bytes).unwrap_err().is_format_error());

        let mut header = file.header().clone();
        header.data_size = 1e30;
        let bytes = codec::serialize_header(&header).unwrap();
        assert!(SignalFile::open(bytes).unwrap_err().is_format_error());

        // in range for the parser, but far past the bytes supplied
        let mut header = file.header().clone();
        header.data_start = 1e15;
        let bytes = codec::serialize_header(&header).unwrap();
        assert!(matches!(
            SignalFile::open(bytes),
            Err(SignalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_open_path() {
        let file = SignalFile::from_samples(&overrides("SB"), &[5.0, 6.0, 7.0]).unwrap();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&file.to_bytes().unwrap()).unwrap();

        let opened = SignalFile::open_path(tmp.path()).unwrap();
        assert_eq!(opened.path(), Some(tmp.path()));
        assert_eq!(opened.view().unwrap().to_vec(), vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_pipe_file_has_no_payload() {
        let file = SignalFile::pipe(&overrides("SF"), 256).unwrap();
        assert!(file.header().pipe);
        let reopened = SignalFile::open(file.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.header(), file.header());
    }
}
