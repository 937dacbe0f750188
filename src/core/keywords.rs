// Main-header and extended-header keyword codec

use crate::core::constants::{KEYWORDS_LEN, KEYWORD_PREFIX_SIZE};
use crate::core::error::{Result, SignalError};
use crate::core::format::Endian;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Parse the NUL-separated `KEY=VALUE` list of the main header.
pub fn parse_main_keywords(raw: &[u8]) -> Vec<(String, String)> {
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let text = String::from_utf8_lossy(part);
            match text.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (text.to_string(), String::new()),
            }
        })
        .collect()
}

/// Format main-header keywords; fails if they do not fit the 92-byte field.
pub fn format_main_keywords(keywords: &[(String, String)]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, (k, v)) in keywords.iter().enumerate() {
        if i > 0 {
            out.push(0);
        }
        out.extend_from_slice(k.as_bytes());
        out.push(b'=');
        out.extend_from_slice(v.as_bytes());
    }
    if out.len() > KEYWORDS_LEN {
        return Err(SignalError::InvalidHeader(format!(
            "main keywords need {} bytes, field holds {}",
            out.len(),
            KEYWORDS_LEN
        )));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeywordValue {
    Ascii(String),
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Long(Vec<i32>),
    LongLong(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl KeywordValue {
    fn type_code(&self) -> u8 {
        match self {
            KeywordValue::Ascii(_) => b'A',
            KeywordValue::Byte(_) => b'B',
            KeywordValue::Short(_) => b'I',
            KeywordValue::Long(_) => b'L',
            KeywordValue::LongLong(_) => b'X',
            KeywordValue::Float(_) => b'F',
            KeywordValue::Double(_) => b'D',
        }
    }

    /// First numeric element, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KeywordValue::Ascii(s) => s.trim().parse().ok(),
            KeywordValue::Byte(v) => v.first().map(|x| *x as f64),
            KeywordValue::Short(v) => v.first().map(|x| *x as f64),
            KeywordValue::Long(v) => v.first().map(|x| *x as f64),
            KeywordValue::LongLong(v) => v.first().map(|x| *x as f64),
            KeywordValue::Float(v) => v.first().map(|x| *x as f64),
            KeywordValue::Double(v) => v.first().copied(),
        }
    }

    fn encode(&self, endian: Endian, out: &mut Vec<u8>) {
        macro_rules! put {
            ($vals:expr) => {
                for x in $vals {
                    match endian {
                        Endian::Little => out.extend_from_slice(&x.to_le_bytes()),
                        Endian::Big => out.extend_from_slice(&x.to_be_bytes()),
                    }
                }
            };
        }
        match self {
            KeywordValue::Ascii(s) => out.extend_from_slice(s.as_bytes()),
            KeywordValue::Byte(v) => out.extend(v.iter().map(|x| *x as u8)),
            KeywordValue::Short(v) => put!(v),
            KeywordValue::Long(v) => put!(v),
            KeywordValue::LongLong(v) => put!(v),
            KeywordValue::Float(v) => put!(v),
            KeywordValue::Double(v) => put!(v),
        }
    }

    fn decode(type_code: u8, data: &[u8], endian: Endian) -> Option<Self> {
        macro_rules! take {
            ($ty:ty, $variant:ident) => {{
                const N: usize = std::mem::size_of::<$ty>();
                let vals = data
                    .chunks_exact(N)
                    .map(|c| {
                        let mut raw = [0u8; N];
                        raw.copy_from_slice(c);
                        match endian {
                            Endian::Little => <$ty>::from_le_bytes(raw),
                            Endian::Big => <$ty>::from_be_bytes(raw),
                        }
                    })
                    .collect();
                KeywordValue::$variant(vals)
            }};
        }
        Some(match type_code {
            b'A' => KeywordValue::Ascii(String::from_utf8_lossy(data).into_owned()),
            b'B' => KeywordValue::Byte(data.iter().map(|b| *b as i8).collect()),
            b'I' => take!(i16, Short),
            b'L' => take!(i32, Long),
            b'X' => take!(i64, LongLong),
            b'F' => take!(f32, Float),
            b'D' => take!(f64, Double),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub tag: String,
    pub value: KeywordValue,
}

impl Keyword {
    pub fn new(tag: impl Into<String>, value: KeywordValue) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

/// Parse extended-header keyword records. Records with an unknown type are
/// skipped; a record whose length runs past the buffer ends the scan.
pub fn parse_ext_keywords(buf: &[u8], endian: Endian) -> Vec<Keyword> {
    let mut keywords = Vec::new();
    let mut pos = 0usize;

    while pos + KEYWORD_PREFIX_SIZE <= buf.len() {
        let mut lkey_raw = [0u8; 4];
        lkey_raw.copy_from_slice(&buf[pos..pos + 4]);
        let mut lextra_raw = [0u8; 2];
        lextra_raw.copy_from_slice(&buf[pos + 4..pos + 6]);
        let (lkey, lextra) = match endian {
            Endian::Little => (i32::from_le_bytes(lkey_raw), i16::from_le_bytes(lextra_raw)),
            Endian::Big => (i32::from_be_bytes(lkey_raw), i16::from_be_bytes(lextra_raw)),
        };
        let ltag = buf[pos + 6] as i8;
        let type_code = buf[pos + 7];

        if lkey <= 0 {
            break;
        }
        let lkey = lkey as usize;
        // ldata counts the prefix too
        let ldata = lkey.saturating_sub(lextra.max(0) as usize);
        let tag_start = pos + ldata;
        let tag_end = tag_start + ltag.max(0) as usize;
        if pos + lkey > buf.len() || tag_end > pos + lkey || ldata < KEYWORD_PREFIX_SIZE {
            warn!("Extended header record at {} overruns buffer", pos);
            break;
        }
        let data = &buf[pos + KEYWORD_PREFIX_SIZE..tag_start];
        let tag = String::from_utf8_lossy(&buf[tag_start..tag_end]).into_owned();

        match KeywordValue::decode(type_code, data, endian) {
            Some(value) => keywords.push(Keyword { tag, value }),
            None => warn!("Skipping keyword {} with type {:?}", tag, type_code as char),
        }
        pos += lkey;
    }

    keywords
}

/// Encode keyword records, each padded to a multiple of 8 bytes.
pub fn format_ext_keywords(keywords: &[Keyword], endian: Endian) -> Vec<u8> {
    let mut out = Vec::new();
    for kw in keywords {
        let mut data = Vec::new();
        kw.value.encode(endian, &mut data);
        let tag = kw.tag.as_bytes();
        let ltag = tag.len().min(i8::MAX as usize);
        let ldata = KEYWORD_PREFIX_SIZE + data.len();
        let lkey = (ldata + ltag).div_ceil(8) * 8;
        let lextra = (lkey - ldata) as i16;

        match endian {
            Endian::Little => {
                out.extend_from_slice(&(lkey as i32).to_le_bytes());
                out.extend_from_slice(&lextra.to_le_bytes());
            }
            Endian::Big => {
                out.extend_from_slice(&(lkey as i32).to_be_bytes());
                out.extend_from_slice(&lextra.to_be_bytes());
            }
        }
        out.push(ltag as u8);
        out.push(kw.value.type_code());
        out.extend_from_slice(&data);
        out.extend_from_slice(&tag[..ltag]);
        out.resize(out.len() + (lkey - ldata - ltag), 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_keywords() {
        let raw = b"IO=X-Midas\0VER=2.1\0\0\0";
        let kws = parse_main_keywords(raw);
        assert_eq!(
            kws,
            vec![
                ("IO".to_string(), "X-Midas".to_string()),
                ("VER".to_string(), "2.1".to_string())
            ]
        );
        let formatted = format_main_keywords(&kws).unwrap();
        assert_eq!(formatted, b"IO=X-Midas\0VER=2.1".to_vec());
    }

    #[test]
    fn test_main_keyword_values_keep_spaces() {
        let kws = vec![
            ("NAME".to_string(), "left pad ".to_string()),
            ("NOTE".to_string(), "  ".to_string()),
        ];
        let raw = format_main_keywords(&kws).unwrap();
        assert_eq!(parse_main_keywords(&raw), kws);
    }

    #[test]
    fn test_main_keywords_overflow() {
        let long = vec![("K".to_string(), "v".repeat(100))];
        assert!(format_main_keywords(&long).is_err());
    }

    #[test]
    fn test_ext_keywords_roundtrip() {
        let kws = vec![
            Keyword::new("COMMENT", KeywordValue::Ascii("hello".into())),
            Keyword::new("GAIN", KeywordValue::Double(vec![2.5])),
            Keyword::new("TAPS", KeywordValue::Short(vec![1, -2, 3])),
        ];
        for endian in [Endian::Little, Endian::Big] {
            let buf = format_ext_keywords(&kws, endian);
            assert_eq!(buf.len() % 8, 0);
            assert_eq!(parse_ext_keywords(&buf, endian), kws);
        }
    }

    #[test]
    fn test_ext_keywords_truncated() {
        let kws = vec![
            Keyword::new("A", KeywordValue::Long(vec![7])),
            Keyword::new("B", KeywordValue::Long(vec![8])),
        ];
        let buf = format_ext_keywords(&kws, Endian::Little);
        let parsed = parse_ext_keywords(&buf[..buf.len() - 4], Endian::Little);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].value.as_f64(), Some(7.0));
    }
}
