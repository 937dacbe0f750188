// Signal header codec: parse, serialize and synthesize the 512-byte prologue

use crate::core::constants::*;
use crate::core::error::{Result, SignalError};
use crate::core::format::*;
use crate::core::keywords::{format_main_keywords, parse_main_keywords};
use crate::core::view::TypedView;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

fn rd_i16(bytes: &[u8], off: usize, endian: Endian) -> i16 {
    let raw = [bytes[off], bytes[off + 1]];
    match endian {
        Endian::Little => i16::from_le_bytes(raw),
        Endian::Big => i16::from_be_bytes(raw),
    }
}

fn rd_i32(bytes: &[u8], off: usize, endian: Endian) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[off..off + 4]);
    match endian {
        Endian::Little => i32::from_le_bytes(raw),
        Endian::Big => i32::from_be_bytes(raw),
    }
}

fn rd_f64(bytes: &[u8], off: usize, endian: Endian) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[off..off + 8]);
    match endian {
        Endian::Little => f64::from_le_bytes(raw),
        Endian::Big => f64::from_be_bytes(raw),
    }
}

fn wr(buf: &mut [u8], off: usize, raw: &[u8]) {
    buf[off..off + raw.len()].copy_from_slice(raw);
}

fn wr_i16(buf: &mut [u8], off: usize, v: i16, endian: Endian) {
    match endian {
        Endian::Little => wr(buf, off, &v.to_le_bytes()),
        Endian::Big => wr(buf, off, &v.to_be_bytes()),
    }
}

fn wr_i32(buf: &mut [u8], off: usize, v: i32, endian: Endian) {
    match endian {
        Endian::Little => wr(buf, off, &v.to_le_bytes()),
        Endian::Big => wr(buf, off, &v.to_be_bytes()),
    }
}

fn wr_f64(buf: &mut [u8], off: usize, v: f64, endian: Endian) {
    match endian {
        Endian::Little => wr(buf, off, &v.to_le_bytes()),
        Endian::Big => wr(buf, off, &v.to_be_bytes()),
    }
}

/// Byte offsets and lengths must be finite, non-negative and small enough
/// that bit counts derived from them fit in `usize`.
fn byte_extent(field: &str, value: f64) -> Result<f64> {
    let limit = (usize::MAX / 16) as f64;
    if !value.is_finite() || value < 0.0 || value > limit {
        return Err(SignalError::InvalidHeader(format!(
            "{} of {} bytes is out of range",
            field, value
        )));
    }
    Ok(value)
}

/// Parse the fixed prologue at the start of `bytes`.
pub fn parse_header(bytes: &[u8]) -> Result<SignalHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(SignalError::Truncated {
            needed: HEADER_SIZE,
            got: bytes.len(),
        });
    }

    let version = String::from_utf8_lossy(&bytes[OFF_VERSION..OFF_VERSION + 4])
        .trim_end_matches(['\0', ' '])
        .to_string();
    let head_rep = Endian::from_tag(&bytes[OFF_HEAD_REP..OFF_HEAD_REP + 4])?;
    let data_rep = Endian::from_tag(&bytes[OFF_DATA_REP..OFF_DATA_REP + 4])?;
    let e = head_rep;

    let format = FormatCode::from_bytes([bytes[OFF_FORMAT], bytes[OFF_FORMAT + 1]])?;
    let type_code = rd_i32(bytes, OFF_TYPE, e);
    let class = DataClass::from_type_code(type_code)?;

    let keylength = rd_i32(bytes, OFF_KEYLENGTH, e).clamp(0, KEYWORDS_LEN as i32) as usize;
    let keywords = parse_main_keywords(&bytes[OFF_KEYWORDS..OFF_KEYWORDS + keylength]);

    let data_start = byte_extent("data_start", rd_f64(bytes, OFF_DATA_START, e))?;
    let data_size = byte_extent("data_size", rd_f64(bytes, OFF_DATA_SIZE, e))?;
    let bits_per_atom = format.bits_per_atom();
    let mut size = if data_size > 0.0 {
        ((data_size * 8.0) / bits_per_atom as f64).floor() as usize
    } else {
        0
    };

    let (subsize, ystart, ydelta, yunits) = match class {
        DataClass::Vector => (0, 0.0, 0.0, 0),
        DataClass::Matrix => {
            let subsize = rd_i32(bytes, OFF_SUBSIZE, e);
            if subsize <= 0 {
                return Err(SignalError::InvalidHeader(format!(
                    "type {} requires a positive subsize, got {}",
                    type_code, subsize
                )));
            }
            let subsize = subsize as usize;
            let rows = size / subsize;
            if rows * subsize != size {
                warn!(
                    "Matrix payload of {} atoms is not a multiple of subsize {}; dropping partial row",
                    size, subsize
                );
                size = rows * subsize;
            }
            (
                subsize,
                rd_f64(bytes, OFF_YSTART, e),
                rd_f64(bytes, OFF_YDELTA, e),
                rd_i32(bytes, OFF_YUNITS, e),
            )
        }
    };

    let header = SignalHeader {
        version,
        head_rep,
        data_rep,
        detached: rd_i32(bytes, OFF_DETACHED, e),
        protected: rd_i32(bytes, OFF_PROTECTED, e),
        pipe: rd_i32(bytes, OFF_PIPE, e) != 0,
        ext_start: rd_i32(bytes, OFF_EXT_START, e),
        ext_size: rd_i32(bytes, OFF_EXT_SIZE, e),
        data_start,
        data_size,
        type_code,
        format,
        flagmask: rd_i16(bytes, OFF_FLAGMASK, e),
        timecode: rd_f64(bytes, OFF_TIMECODE, e),
        pipesize: rd_i32(bytes, OFF_PIPESIZE, e),
        keywords,
        xstart: rd_f64(bytes, OFF_XSTART, e),
        xdelta: rd_f64(bytes, OFF_XDELTA, e),
        xunits: rd_i32(bytes, OFF_XUNITS, e),
        subsize,
        ystart,
        ydelta,
        yunits,
        size,
    };

    debug!(
        "Parsed header: type={} format={} size={} pipe={}",
        header.type_code, header.format, header.size, header.pipe
    );
    Ok(header)
}

/// Serialize the fixed prologue. The y adjunct is only written for matrices.
pub fn serialize_header(header: &SignalHeader) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; HEADER_SIZE];
    let e = header.head_rep;

    let version = header.version.as_bytes();
    let n = version.len().min(4);
    wr(&mut buf, OFF_VERSION, &version[..n]);
    wr(&mut buf, OFF_HEAD_REP, header.head_rep.tag());
    wr(&mut buf, OFF_DATA_REP, header.data_rep.tag());
    wr_i32(&mut buf, OFF_DETACHED, header.detached, e);
    wr_i32(&mut buf, OFF_PROTECTED, header.protected, e);
    wr_i32(&mut buf, OFF_PIPE, header.pipe as i32, e);
    wr_i32(&mut buf, OFF_EXT_START, header.ext_start, e);
    wr_i32(&mut buf, OFF_EXT_SIZE, header.ext_size, e);
    wr_f64(&mut buf, OFF_DATA_START, header.data_start, e);
    wr_f64(&mut buf, OFF_DATA_SIZE, header.data_size, e);
    wr_i32(&mut buf, OFF_TYPE, header.type_code, e);
    wr(&mut buf, OFF_FORMAT, &header.format.as_bytes());
    wr_i16(&mut buf, OFF_FLAGMASK, header.flagmask, e);
    wr_f64(&mut buf, OFF_TIMECODE, header.timecode, e);
    wr_i32(&mut buf, OFF_PIPESIZE, header.pipesize, e);
    wr_f64(&mut buf, OFF_IN_BYTE, 0.0, e);
    wr_f64(&mut buf, OFF_OUT_BYTE, 0.0, e);

    let keywords = format_main_keywords(&header.keywords)?;
    wr_i32(&mut buf, OFF_KEYLENGTH, keywords.len() as i32, e);
    wr(&mut buf, OFF_KEYWORDS, &keywords);

    wr_f64(&mut buf, OFF_XSTART, header.xstart, e);
    wr_f64(&mut buf, OFF_XDELTA, header.xdelta, e);
    wr_i32(&mut buf, OFF_XUNITS, header.xunits, e);
    if header.class() == DataClass::Matrix {
        let subsize = i32::try_from(header.subsize).map_err(|_| {
            SignalError::InvalidHeader(format!("subsize {} too large", header.subsize))
        })?;
        wr_i32(&mut buf, OFF_SUBSIZE, subsize, e);
        wr_f64(&mut buf, OFF_YSTART, header.ystart, e);
        wr_f64(&mut buf, OFF_YDELTA, header.ydelta, e);
        wr_i32(&mut buf, OFF_YUNITS, header.yunits, e);
    }

    Ok(buf)
}

/// Bytes per scalar for a two-character format code (0.125 for packed bits).
pub fn element_size(format: &str) -> Result<f64> {
    Ok(FormatCode::new(format)?.scalar_type().byte_size())
}

/// Typed view of `atoms` atoms of `header`'s format starting at `byte_offset`.
pub fn view<'a>(
    header: &SignalHeader,
    bytes: &'a [u8],
    byte_offset: usize,
    atoms: usize,
) -> Result<TypedView<'a>> {
    TypedView::new(
        bytes,
        byte_offset,
        atoms,
        header.format.scalar_type(),
        header.format.scalars_per_atom(),
        header.data_rep,
    )
}

/// Field overrides for programmatically created headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderOverrides {
    pub type_code: Option<i32>,
    pub format: Option<FormatCode>,
    pub data_rep: Option<Endian>,
    pub xstart: Option<f64>,
    pub xdelta: Option<f64>,
    pub xunits: Option<i32>,
    pub subsize: Option<usize>,
    pub ystart: Option<f64>,
    pub ydelta: Option<f64>,
    pub yunits: Option<i32>,
    pub timecode: Option<f64>,
    pub keywords: Option<Vec<(String, String)>>,
}

/// What the synthesized header describes.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Resident samples, interleaved re/im for complex formats.
    Samples(&'a [f64]),
    /// A streaming pipe of the given capacity in bytes.
    Pipe { capacity_bytes: usize },
}

fn base_header() -> SignalHeader {
    let native = Endian::native();
    SignalHeader {
        version: String::from_utf8_lossy(VERSION_TAG).into_owned(),
        head_rep: native,
        data_rep: native,
        detached: 0,
        protected: 0,
        pipe: false,
        ext_start: 0,
        ext_size: 0,
        data_start: HEADER_SIZE as f64,
        data_size: 0.0,
        type_code: 1000,
        format: FormatCode::SF,
        flagmask: 0,
        timecode: 0.0,
        pipesize: 0,
        keywords: Vec::new(),
        xstart: 0.0,
        xdelta: 1.0,
        xunits: 0,
        subsize: 0,
        ystart: 0.0,
        ydelta: 0.0,
        yunits: 0,
        size: 0,
    }
}

/// Build a header for new data from defaults plus `overrides`.
pub fn synthesize(overrides: &HeaderOverrides, payload: Payload<'_>) -> Result<SignalHeader> {
    resynthesize(&base_header(), overrides, payload)
}

/// Build a header from `base` with `overrides` applied, recomputing size
/// fields so they agree with `payload` and the resulting class.
pub fn resynthesize(
    base: &SignalHeader,
    overrides: &HeaderOverrides,
    payload: Payload<'_>,
) -> Result<SignalHeader> {
    let mut hdr = base.clone();
    hdr.detached = 0;
    hdr.ext_start = 0;
    hdr.ext_size = 0;
    hdr.data_start = HEADER_SIZE as f64;

    if let Some(format) = overrides.format {
        hdr.format = format;
    }
    if let Some(rep) = overrides.data_rep {
        hdr.data_rep = rep;
    }
    hdr.type_code = match (overrides.type_code, overrides.subsize) {
        (Some(t), _) => t,
        (None, Some(_)) => DataClass::Matrix.type_code(),
        (None, None) => base.type_code,
    };
    let class = DataClass::from_type_code(hdr.type_code)?;

    if let Some(v) = overrides.xstart {
        hdr.xstart = v;
    }
    if let Some(v) = overrides.xdelta {
        hdr.xdelta = v;
    }
    if let Some(v) = overrides.xunits {
        hdr.xunits = v;
    }
    if let Some(v) = overrides.timecode {
        hdr.timecode = v;
    }
    if let Some(kws) = &overrides.keywords {
        hdr.keywords = kws.clone();
    }

    let spa = hdr.format.scalars_per_atom();
    match payload {
        Payload::Samples(samples) => {
            if samples.len() % spa != 0 {
                return Err(SignalError::InvalidHeader(format!(
                    "{} scalars do not fill whole {} atoms",
                    samples.len(),
                    hdr.format
                )));
            }
            hdr.pipe = false;
            hdr.pipesize = 0;
            hdr.size = samples.len() / spa;
        }
        Payload::Pipe { capacity_bytes } => {
            hdr.pipe = true;
            hdr.pipesize = i32::try_from(capacity_bytes).map_err(|_| {
                SignalError::InvalidHeader(format!("pipe size {} too large", capacity_bytes))
            })?;
            hdr.size = 0;
        }
    }

    match class {
        DataClass::Vector => {
            hdr.subsize = 0;
            hdr.ystart = 0.0;
            hdr.ydelta = 0.0;
            hdr.yunits = 0;
        }
        DataClass::Matrix => {
            let subsize = overrides
                .subsize
                .or(if base.subsize > 0 { Some(base.subsize) } else { None })
                .unwrap_or(hdr.size);
            if subsize == 0 {
                return Err(SignalError::InvalidHeader(
                    "matrix data needs a non-zero subsize".to_string(),
                ));
            }
            if hdr.size % subsize != 0 {
                return Err(SignalError::InvalidHeader(format!(
                    "{} atoms are not a whole number of {}-atom rows",
                    hdr.size, subsize
                )));
            }
            hdr.subsize = subsize;
            hdr.ystart = overrides.ystart.unwrap_or(base.ystart);
            hdr.ydelta = overrides.ydelta.unwrap_or(if base.ydelta != 0.0 {
                base.ydelta
            } else {
                1.0
            });
            hdr.yunits = overrides.yunits.unwrap_or(base.yunits);
        }
    }

    hdr.data_size = hdr.size as f64 * hdr.format.bytes_per_atom();
    Ok(hdr)
}
