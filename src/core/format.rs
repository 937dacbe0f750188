// Data structures for signal file headers

use crate::core::constants::{self, UNITS};
use crate::core::error::{Result, SignalError};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order named by a representation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn from_tag(tag: &[u8]) -> Result<Self> {
        if tag == constants::REP_LITTLE {
            Ok(Endian::Little)
        } else if tag == constants::REP_BIG {
            Ok(Endian::Big)
        } else {
            Err(SignalError::UnknownRepresentation(
                String::from_utf8_lossy(tag).into_owned(),
            ))
        }
    }

    pub fn tag(self) -> &'static [u8; 4] {
        match self {
            Endian::Little => constants::REP_LITTLE,
            Endian::Big => constants::REP_BIG,
        }
    }

    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

/// Scalar encoding named by the second character of a format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    PackedBit,
    Ascii,
    UnsignedByte,
    Byte,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl ScalarType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'P' => ScalarType::PackedBit,
            b'A' => ScalarType::Ascii,
            b'O' => ScalarType::UnsignedByte,
            b'B' => ScalarType::Byte,
            b'I' => ScalarType::Int16,
            b'L' => ScalarType::Int32,
            b'X' => ScalarType::Int64,
            b'F' => ScalarType::Float32,
            b'D' => ScalarType::Float64,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            ScalarType::PackedBit => b'P',
            ScalarType::Ascii => b'A',
            ScalarType::UnsignedByte => b'O',
            ScalarType::Byte => b'B',
            ScalarType::Int16 => b'I',
            ScalarType::Int32 => b'L',
            ScalarType::Int64 => b'X',
            ScalarType::Float32 => b'F',
            ScalarType::Float64 => b'D',
        }
    }

    pub fn bits(self) -> usize {
        // from_code/code are inverse, so the table always has an entry
        constants::scalar_bits(self.code()).unwrap_or(8)
    }

    /// Bytes per scalar; 0.125 for packed bits.
    pub fn byte_size(self) -> f64 {
        self.bits() as f64 / 8.0
    }
}

/// Two-character format code, e.g. `SF` (real f32) or `CI` (complex i16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatCode([u8; 2]);

impl FormatCode {
    /// Real 32-bit float, the default for new headers.
    pub const SF: FormatCode = FormatCode(*b"SF");

    pub fn new(code: &str) -> Result<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 2 {
            return Err(SignalError::UnknownFormat(code.to_string()));
        }
        Self::from_bytes([bytes[0], bytes[1]])
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Result<Self> {
        let known = constants::scalars_per_atom(bytes[0]).is_some()
            && constants::scalar_bits(bytes[1]).is_some();
        if !known {
            return Err(SignalError::UnknownFormat(
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }
        Ok(FormatCode(bytes))
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.0
    }

    pub fn is_complex(&self) -> bool {
        self.0[0] == b'C'
    }

    pub fn scalars_per_atom(&self) -> usize {
        constants::scalars_per_atom(self.0[0]).unwrap_or(1)
    }

    pub fn scalar_type(&self) -> ScalarType {
        ScalarType::from_code(self.0[1]).unwrap_or(ScalarType::UnsignedByte)
    }

    pub fn bits_per_atom(&self) -> usize {
        self.scalars_per_atom() * self.scalar_type().bits()
    }

    pub fn bytes_per_atom(&self) -> f64 {
        self.bits_per_atom() as f64 / 8.0
    }
}

impl fmt::Display for FormatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

impl TryFrom<String> for FormatCode {
    type Error = SignalError;

    fn try_from(value: String) -> Result<Self> {
        FormatCode::new(&value)
    }
}

impl From<FormatCode> for String {
    fn from(code: FormatCode) -> Self {
        code.to_string()
    }
}

/// Rank of the payload: vectors (type 1000) or framed matrices (type 2000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataClass {
    Vector,
    Matrix,
}

impl DataClass {
    pub fn from_type_code(type_code: i32) -> Result<Self> {
        match type_code / 1000 {
            1 => Ok(DataClass::Vector),
            2 => Ok(DataClass::Matrix),
            _ => Err(SignalError::InvalidHeader(format!(
                "unsupported type code {}",
                type_code
            ))),
        }
    }

    pub fn type_code(self) -> i32 {
        match self {
            DataClass::Vector => 1000,
            DataClass::Matrix => 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalHeader {
    pub version: String,
    pub head_rep: Endian,
    pub data_rep: Endian,
    pub detached: i32,
    pub protected: i32,
    pub pipe: bool,
    pub ext_start: i32,
    pub ext_size: i32,
    pub data_start: f64,
    pub data_size: f64,
    pub type_code: i32,
    pub format: FormatCode,
    pub flagmask: i16,
    pub timecode: f64,
    pub pipesize: i32,
    pub keywords: Vec<(String, String)>,
    pub xstart: f64,
    pub xdelta: f64,
    pub xunits: i32,
    pub subsize: usize,
    pub ystart: f64,
    pub ydelta: f64,
    pub yunits: i32,
    /// Atoms in the payload (frames * subsize for matrices).
    pub size: usize,
}

impl SignalHeader {
    pub fn class(&self) -> DataClass {
        if self.type_code / 1000 == 2 {
            DataClass::Matrix
        } else {
            DataClass::Vector
        }
    }

    pub fn rows(&self) -> usize {
        match self.class() {
            DataClass::Vector => 1,
            DataClass::Matrix if self.subsize > 0 => self.size / self.subsize,
            DataClass::Matrix => 0,
        }
    }

    /// Atoms per row: the frame size for matrices, the whole payload for vectors.
    pub fn row_atoms(&self) -> usize {
        match self.class() {
            DataClass::Vector => self.size,
            DataClass::Matrix => self.subsize,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.format.is_complex()
    }

    pub fn bytes_per_atom(&self) -> f64 {
        self.format.bytes_per_atom()
    }

    /// Payload byte offset of the first atom.
    pub fn data_offset(&self) -> usize {
        self.data_start.max(0.0) as usize
    }

    /// Payload length in whole bytes, rounding packed bits up. Saturates
    /// rather than wrapping for absurd sizes.
    pub fn data_len(&self) -> usize {
        self.size
            .saturating_mul(self.format.bits_per_atom())
            .div_ceil(8)
    }

    /// Abscissa of atom `index` (column index for matrices).
    pub fn x_at(&self, index: f64) -> f64 {
        self.xstart + index * self.xdelta
    }

    /// Ordinate of row `row` for matrices.
    pub fn y_at(&self, row: f64) -> f64 {
        self.ystart + row * self.ydelta
    }

    /// Abscissa range spanned by the payload, in ascending order.
    pub fn x_domain(&self) -> (f64, f64) {
        let n = self.row_atoms().saturating_sub(1) as f64;
        let a = self.xstart;
        let b = self.x_at(n);
        (a.min(b), a.max(b))
    }

    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Timecode as a UTC instant; the timecode counts seconds from 1950-01-01.
    pub fn timecode_datetime(&self) -> Option<DateTime<Utc>> {
        let epoch = j1950_epoch()?;
        let micros = (self.timecode * 1e6).round();
        if !micros.is_finite() {
            return None;
        }
        epoch.checked_add_signed(Duration::microseconds(micros as i64))
    }

    pub fn set_timecode(&mut self, at: DateTime<Utc>) {
        if let Some(epoch) = j1950_epoch() {
            let delta = at.signed_duration_since(epoch);
            self.timecode = delta.num_microseconds().unwrap_or(0) as f64 / 1e6;
        }
    }

    pub fn xunits_label(&self) -> (&'static str, &'static str) {
        units_label(self.xunits)
    }

    pub fn yunits_label(&self) -> (&'static str, &'static str) {
        units_label(self.yunits)
    }
}

fn j1950_epoch() -> Option<DateTime<Utc>> {
    Some(NaiveDate::from_ymd_opt(1950, 1, 1)?.and_hms_opt(0, 0, 0)?.and_utc())
}

pub fn units_label(code: i32) -> (&'static str, &'static str) {
    usize::try_from(code)
        .ok()
        .and_then(|i| UNITS.get(i))
        .copied()
        .unwrap_or(UNITS[0])
}
