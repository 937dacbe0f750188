// Format constants for signal files

pub const VERSION_TAG: &[u8; 4] = b"BLUE";

// Representation tags: header/payload endianness
pub const REP_LITTLE: &[u8; 4] = b"EEEI";
pub const REP_BIG: &[u8; 4] = b"IEEE";

// Fixed prologue, also the block size for the extended header location
pub const HEADER_SIZE: usize = 512;
pub const BLOCK_SIZE: usize = 512;

// Prologue field offsets
pub const OFF_VERSION: usize = 0;
pub const OFF_HEAD_REP: usize = 4;
pub const OFF_DATA_REP: usize = 8;
pub const OFF_DETACHED: usize = 12;
pub const OFF_PROTECTED: usize = 16;
pub const OFF_PIPE: usize = 20;
pub const OFF_EXT_START: usize = 24;
pub const OFF_EXT_SIZE: usize = 28;
pub const OFF_DATA_START: usize = 32;
pub const OFF_DATA_SIZE: usize = 40;
pub const OFF_TYPE: usize = 48;
pub const OFF_FORMAT: usize = 52;
pub const OFF_FLAGMASK: usize = 54;
pub const OFF_TIMECODE: usize = 56;
pub const OFF_PIPESIZE: usize = 76;
pub const OFF_IN_BYTE: usize = 80;
pub const OFF_OUT_BYTE: usize = 88;
pub const OFF_KEYLENGTH: usize = 160;
pub const OFF_KEYWORDS: usize = 164;
pub const KEYWORDS_LEN: usize = 92;
pub const OFF_ADJUNCT: usize = 256;

// Adjunct offsets (absolute)
pub const OFF_XSTART: usize = 256;
pub const OFF_XDELTA: usize = 264;
pub const OFF_XUNITS: usize = 272;
pub const OFF_SUBSIZE: usize = 276;
pub const OFF_YSTART: usize = 280;
pub const OFF_YDELTA: usize = 288;
pub const OFF_YUNITS: usize = 296;

// Extended header keyword record prefix: lkey(i32) lextra(i16) ltag(i8) type(u8)
pub const KEYWORD_PREFIX_SIZE: usize = 8;

// Working-set and projection defaults
pub const DEFAULT_BUFMAX: usize = 32768;
pub const DEFAULT_LOG_FLOOR: f64 = 1e-20;

/// Bits per scalar for the second character of a format code.
pub fn scalar_bits(code: u8) -> Option<usize> {
    match code {
        b'P' => Some(1),
        b'A' | b'O' | b'B' => Some(8),
        b'I' => Some(16),
        b'L' | b'F' => Some(32),
        b'X' | b'D' => Some(64),
        _ => None,
    }
}

/// Scalars per atom for the first character of a format code.
pub fn scalars_per_atom(code: u8) -> Option<usize> {
    match code {
        b'C' => Some(2),
        b'1'..=b'9' => Some((code - b'0') as usize),
        c if c.is_ascii_alphabetic() => Some(1),
        _ => None,
    }
}

// Unit codes: (name, abbreviation)
pub const UNITS: [(&str, &str); 29] = [
    ("None", "U"),
    ("Time", "sec"),
    ("Delay", "sec"),
    ("Frequency", "Hz"),
    ("Time code format", ""),
    ("Distance", "m"),
    ("Speed", "m/s"),
    ("Acceleration", "m/sec^2"),
    ("Jerk", "m/sec^3"),
    ("Doppler", "Hz"),
    ("Doppler rate", "Hz/sec"),
    ("Energy", "J"),
    ("Power", "W"),
    ("Mass", "g"),
    ("Volume", "l"),
    ("Angular power density", "W/ster"),
    ("Integrated power density", "W/rad"),
    ("Spatial power density", "W/m^2"),
    ("Integrated power density", "W/m"),
    ("Spectral power density", "W/MHz"),
    ("Amplitude", "U"),
    ("Real", "U"),
    ("Imaginary", "U"),
    ("Phase", "rad"),
    ("Phase", "deg"),
    ("Phase", "cycles"),
    ("10*Log", "U"),
    ("20*Log", "U"),
    ("Magnitude", "U"),
];

pub const UNITS_REAL: i32 = 21;
pub const UNITS_IMAGINARY: i32 = 22;
pub const UNITS_PHASE_RAD: i32 = 23;
pub const UNITS_PHASE_DEG: i32 = 24;
pub const UNITS_PHASE_CYCLES: i32 = 25;
pub const UNITS_LOG10: i32 = 26;
pub const UNITS_LOG20: i32 = 27;
pub const UNITS_MAGNITUDE: i32 = 28;
