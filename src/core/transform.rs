// Complex-to-real projection modes

use crate::core::constants::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseUnits {
    #[default]
    Radians,
    Degrees,
    Cycles,
}

/// Multiplier applied to `log10`: 10 for power, 20 for amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogScale {
    Ten,
    Twenty,
}

impl LogScale {
    pub fn factor(self) -> f64 {
        match self {
            LogScale::Ten => 10.0,
            LogScale::Twenty => 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Magnitude,
    Phase(PhaseUnits),
    #[default]
    Real,
    Imaginary,
    /// Plot the real part against the imaginary part.
    RealVsImaginary,
    Log10(LogScale),
}

impl Mode {
    /// The abscissa comes from the sample rather than its index.
    pub fn projects_abscissa(self) -> bool {
        matches!(self, Mode::RealVsImaginary)
    }

    /// Unit code of the projected ordinate, or `None` to keep the file's.
    pub fn y_units(self) -> Option<i32> {
        match self {
            Mode::Magnitude => Some(UNITS_MAGNITUDE),
            Mode::Phase(PhaseUnits::Radians) => Some(UNITS_PHASE_RAD),
            Mode::Phase(PhaseUnits::Degrees) => Some(UNITS_PHASE_DEG),
            Mode::Phase(PhaseUnits::Cycles) => Some(UNITS_PHASE_CYCLES),
            Mode::Real => None,
            Mode::Imaginary | Mode::RealVsImaginary => Some(UNITS_IMAGINARY),
            Mode::Log10(LogScale::Ten) => Some(UNITS_LOG10),
            Mode::Log10(LogScale::Twenty) => Some(UNITS_LOG20),
        }
    }

    /// Unit code of the projected abscissa for `RealVsImaginary`.
    pub fn x_units(self) -> Option<i32> {
        match self {
            Mode::RealVsImaginary => Some(UNITS_REAL),
            _ => None,
        }
    }
}

/// Project one sample to the plotted ordinate. Real data passes `im = 0`.
/// For `RealVsImaginary` this is the imaginary part; the abscissa is `re`.
pub fn project(mode: Mode, re: f64, im: f64, log_floor: f64) -> f64 {
    match mode {
        Mode::Magnitude => re.hypot(im),
        Mode::Phase(units) => {
            let phase = im.atan2(re);
            match units {
                PhaseUnits::Radians => phase,
                PhaseUnits::Degrees => phase.to_degrees(),
                PhaseUnits::Cycles => phase / (2.0 * PI),
            }
        }
        Mode::Real => re,
        Mode::Imaginary | Mode::RealVsImaginary => im,
        Mode::Log10(scale) => {
            let mag = re.hypot(im);
            // NaN fails the comparison and propagates
            let floored = if mag < log_floor { log_floor } else { mag };
            scale.factor() * floored.log10()
        }
    }
}
