use crate::core::error::{Result, SignalError};
use crate::models::plot_config::PlotConfig;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

static CONFIG_CACHE: OnceLock<PlotConfig> = OnceLock::new();

pub fn parse_config(data: &str) -> Result<PlotConfig> {
    let config: PlotConfig = serde_json::from_str(data)?;
    if config.bufmax < 2 {
        return Err(SignalError::Config(format!(
            "bufmax must be at least 2, got {}",
            config.bufmax
        )));
    }
    if config.log_floor.is_nan() || config.log_floor <= 0.0 {
        return Err(SignalError::Config(format!(
            "log_floor must be positive, got {}",
            config.log_floor
        )));
    }
    Ok(config)
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PlotConfig> {
    let data = std::fs::read_to_string(path.as_ref())?;
    parse_config(&data)
}

/// Load `path` into the process-wide cache. Later calls keep the first config.
pub fn init_config<P: AsRef<Path>>(path: P) -> Result<&'static PlotConfig> {
    let config = load_config(path.as_ref())?;
    if CONFIG_CACHE.set(config).is_err() {
        warn!("Config already initialized, ignoring {}", path.as_ref().display());
    } else {
        info!("Config initialized from {}", path.as_ref().display());
    }
    Ok(get_cached_config())
}

/// Cached config, or defaults when `init_config` never ran.
pub fn get_cached_config() -> &'static PlotConfig {
    CONFIG_CACHE.get_or_init(PlotConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plot_config::Decimation;
    use crate::core::transform::{Mode, PhaseUnits};
    use std::io::Write;

    #[test]
    fn test_parse_partial_config() {
        let config = parse_config(r#"{"bufmax": 1024, "decimation": "min_max"}"#).unwrap();
        assert_eq!(config.bufmax, 1024);
        assert_eq!(config.decimation, Decimation::MinMax);
        assert_eq!(config.log_floor, 1e-20);
        assert_eq!(config.history(), 1024);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(parse_config(r#"{"bufmax": 1}"#).is_err());
        assert!(parse_config(r#"{"log_floor": 0.0}"#).is_err());
        assert!(matches!(parse_config("{"), Err(SignalError::Json(_))));
    }

    #[test]
    fn test_load_config_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"autol": 4.0, "mode": {{"phase": "degrees"}}}}"#).unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.autol, 4.0);
        assert_eq!(config.mode, Mode::Phase(PhaseUnits::Degrees));
        assert!(load_config(tmp.path().with_extension("missing")).is_err());
    }
}
