use std::env;

use anyhow::{bail, Context};

pub const DEFAULT_GREEN_THRESHOLD: f64 = 85.0;
pub const DEFAULT_AMBER_THRESHOLD: f64 = 60.0;
pub const DEFAULT_CERTIFICATION_CUTOFF: f64 = 75.0;

/// Cutoffs shared by every status computation.
///
/// A reading at or above `green` is on track, at or above `amber` needs
/// attention, anything lower is critical. `certification` is the composite
/// GFC score needed for the 3-star tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringThresholds {
    pub green: f64,
    pub amber: f64,
    pub certification: f64,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            green: DEFAULT_GREEN_THRESHOLD,
            amber: DEFAULT_AMBER_THRESHOLD,
            certification: DEFAULT_CERTIFICATION_CUTOFF,
        }
    }
}

impl ScoringThresholds {
    pub fn from_env() -> anyhow::Result<Self> {
        let thresholds = Self {
            green: read_threshold("SANITATION_GREEN_THRESHOLD", DEFAULT_GREEN_THRESHOLD)?,
            amber: read_threshold("SANITATION_AMBER_THRESHOLD", DEFAULT_AMBER_THRESHOLD)?,
            certification: read_threshold(
                "GFC_CERTIFICATION_CUTOFF",
                DEFAULT_CERTIFICATION_CUTOFF,
            )?,
        };

        if let Err(errors) = thresholds.validate() {
            bail!("invalid scoring thresholds: {}", errors.join("; "));
        }

        Ok(thresholds)
    }

    /// Returns every problem at once rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("green", self.green),
            ("amber", self.amber),
            ("certification", self.certification),
        ] {
            if !value.is_finite() {
                errors.push(format!("thresholds.{name}: must be a finite number"));
            } else if !(0.0..=100.0).contains(&value) {
                errors.push(format!("thresholds.{name}: {value} is outside 0-100"));
            }
        }

        if self.amber > self.green {
            errors.push(format!(
                "thresholds.amber: {} must not exceed green ({})",
                self.amber, self.green
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn read_threshold(key: &str, default: f64) -> anyhow::Result<f64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub thresholds: ScoringThresholds,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let log_level = env::var("SANITATION_LOG").unwrap_or_else(|_| "info".to_string());
        let thresholds = ScoringThresholds::from_env()?;

        Ok(Self {
            database_url,
            log_level,
            thresholds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("SANITATION_GREEN_THRESHOLD");
        env::remove_var("SANITATION_AMBER_THRESHOLD");
        env::remove_var("GFC_CERTIFICATION_CUTOFF");
    }

    #[test]
    fn defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let thresholds = ScoringThresholds::from_env().expect("defaults load");
        assert_eq!(thresholds, ScoringThresholds::default());
        assert_eq!(thresholds.green, 85.0);
        assert_eq!(thresholds.amber, 60.0);
        assert_eq!(thresholds.certification, 75.0);
    }

    #[test]
    fn env_overrides_thresholds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SANITATION_GREEN_THRESHOLD", "80");
        env::set_var("SANITATION_AMBER_THRESHOLD", " 50 ");
        let thresholds = ScoringThresholds::from_env().expect("overrides load");
        reset_env();
        assert_eq!(thresholds.green, 80.0);
        assert_eq!(thresholds.amber, 50.0);
        assert_eq!(thresholds.certification, 75.0);
    }

    #[test]
    fn rejects_non_numeric_threshold() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GFC_CERTIFICATION_CUTOFF", "three stars");
        let result = ScoringThresholds::from_env();
        reset_env();
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("GFC_CERTIFICATION_CUTOFF"));
    }

    #[test]
    fn rejects_amber_above_green() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SANITATION_AMBER_THRESHOLD", "90");
        let result = ScoringThresholds::from_env();
        reset_env();
        assert!(result.unwrap_err().to_string().contains("must not exceed green"));
    }

    #[test]
    fn validate_collects_every_error() {
        let thresholds = ScoringThresholds {
            green: 120.0,
            amber: f64::NAN,
            certification: -1.0,
        };
        let errors = thresholds.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("thresholds.green"));
        assert!(errors[1].contains("thresholds.amber"));
        assert!(errors[2].contains("thresholds.certification"));
    }

    #[test]
    fn default_thresholds_are_valid() {
        assert!(ScoringThresholds::default().validate().is_ok());
    }
}
