use {
    anyhow::{Context as _, Result, ensure},
    byte_unit::Byte,
    derivative::Derivative,
    reseal_sdk::{DEFAULT_CIPHER, EncryptionKey},
    serde::{Deserialize, Serialize},
    std::{path::Path, time::Duration},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultInjection {
    /// Chance that a single write to a part fails.
    #[serde(default)]
    pub write_failure_probability: f64,
    /// Chance that a single read from the store fails.
    #[serde(default)]
    pub read_failure_probability: f64,
}

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[derivative(Debug = "ignore")]
    pub encryption_key: EncryptionKey,
    #[serde(default = "default_cipher")]
    pub cipher: String,
    #[serde(default = "default_part_size")]
    pub part_size: Byte,
    /// Attempts per part before an upload is abandoned, and consecutive failed
    /// reads without progress before a download is.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_period", with = "humantime_serde")]
    pub retry_period: Duration,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub fault_injection: FaultInjection,
}

fn default_cipher() -> String {
    DEFAULT_CIPHER.into()
}

fn default_part_size() -> Byte {
    Byte::from_u64(8 * 1024 * 1024)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_period() -> Duration {
    Duration::from_secs(2)
}

fn default_log_filter() -> String {
    "info".into()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs_err::read_to_string(path)?;
        let config: Self = json5::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.part_size.as_u64() > 0, "`part_size` must be positive");
        ensure!(self.max_attempts > 0, "`max_attempts` must be positive");
        for (name, probability) in [
            (
                "write_failure_probability",
                self.fault_injection.write_failure_probability,
            ),
            (
                "read_failure_probability",
                self.fault_injection.read_failure_probability,
            ),
        ] {
            ensure!(
                (0.0..1.0).contains(&probability),
                "`{name}` must be at least 0 and less than 1"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test")]
mod tests {
    use super::*;

    const KEY: &str = "qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqo";

    #[test]
    fn defaults() {
        let config: Config = json5::from_str(&format!("{{ encryption_key: '{KEY}' }}")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.cipher, DEFAULT_CIPHER);
        assert_eq!(config.part_size.as_u64(), 8 * 1024 * 1024);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_period, Duration::from_secs(2));
        assert!(!format!("{config:?}").contains(KEY));
    }

    #[test]
    fn full() {
        let config: Config = json5::from_str(&format!(
            "{{
                encryption_key: '{KEY}',
                cipher: 'AES128/CBC/PKCS5Padding',
                part_size: '5 MiB',
                max_attempts: 3,
                retry_period: '150ms',
                log_filter: 'debug',
                fault_injection: {{ write_failure_probability: 0.25 }},
            }}"
        ))
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.part_size.as_u64(), 5 * 1024 * 1024);
        assert_eq!(config.retry_period, Duration::from_millis(150));
        assert!((config.fault_injection.write_failure_probability - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_certain_failure() {
        let config: Config = json5::from_str(&format!(
            "{{ encryption_key: '{KEY}', fault_injection: {{ read_failure_probability: 1 }} }}"
        ))
        .unwrap();
        config.validate().unwrap_err();
    }
}
