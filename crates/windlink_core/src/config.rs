//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável; seções ausentes usam os
//! valores padrão.

use crate::connector::EndpointConfig;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Erros de leitura/escrita da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro de serialização: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao salvar {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Porta serial do rádio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Porta serial do XBee
    pub port: String,
    /// Baud rate (deve bater com o configurado no XBee)
    pub baud_rate: u32,
    /// Timeout de leitura da thread de recepção (ms)
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/tty.usbserial-0001".into(),
            baud_rate: 9600,
            read_timeout_ms: 100,
        }
    }
}

/// Política de retry da abertura do dispositivo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Número máximo de tentativas (>= 1)
    pub max_attempts: u32,
    /// Espera entre tentativas (ms)
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 1000,
        }
    }
}

/// Saída das leituras.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Uma linha por leitura, só m/s
    pub compact: bool,
    /// Grava histórico CSV além do console
    pub csv_enabled: bool,
    /// Caminho do histórico CSV
    pub csv_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compact: false,
            csv_enabled: false,
            csv_path: "wind_history.csv".into(),
        }
    }
}

/// Configuração raiz do receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub retry: RetryConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente ou inválido cai nos valores padrão, com aviso.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::try_load(path) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("{e}"),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Como [`load`](Self::load), mas sem fallback.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.serial.port.trim().is_empty() {
            errors.push("Porta serial não pode ser vazia".into());
        }
        if self.serial.baud_rate == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        if self.serial.read_timeout_ms == 0 {
            errors.push("read_timeout_ms não pode ser 0".into());
        }
        if self.retry.max_attempts == 0 {
            errors.push("max_attempts deve ser >= 1".into());
        }
        if self.output.csv_enabled && self.output.csv_path.trim().is_empty() {
            errors.push("csv_path vazio com csv_enabled = true".into());
        }

        errors
    }

    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            port: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
        }
    }

    /// `max_attempts` como `NonZeroU32`; 0 vira 1.
    pub fn max_attempts(&self) -> NonZeroU32 {
        NonZeroU32::new(self.retry.max_attempts).unwrap_or(NonZeroU32::MIN)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry.retry_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn defaults_match_radio_setup() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.max_attempts().get(), 10);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.serial.port, parsed.serial.port);
        assert_eq!(config.retry.max_attempts, parsed.retry.max_attempts);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[serial]
port = "/dev/ttyUSB1"

[retry]
max_attempts = 3
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.retry.max_attempts, 3);
        // Outros campos devem ter valor padrão
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.retry.retry_delay_ms, 1000);
        assert!(!config.output.csv_enabled);
    }

    #[test]
    fn validate_catches_bad_values() {
        let mut config = AppConfig::default();
        config.serial.port = "  ".into();
        config.retry.max_attempts = 0;
        config.serial.read_timeout_ms = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 3, "Erros: {:?}", errors);
        assert!(errors.iter().any(|e| e.contains("read_timeout_ms")));
        assert_eq!(config.max_attempts().get(), 1);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let path = std::env::temp_dir().join("windlink_missing_config_does_not_exist.toml");
        let config = AppConfig::load(&path);
        assert_eq!(config.serial.baud_rate, 9600);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let path = std::env::temp_dir().join(format!("windlink_bad_{}.toml", std::process::id()));
        std::fs::write(&path, "[serial\nport = ").unwrap();
        let result = AppConfig::try_load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
