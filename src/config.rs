//! Configuração do typeforge carregada a partir de `typeforge.toml`.
//!
//! A struct [`TypeforgeConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `TYPEFORGE_API_URL` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::api::{DEFAULT_API_URL, FontFormat, FontWeight};
use crate::error::TypeforgeError;
use crate::inventory::Alphabet;
use crate::state_machine::RetryConfig;

pub const CONFIG_FILE: &str = "typeforge.toml";
pub const API_URL_ENV: &str = "TYPEFORGE_API_URL";

/// Configuração de nível superior carregada de `typeforge.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeforgeConfig {
    /// URL base do serviço de geração.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout de conexão em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout total de cada requisição em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Intervalo de polling do status do job em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Intervalo de polling durante uma regeneração em milissegundos.
    #[serde(default = "default_regen_poll_interval_ms")]
    pub regen_poll_interval_ms: u64,

    /// Tempo máximo de uma regeneração em segundos.
    #[serde(default = "default_regen_timeout_secs")]
    pub regen_timeout_secs: u64,

    /// Espera antes de reconciliar o inventário após uma regeneração.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Peso carregado primeiro e retentado em caso de falha.
    #[serde(default)]
    pub primary_weight: FontWeight,

    /// Formato dos arquivos de fonte baixados.
    #[serde(default)]
    pub font_format: FontFormat,

    /// Tentativas para o peso primário, incluindo a primeira.
    #[serde(default = "default_primary_attempts")]
    pub primary_attempts: u32,

    /// Atraso fixo entre tentativas do peso primário em milissegundos.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Alfabeto base. Ausente usa A–Z, a–z, 0–9 e `.,!?@#$%&`.
    #[serde(default)]
    pub alphabet: Option<String>,

    /// Arquivo JSON do estado local.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Constantes heurísticas de progresso.
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Constantes heurísticas de progresso. Nenhuma delas é usada para decidir
/// o estado do job; servem apenas para exibição.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Valor inicial enquanto nenhuma etapa foi alcançada.
    pub initial: u8,
    /// Crédito por etapa alcançada.
    pub stage_credit: u8,
    /// Teto enquanto o job não terminou.
    pub in_flight_cap: u8,
    /// Incremento por tick quando o servidor não envia marcadores.
    pub fallback_step: u8,
    /// Passo da suavização exibida.
    pub smoothing_step: u8,
    /// Intervalo da suavização em milissegundos.
    pub smoothing_interval_ms: u64,
    /// Valor inicial da barra de regeneração.
    pub regen_start: u8,
    /// Incremento por tick da regeneração.
    pub regen_step: u8,
    /// Teto da barra de regeneração antes do término.
    pub regen_cap: u8,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            initial: 10,
            stage_credit: 20,
            in_flight_cap: 90,
            fallback_step: 5,
            smoothing_step: 1,
            smoothing_interval_ms: 50,
            regen_start: 10,
            regen_step: 2,
            regen_cap: 95,
        }
    }
}

impl ProgressConfig {
    /// Teto efetivo, sempre abaixo de 100.
    pub fn in_flight_cap(&self) -> u8 {
        self.in_flight_cap.min(99)
    }

    pub fn smoothing_interval(&self) -> Duration {
        Duration::from_millis(self.smoothing_interval_ms.max(1))
    }
}

// Valor padrão da URL base: servidor local.
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

// Valor padrão do timeout de conexão: 10s.
fn default_connect_timeout_secs() -> u64 {
    10
}

// Valor padrão do timeout de requisição: 120s.
fn default_request_timeout_secs() -> u64 {
    120
}

// Valor padrão do polling de status: 2000ms.
fn default_poll_interval_ms() -> u64 {
    2000
}

// Valor padrão do polling de regeneração: 3000ms.
fn default_regen_poll_interval_ms() -> u64 {
    3000
}

// Valor padrão do tempo máximo de regeneração: 10 minutos.
fn default_regen_timeout_secs() -> u64 {
    600
}

// Valor padrão da espera pós-regeneração: 2000ms.
fn default_settle_delay_ms() -> u64 {
    2000
}

// Valor padrão de tentativas do peso primário: 3.
fn default_primary_attempts() -> u32 {
    3
}

// Valor padrão do atraso entre tentativas: 1000ms.
fn default_retry_delay_ms() -> u64 {
    1000
}

// Valor padrão do arquivo de estado.
fn default_state_file() -> PathBuf {
    PathBuf::from(".typeforge/state.json")
}

impl Default for TypeforgeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            regen_poll_interval_ms: default_regen_poll_interval_ms(),
            regen_timeout_secs: default_regen_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            primary_weight: FontWeight::default(),
            font_format: FontFormat::default(),
            primary_attempts: default_primary_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            alphabet: None,
            state_file: default_state_file(),
            progress: ProgressConfig::default(),
        }
    }
}

impl TypeforgeConfig {
    /// Carrega a configuração de `typeforge.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, TypeforgeError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito.
    pub fn load_from(path: &Path) -> Result<Self, TypeforgeError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<TypeforgeConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para a URL.
        if let Ok(url) = std::env::var(API_URL_ENV)
            && !url.is_empty()
        {
            config.api_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejeita combinações que tornariam os loops de polling inválidos.
    pub fn validate(&self) -> Result<(), TypeforgeError> {
        if self.api_url.trim().is_empty() {
            return Err(TypeforgeError::Config("api_url must not be empty".into()));
        }
        if self.poll_interval_ms == 0 || self.regen_poll_interval_ms == 0 {
            return Err(TypeforgeError::Config(
                "poll intervals must be greater than zero".into(),
            ));
        }
        if self.alphabet.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(TypeforgeError::Config("alphabet must not be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn regen_poll_interval(&self) -> Duration {
        Duration::from_millis(self.regen_poll_interval_ms)
    }

    pub fn regen_timeout(&self) -> Duration {
        Duration::from_secs(self.regen_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn primary_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.primary_attempts,
            delay_ms: self.retry_delay_ms,
        }
    }

    /// Alfabeto base efetivo.
    pub fn alphabet(&self) -> Alphabet {
        match &self.alphabet {
            Some(chars) => Alphabet::new(chars.chars().filter(|c| !c.is_whitespace())),
            None => Alphabet::default(),
        }
    }
}
