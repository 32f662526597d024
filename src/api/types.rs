//! Tipos de dados trocados com o serviço remoto de geração de fontes.
//!
//! As structs de resposta derivam `Serialize` e `Deserialize` conforme o
//! formato JSON dos endpoints `job-status`, `regenerate-missing-glyphs` e
//! dos endpoints de criação de job. [`FontWeight`] e [`FontFormat`] compõem
//! o segmento `{peso}-{formato}` das URLs de download.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Marcador em `available_formats` indicando que a lista de glifos ausentes
/// já pode ser baixada.
pub const MISSING_GLYPHS_MARKER: &str = "missing-glyphs";

/// Resposta do endpoint `GET /job-status/{job_id}`.
///
/// O backend historicamente envia a mensagem como `info-message`; ambas as
/// grafias são aceitas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Estado bruto: "processing", "completed" ou "failed".
    pub status: String,
    /// Mensagem legível descrevendo a etapa atual.
    #[serde(default, alias = "info-message", skip_serializing_if = "Option::is_none")]
    pub info_message: Option<String>,
    /// Marcadores de etapa alcançados até agora. `None` quando o campo não veio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_formats: Option<Vec<String>>,
}

impl JobStatusResponse {
    /// Indica se o servidor já publicou a lista de glifos ausentes.
    pub fn has_missing_glyphs(&self) -> bool {
        self.available_formats
            .as_deref()
            .is_some_and(|formats| formats.iter().any(|f| f == MISSING_GLYPHS_MARKER))
    }
}

/// Resposta do endpoint `POST /regenerate-missing-glyphs/{job_id}`.
///
/// O backend responde HTTP 200 mesmo quando rejeita o pedido, preenchendo
/// `error` no corpo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resposta dos endpoints de criação de job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Origem de um novo job: descrição textual ou imagem de referência.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Prompt(String),
    Image { file_name: String, bytes: Vec<u8> },
}

/// Peso de fonte suportado: 100 a 900 em passos de 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct FontWeight(u16);

impl FontWeight {
    pub const THIN: Self = Self(100);
    pub const REGULAR: Self = Self(400);
    pub const MEDIUM: Self = Self(500);
    pub const BOLD: Self = Self(700);
    pub const BLACK: Self = Self(900);

    /// Todos os pesos suportados, em ordem crescente.
    pub const ALL: [FontWeight; 9] = [
        Self(100),
        Self(200),
        Self(300),
        Self(400),
        Self(500),
        Self(600),
        Self(700),
        Self(800),
        Self(900),
    ];

    /// Retorna `Some` apenas para valores exatos entre 100 e 900, múltiplos de 100.
    pub fn new(value: u16) -> Option<Self> {
        if (100..=900).contains(&value) && value % 100 == 0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Arredonda um valor arbitrário (por exemplo, vindo de um slider) para
    /// o peso suportado mais próximo.
    pub fn nearest(value: u16) -> Self {
        let rounded = (u32::from(value) + 50) / 100 * 100;
        Self(rounded.clamp(100, 900) as u16)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Posição do peso em um array de nove slots (`peso / 100 - 1`).
    pub fn index(self) -> usize {
        usize::from(self.0 / 100 - 1)
    }

    /// Distância absoluta entre dois pesos.
    pub fn distance(self, other: FontWeight) -> u16 {
        self.0.abs_diff(other.0)
    }
}

impl Default for FontWeight {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl TryFrom<u16> for FontWeight {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!("invalid font weight {value}: must be 100..=900 in steps of 100")
        })
    }
}

impl From<FontWeight> for u16 {
    fn from(weight: FontWeight) -> Self {
        weight.0
    }
}

impl FromStr for FontWeight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u16 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid font weight: {s}"))?;
        Self::try_from(value)
    }
}

impl fmt::Display for FontWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Formato de arquivo de fonte servido pelo backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFormat {
    Ttf,
    Otf,
    #[default]
    Woff2,
}

impl FontFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            FontFormat::Ttf => "ttf",
            FontFormat::Otf => "otf",
            FontFormat::Woff2 => "woff2",
        }
    }

    /// Segmento de caminho `{peso}-{formato}`, por exemplo `500-woff2`.
    pub fn asset_name(self, weight: FontWeight) -> String {
        format!("{weight}-{}", self.as_str())
    }
}

impl FromStr for FontFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ttf" => Ok(FontFormat::Ttf),
            "otf" => Ok(FontFormat::Otf),
            "woff2" => Ok(FontFormat::Woff2),
            other => Err(format!("invalid font format '{other}': use ttf, otf or woff2")),
        }
    }
}

impl fmt::Display for FontFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
