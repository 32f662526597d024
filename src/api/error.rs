//! Tipos de erro para o cliente HTTP do serviço de fontes.
//!
//! Define [`ApiError`] e a classificação entre falhas transitórias (rede,
//! HTTP 5xx, corpo ilegível), que devem ser retentadas no próximo ciclo, e
//! falhas fatais (o servidor rejeitou o identificador do job).

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com o serviço remoto.
#[derive(Debug, Error)]
pub enum ApiError {
    /// O servidor rejeitou o identificador do job (HTTP 404/400/422 ou
    /// `{"error": "Job not found"}`). Não adianta retentar.
    #[error("job {job_id} was rejected by the server: {message}")]
    InvalidJob { job_id: String, message: String },

    /// Qualquer outro erro HTTP (4xx/5xx) devolvido pelo servidor.
    #[error("API error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// O corpo da resposta não corresponde ao formato esperado.
    #[error("failed to parse API response: {0}")]
    Parse(String),
}

impl ApiError {
    /// Erros fatais encerram o loop de polling; os demais são retentados.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::InvalidJob { .. })
    }

    pub fn is_transient(&self) -> bool {
        !self.is_fatal()
    }
}
