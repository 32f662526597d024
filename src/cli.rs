//! Interface de linha de comando do typeforge baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (generate, watch,
//! glyphs, weights, regenerate, checkout, status) e flags globais
//! (--api-url, --config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::api::{FontFormat, FontWeight};
use crate::orchestrator::CheckoutOutcome;

/// typeforge: cliente do serviço de geração de fontes.
#[derive(Debug, Parser)]
#[command(name = "typeforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// URL base do serviço (sobrescreve o arquivo de configuração).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Caminho do arquivo de configuração TOML.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria um job de geração a partir de um prompt ou de uma imagem.
    Generate {
        /// Descrição textual da fonte desejada.
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        prompt: Option<String>,

        /// Imagem de referência (PNG ou JPEG).
        #[arg(long)]
        image: Option<PathBuf>,

        /// Não acompanha o job após a criação.
        #[arg(long, default_value_t = false)]
        detach: bool,
    },

    /// Acompanha o progresso de um job até terminar.
    Watch {
        /// Id do job; usa o último job quando omitido.
        job: Option<String>,
    },

    /// Mostra o inventário de glifos do job.
    Glyphs {
        job: Option<String>,

        /// Mostra apenas os caracteres problemáticos deste texto.
        #[arg(long)]
        text: Option<String>,
    },

    /// Carrega os pesos da fonte e mostra qual face seria usada.
    Weights {
        job: Option<String>,

        /// Peso de pré-visualização (100 a 900); padrão: `primary_weight` da configuração.
        #[arg(long)]
        weight: Option<FontWeight>,

        /// Formato dos arquivos baixados.
        #[arg(long)]
        format: Option<FontFormat>,
    },

    /// Regenera os glifos faltantes e os caracteres marcados.
    Regenerate {
        job: Option<String>,

        /// Caracteres disponíveis a marcar para regeneração.
        #[arg(long)]
        flag: Option<String>,

        /// Caracteres faltantes a retirar da seleção.
        #[arg(long)]
        skip: Option<String>,
    },

    /// Registra o retorno do checkout externo.
    Checkout {
        job: String,

        /// success ou cancel.
        outcome: CheckoutOutcome,
    },

    /// Mostra o job atual e as configurações em uso.
    Status,
}
