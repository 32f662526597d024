//! Interface de terminal do typeforge: barras de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para as barras de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente um job
//! de geração ou uma rodada de regeneração.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::api::FontWeight;
use crate::assets::{FontHandle, LoadState, LoaderSnapshot};
use crate::inventory::Inventory;
use crate::notify::{Level, Notification};
use crate::poller::{PollOutcome, ProgressSnapshot};
use crate::regeneration::{RegenOutcome, RegenerationReport};

/// Barra de progresso de 0 a 100 para a execução de um job no terminal.
///
/// Exibe a porcentagem suavizada e a última mensagem do servidor; o
/// resultado final aparece em verde (sucesso) ou vermelho (falha).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia a barra com a descrição informada.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a barra a partir de um snapshot do poller.
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        self.pb.set_position(u64::from(snapshot.displayed));
        let message = snapshot
            .message
            .clone()
            .unwrap_or_else(|| snapshot.state.to_string());
        self.pb.set_message(message);
    }

    /// Atualiza apenas a porcentagem (progresso sintético da regeneração).
    pub fn set_percent(&self, percent: u8) {
        self.pb.set_position(u64::from(percent));
    }

    /// Remove a barra sem imprimir resultado.
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }

    /// Finaliza a barra e exibe o resultado do polling.
    pub fn finish_poll(&self, outcome: &PollOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            PollOutcome::Completed(job) => {
                println!("  {} Job {} completed", self.green.apply_to("✓"), job.id);
            }
            PollOutcome::Failed(job) => {
                let reason = job.message.as_deref().unwrap_or("no details");
                println!("  {} Job {} failed: {reason}", self.red.apply_to("✗"), job.id);
            }
            PollOutcome::Cancelled => {
                println!("  {} Polling cancelled", self.yellow.apply_to("↻"));
            }
            PollOutcome::Superseded => {
                println!("  {} Another job was selected", self.yellow.apply_to("↻"));
            }
        }
    }

    /// Finaliza a barra e exibe o resultado de uma rodada de regeneração.
    pub fn finish_regeneration(&self, report: &RegenerationReport) {
        self.pb.finish_and_clear();
        let chars: String = report.characters.iter().collect();
        let secs = report.elapsed.as_secs();
        match report.outcome {
            RegenOutcome::Completed => {
                println!("  {} Regenerated {chars} in {secs}s", self.green.apply_to("✓"));
            }
            RegenOutcome::Failed => {
                println!("  {} Regeneration of {chars} failed", self.red.apply_to("✗"));
            }
            RegenOutcome::TimedOut => {
                println!("  {} Regeneration timed out after {secs}s", self.red.apply_to("✗"));
            }
            RegenOutcome::Pending => {
                println!("  {} Regeneration abandoned", self.yellow.apply_to("↻"));
            }
        }
    }
}

/// Formata uma notificação com a cor do seu nível.
pub fn format_notification(notification: &Notification) -> String {
    let (style, icon) = match notification.level {
        Level::Info => (Style::new().cyan(), "i"),
        Level::Success => (Style::new().green().bold(), "✓"),
        Level::Warning => (Style::new().yellow(), "!"),
        Level::Error => (Style::new().red().bold(), "✗"),
    };
    if notification.body.is_empty() {
        format!("  {} {}", style.apply_to(icon), notification.title)
    } else {
        format!(
            "  {} {}: {}",
            style.apply_to(icon),
            style.apply_to(&notification.title),
            notification.body
        )
    }
}

/// Imprime o inventário agrupado em faltantes, marcados e regulares.
pub fn print_inventory(inventory: &Inventory) {
    let red = Style::new().red().bold();
    let yellow = Style::new().yellow();
    let green = Style::new().green();

    let missing = inventory.missing();
    let flagged = inventory.flagged();
    let regular = inventory.regular();

    println!(
        "{} glyphs: {} missing, {} flagged, {} ok, {} selected",
        inventory.len(),
        red.apply_to(missing.len()),
        yellow.apply_to(flagged.len()),
        green.apply_to(regular.len()),
        inventory.selected_count()
    );
    for record in missing.iter().chain(flagged.iter()) {
        let marker = if record.selected { "[x]" } else { "[ ]" };
        let style = if record.is_available { &yellow } else { &red };
        println!(
            "  {marker} {} U+{}",
            style.apply_to(record.character),
            record.code_point
        );
    }
    let line: String = regular.iter().map(|r| r.character).collect();
    if !line.is_empty() {
        println!("  {}", green.apply_to(line));
    }
}

/// Imprime o estado de cada peso e a face efetivamente usada.
pub fn print_weights(snapshot: &LoaderSnapshot, target: FontWeight, face: &FontHandle) {
    let green = Style::new().green();
    let red = Style::new().red();
    let dim = Style::new().dim();

    println!(
        "{} of {} weights loaded",
        snapshot.loaded_count(),
        FontWeight::ALL.len()
    );
    for weight in FontWeight::ALL {
        let state = match snapshot.state(weight) {
            LoadState::Loaded(_) => green.apply_to("loaded").to_string(),
            LoadState::Failed => red.apply_to("failed").to_string(),
            LoadState::Loading => dim.apply_to("loading").to_string(),
            LoadState::NotRequested => dim.apply_to("-").to_string(),
        };
        println!("  {weight:>3}  {state}");
    }
    match face.weight() {
        Some(weight) if weight == target => println!("Preview {target}: {}", face.family()),
        Some(weight) => println!(
            "Preview {target}: {} (nearest loaded weight {weight})",
            face.family()
        ),
        None => println!("Preview {target}: {} (no weight loaded)", face.family()),
    }
}
