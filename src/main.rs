//! # Improver - Engine de Improve do Toolkit de Testes de UI
//!
//! Este é o **ponto de entrada principal** do improver: dado um teste
//! end-to-end gravado (YAML declarativo de steps de browser), produz
//! uma versão mais robusta do teste mais um relatório de diagnóstico.
//!
//! ## O que este arquivo faz?
//!
//! 1. **Processa argumentos da linha de comando** (CLI) usando `clap`
//! 2. **Inicializa o sistema de telemetria** (tracing + OTEL)
//! 3. **Instala o cancelamento cooperativo** (Ctrl-C)
//! 4. **Roda o pipeline de improve** contra um Chromium headless
//! 5. **Reporta o desfecho** e sai com o exit code certo
//!
//! ## Exemplo de uso:
//!
//! ```bash
//! # Só analisar (relatório, sem mutação)
//! improver improve --file login.yaml
//!
//! # Reparar seletores e inserir assertions validadas
//! improver improve --file login.yaml --apply-selectors \
//!     --apply-assertions --assertion-source snapshot-native \
//!     --assertion-policy balanced
//! ```
//!
//! ## Arquitetura
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           main.rs                                │
//! │  (CLI, telemetria, cancelamento, exit codes)                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//!          ┌──────────────────────┼──────────────────────┐
//!          ▼                      ▼                      ▼
//!    ┌──────────┐          ┌──────────┐           ┌──────────┐
//!    │ loader/  │          │ engine/  │           │ browser/ │
//!    │ (YAML)   │          │ (pipeline│           │ (CDP)    │
//!    │          │          │  improve)│           │          │
//!    └──────────┘          └──────────┘           └──────────┘
//! ```

mod assertions;
mod browser;
mod candidates;
mod cleanup;
mod consent;
mod engine;
mod errors;
mod index_map;
mod limits;
mod loader;
mod locator;
mod protocol;
mod report;
mod scoring;
mod selector_pass;
mod snapshot;
mod telemetry;
mod validation;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use uuid::Uuid;

use engine::{AssertionMode, AssertionSource, CancelFlag, ImproveOptions};
use errors::ImproveError;
use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

// ============================================================================
// DEFINIÇÃO DA CLI
// ============================================================================

/// Estrutura principal da CLI.
#[derive(Parser)]
#[command(name = "improver")]
#[command(about = "Engine de improve do toolkit de testes de UI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Subcomandos disponíveis.
#[derive(Subcommand)]
enum Commands {
    /// Analisa um teste gravado e, opcionalmente, o reescreve.
    Improve {
        /// Caminho do arquivo de teste YAML.
        #[arg(short, long)]
        file: PathBuf,

        /// Troca seletores frágeis pelos candidatos adotados.
        #[arg(long, default_value = "false")]
        apply_selectors: bool,

        /// Insere no YAML as assertions validadas no replay.
        #[arg(long, default_value = "false")]
        apply_assertions: bool,

        /// Geração de candidatos de assertion: none | candidates.
        #[arg(long, default_value = "candidates")]
        assertions: AssertionMode,

        /// Fonte dos candidatos: deterministic | snapshot-native |
        /// snapshot-cli.
        #[arg(long, default_value = "deterministic")]
        assertion_source: AssertionSource,

        /// Perfil de apply: reliable | balanced | aggressive.
        #[arg(long, default_value = "balanced")]
        assertion_policy: assertions::policy::ApplyPolicy,

        /// Caminho do relatório (padrão: ao lado do teste).
        #[arg(long)]
        report: Option<PathBuf>,

        /// Habilita exportação de traces OTEL.
        #[arg(long, default_value = "false")]
        otel: bool,

        /// Endpoint do collector OTEL.
        #[arg(long)]
        otel_endpoint: Option<String>,

        /// Modo silencioso: apenas erros no stderr.
        #[arg(long, short = 's', default_value = "false")]
        silent: bool,

        /// Modo verbose: logs detalhados de cada sondagem.
        #[arg(long, short = 'v', default_value = "false")]
        verbose: bool,

        /// ID de run customizado (UUID). Gerado se ausente.
        #[arg(long)]
        run_id: Option<String>,
    },
}

// ============================================================================
// FUNÇÃO PRINCIPAL
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Improve {
            file,
            apply_selectors,
            apply_assertions,
            assertions,
            assertion_source,
            assertion_policy,
            report,
            otel,
            otel_endpoint,
            silent,
            verbose,
            run_id,
        } => {
            let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());

            // Telemetria: níveis por flag, endpoint por flag/env.
            let mut telemetry_config = TelemetryConfig::from_env();
            telemetry_config.log_level = if silent {
                Level::ERROR
            } else if verbose {
                Level::DEBUG
            } else {
                Level::INFO
            };
            if otel {
                if let Some(endpoint) = otel_endpoint {
                    telemetry_config.otlp_endpoint = Some(endpoint);
                } else if telemetry_config.otlp_endpoint.is_none() {
                    telemetry_config.otlp_endpoint = Some("http://localhost:4317".to_string());
                }
            }
            if let Err(e) = init_telemetry(telemetry_config) {
                if !silent {
                    eprintln!("Warning: falha ao inicializar telemetria: {e}");
                }
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .try_init();
            }

            let options = ImproveOptions {
                test_file: file,
                apply_selectors,
                apply_assertions,
                assertions,
                assertion_source,
                assertion_policy,
                report_path: report,
                run_id,
            };

            let exit_code = run_improve(options, silent).await;
            shutdown_telemetry();
            std::process::exit(exit_code);
        }
    }
}

/// Roda o improve com Ctrl-C ligado ao cancelamento cooperativo.
/// Retorna o exit code (0 sucesso, 1 erro fatal, 130 cancelado).
async fn run_improve(options: ImproveOptions, silent: bool) -> i32 {
    let cancel = CancelFlag::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C recebido; cancelando no próximo ponto seguro");
            cancel_for_signal.cancel();
        }
    });

    match engine::improve(options, cancel).await {
        Ok(outcome) => {
            let summary = &outcome.report.summary;
            if !silent {
                println!(
                    "✅ improve concluído: {} seletor(es) trocado(s), {} assertion(s) aplicada(s), {} step(s) removido(s)",
                    summary.selectors_changed,
                    summary.applied_assertions,
                    summary.runtime_failing_steps_removed + summary.stale_assertions_removed,
                );
                println!("📄 Relatório: {}", outcome.report_path.display());
                if let Some(output) = &outcome.output_path {
                    println!("✍️  Teste reescrito: {}", output.display());
                }
            }
            0
        }
        Err(ImproveError::Cancelled) => {
            if !silent {
                eprintln!("⏹️  run cancelado; nenhuma escrita parcial");
            }
            130
        }
        Err(e) => {
            error!(code = %e.code(), error = %e, "improve falhou");
            if let ImproveError::Validation { issues } = &e {
                for issue in issues {
                    error!("  - {issue}");
                }
            }
            if !silent {
                eprintln!("❌ [{}] {e}", e.code());
            }
            1
        }
    }
}
