//! # Módulo de Telemetria OpenTelemetry
//!
//! Fornece integração com OpenTelemetry para observabilidade de runs
//! de improve. Exporta traces/spans com atributos de cada step
//! analisado (action, target, adoção, duração).
//!
//! ## Para todos entenderem:
//!
//! Um run de improve pode levar minutos num teste grande. Telemetria
//! é como ter uma câmera gravando o run: depois dá para ver onde o
//! tempo foi (sondagem de candidatos? network idle? replay?) e onde
//! aconteceram falhas.
//!
//! Os dados podem ser visualizados em Jaeger, Zipkin, Grafana Tempo
//! ou qualquer backend OTLP.
//!
//! ## Configuração via variáveis de ambiente:
//!
//! - `OTEL_SERVICE_NAME`: nome do serviço
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: URL do coletor OTLP
//! - `OTEL_TRACES_SAMPLER_ARG`: taxa de sampling (0.0-1.0)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CONFIGURAÇÃO
// ============================================================================

/// Configuração do sistema de telemetria.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Nome do serviço para identificação nos traces.
    pub service_name: String,

    /// Endpoint OTLP para envio de traces (gRPC).
    /// Se None, apenas loga para console.
    pub otlp_endpoint: Option<String>,

    /// Taxa de sampling (0.0 a 1.0).
    pub sampling_ratio: f64,

    /// Se deve habilitar logging para console.
    pub enable_console_logging: bool,

    /// Nível de log mínimo (INFO, DEBUG, WARN, ERROR).
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ui-test-improver".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            enable_console_logging: true,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    /// Cria configuração a partir de variáveis de ambiente.
    ///
    /// Variáveis suportadas:
    /// - `OTEL_SERVICE_NAME`
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`
    /// - `OTEL_TRACES_SAMPLER_ARG`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("OTEL_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            config.otlp_endpoint = Some(endpoint);
        }

        if let Ok(ratio) = std::env::var("OTEL_TRACES_SAMPLER_ARG") {
            if let Ok(r) = ratio.parse::<f64>() {
                config.sampling_ratio = r.clamp(0.0, 1.0);
            }
        }

        config
    }
}

// ============================================================================
// INICIALIZAÇÃO
// ============================================================================

/// Inicializa o sistema de telemetria para um run de improve.
///
/// Monta a infraestrutura de rastreamento em três passos:
/// 1. cria o TracerProvider com exporter OTLP (se configurado);
/// 2. configura o sampler (taxa de coleta);
/// 3. integra com tracing-subscriber para os spans do pipeline
///    (selector pass, sondagens de candidato, replay de validação).
///
/// ## Retorno:
///
/// - `Ok(Some(Tracer))`: OTLP configurado, tracer retornado
/// - `Ok(None)`: apenas console logging (sem OTLP)
/// - `Err`: erro ao configurar
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    // Filtro de nível: RUST_LOG manda; sem ele, o nível da config
    // (que o main deriva das flags --silent/--verbose).
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(endpoint) = &config.otlp_endpoint {
        let tracer = init_otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;

        // Layer que despacha os spans do pipeline para o OTEL.
        let telemetry_layer = OpenTelemetryLayer::new(tracer.clone());
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(telemetry_layer);

        // Console continua útil mesmo com OTLP: é onde o usuário vê os
        // diagnósticos do run em tempo real.
        if config.enable_console_logging {
            subscriber
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        } else {
            subscriber.init();
        }

        tracing::info!(
            service_name = %config.service_name,
            endpoint = %endpoint,
            sampling_ratio = config.sampling_ratio,
            "Telemetria OTEL inicializada"
        );

        Ok(Some(tracer))
    } else {
        // Sem OTLP: só console. É o caminho normal de quem roda o
        // improve localmente.
        let subscriber = tracing_subscriber::registry().with(env_filter);

        if config.enable_console_logging {
            subscriber
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        } else {
            subscriber.init();
        }

        tracing::info!("Telemetria inicializada (apenas console, sem OTLP)");
        Ok(None)
    }
}

// ============================================================================
// TRACER OTLP
// ============================================================================

/// Cria um tracer com OTLP exporter.
///
/// Infraestrutura de baixo nível: exporter gRPC, sampler e o
/// TracerProvider que gerencia tudo. Um run de improve gera um span
/// por step analisado mais um por sondagem de candidato, então o
/// sampling importa em testes grandes.
fn init_otlp_tracer(
    service_name: &str,
    endpoint: &str,
    sampling_ratio: f64,
) -> anyhow::Result<Tracer> {
    // Sampler baseado na taxa. Entre 0 e 1 a decisão segue o trace ID,
    // então os spans de um mesmo run são coletados juntos.
    let sampler = if sampling_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if sampling_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sampling_ratio)
    };

    // Batch exporter: acumula spans e envia em lotes. Importante aqui:
    // o pipeline é serial numa página só, e um export síncrono por
    // sondagem arrastaria o run inteiro.
    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .build_span_exporter()?,
            Tokio,
        )
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name.to_string());

    // Registra o provider globalmente para o shutdown conseguir
    // flushar os spans pendentes no fim do run.
    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}

// ============================================================================
// ENCERRAMENTO
// ============================================================================

/// Encerra a telemetria, flushing traces pendentes.
///
/// Deve ser chamado antes do encerramento da aplicação: o batch
/// exporter acumula spans em memória e sem flush eles se perdem.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

/// Helpers de instrumentação de spans por step.
#[allow(dead_code)]
pub mod instrumentation {
    use std::time::Instant;

    /// Contexto de instrumentação para a análise de um step.
    #[derive(Debug)]
    pub struct StepSpanContext {
        /// Action do step (click, fill, ...).
        pub action: String,
        /// Valor do target analisado.
        pub target: String,
        /// Início da análise.
        pub start_time: Instant,
        /// Quantos candidatos foram sondados.
        pub candidates_probed: Option<usize>,
        /// O seletor foi trocado?
        pub adopted: Option<bool>,
        /// Duração em milissegundos (preenchido no finish).
        pub duration_ms: Option<u64>,
    }

    impl StepSpanContext {
        /// Cria novo contexto de span de step.
        pub fn new(action: &str, target: &str) -> Self {
            Self {
                action: action.to_string(),
                target: target.to_string(),
                start_time: Instant::now(),
                candidates_probed: None,
                adopted: None,
                duration_ms: None,
            }
        }

        /// Finaliza o span com o resultado da análise.
        pub fn finish(&mut self, candidates_probed: usize, adopted: bool) {
            self.candidates_probed = Some(candidates_probed);
            self.adopted = Some(adopted);
            self.duration_ms = Some(self.start_time.elapsed().as_millis() as u64);
        }

        /// Atributos como pares chave/valor para OTEL.
        pub fn attributes(&self) -> Vec<(&'static str, String)> {
            let mut attrs = vec![
                ("step.action", self.action.clone()),
                ("step.target", self.target.clone()),
            ];

            if let Some(probed) = self.candidates_probed {
                attrs.push(("step.candidates_probed", probed.to_string()));
            }

            if let Some(adopted) = self.adopted {
                attrs.push(("step.selector_adopted", adopted.to_string()));
            }

            if let Some(duration) = self.duration_ms {
                attrs.push(("step.duration_ms", duration.to_string()));
            }

            attrs
        }
    }
}
