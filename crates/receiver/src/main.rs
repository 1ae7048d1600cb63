//! # Windlink Receiver
//!
//! Abre o XBee na porta serial (com retry), escuta os broadcasts das
//! estações de vento e imprime/grava cada leitura.
//!
//! ## Uso
//! ```bash
//! windlink_receiver                      # config.toml ao lado do executável
//! windlink_receiver --config wind.toml   # config explícito
//! windlink_receiver --compact            # uma linha por leitura
//! ```

mod serial_link;
mod xbee;

use serial_link::SerialTransport;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use windlink_core::config::{AppConfig, OutputConfig};
use windlink_core::sink::{ConsoleLayout, ConsoleSink, CsvSink, FanoutSink, ReadingSink, SinkError};
use windlink_core::{Connector, FrameHandler};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = config_path_from_args(&args).unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if args.iter().any(|a| a == "--compact") {
        config.output.compact = true;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        return ExitCode::FAILURE;
    }

    // ── Sink ──
    let sink = match build_sink(&config.output) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Falha ao preparar saída: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── XBee ──
    let mut connector = Connector::new(SerialTransport::new(config.read_timeout()));
    let mut link = match connector.open(&config.endpoint(), config.max_attempts(), config.retry_delay()) {
        Ok(link) => link,
        Err(e) => {
            error!("{e}");
            eprintln!("Exiting program due to XBee connection failure.");
            return ExitCode::FAILURE;
        }
    };

    let handler = FrameHandler::new(sink);
    let stats = handler.stats();
    if let Err(e) = link.register_callback(handler.into_callback()) {
        error!("Falha ao registrar callback: {e}");
        return ExitCode::FAILURE;
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   WINDLINK RECEIVER");
    println!("══════════════════════════════════════════════");
    println!("  Port:      {} @ {} baud", config.serial.port, config.serial.baud_rate);
    println!(
        "  History:   {}",
        if config.output.csv_enabled { config.output.csv_path.as_str() } else { "disabled" }
    );
    println!("══════════════════════════════════════════════");
    println!("Listening for XBee broadcast messages...");
    println!("Press Enter to exit...");

    let mut line = String::new();
    if let Err(e) = std::io::stdin().read_line(&mut line) {
        warn!("Erro ao ler stdin: {e}");
    }

    link.close();

    let s = stats.snapshot();
    info!(
        "Frames: {} | Leituras: {} | Malformados: {} | Falhas de sink: {}",
        s.frames, s.readings, s.malformed, s.sink_failures
    );
    println!("XBee receiver closed.");
    ExitCode::SUCCESS
}

fn config_path_from_args(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

/// Console sempre; CSV quando habilitado.
fn build_sink(output: &OutputConfig) -> Result<Box<dyn ReadingSink>, SinkError> {
    let layout = if output.compact {
        ConsoleLayout::Compact
    } else {
        ConsoleLayout::Full
    };
    let console = ConsoleSink::stdout(layout);

    if !output.csv_enabled {
        return Ok(Box::new(console));
    }

    let csv = CsvSink::open(Path::new(&output.csv_path))?;
    Ok(Box::new(FanoutSink::new().with(console).with(csv)))
}
