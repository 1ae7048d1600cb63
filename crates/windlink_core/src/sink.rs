//! Destinos das leituras: console, histórico CSV ou ambos.

use crate::types::Reading;
use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

/// Cabeçalho do histórico CSV.
pub const CSV_HEADER: &str = "timestamp,sender,speed_mps,speed_mph,speed_knots";

/// Erros de um sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Erro de I/O no sink: {0}")]
    Io(#[from] io::Error),

    #[error("Leitura rejeitada: {0}")]
    Rejected(String),
}

/// Consumidor de leituras decodificadas.
///
/// Se o sink tiver estado compartilhado, a exclusão mútua é dele.
pub trait ReadingSink: Send {
    fn record(&mut self, reading: &Reading) -> Result<(), SinkError>;
}

impl<S: ReadingSink + ?Sized> ReadingSink for Box<S> {
    fn record(&mut self, reading: &Reading) -> Result<(), SinkError> {
        (**self).record(reading)
    }
}

// ──────────────────────────────────────────────
// Console
// ──────────────────────────────────────────────

/// Layout do console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleLayout {
    /// m/s, mph e nós, uma unidade por linha
    #[default]
    Full,
    /// Só m/s, em uma linha
    Compact,
}

/// Imprime leituras num `Write` (stdout por padrão).
pub struct ConsoleSink<W = io::Stdout> {
    out: W,
    layout: ConsoleLayout,
}

impl ConsoleSink {
    pub fn stdout(layout: ConsoleLayout) -> Self {
        Self::new(io::stdout(), layout)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W, layout: ConsoleLayout) -> Self {
        Self { out, layout }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ReadingSink for ConsoleSink<W> {
    fn record(&mut self, reading: &Reading) -> Result<(), SinkError> {
        match self.layout {
            ConsoleLayout::Full => writeln!(
                self.out,
                "From {}: Wind Speed =\n{:.2} m/s\n{:.2} mph\n{:.2} knots",
                reading.sender,
                reading.speed_mps,
                reading.speed_mph(),
                reading.speed_knots()
            )?,
            ConsoleLayout::Compact => writeln!(
                self.out,
                "From {}: Wind Speed = {:.2} m/s",
                reading.sender, reading.speed_mps
            )?,
        }
        self.out.flush()?;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Histórico CSV
// ──────────────────────────────────────────────

/// Grava cada leitura como uma linha CSV com timestamp UTC.
pub struct CsvSink<W = std::fs::File> {
    out: W,
}

impl CsvSink {
    /// Abre (ou cria) o arquivo em modo append. O cabeçalho só é escrito
    /// quando o arquivo está vazio; uma última linha truncada é terminada
    /// antes da próxima leitura.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let mut file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        let mut sink = CsvSink { out: file };
        if len == 0 {
            sink.write_header()?;
        }
        info!("Histórico CSV em {}", path.display());
        Ok(sink)
    }
}

impl<W: Write + Send> CsvSink<W> {
    /// Sink sobre um writer qualquer, já com cabeçalho.
    pub fn with_header(out: W) -> Result<Self, SinkError> {
        let mut sink = Self { out };
        sink.write_header()?;
        Ok(sink)
    }

    fn write_header(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "{CSV_HEADER}")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ReadingSink for CsvSink<W> {
    fn record(&mut self, reading: &Reading) -> Result<(), SinkError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        writeln!(
            self.out,
            "{timestamp},{},{},{},{}",
            csv_field(&reading.sender),
            reading.speed_mps,
            reading.speed_mph(),
            reading.speed_knots()
        )?;
        self.out.flush()?;
        Ok(())
    }
}

/// Aspas só quando o campo precisa.
fn csv_field(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\"")).into()
    } else {
        value.into()
    }
}

// ──────────────────────────────────────────────
// Fan-out
// ──────────────────────────────────────────────

/// Repassa cada leitura a vários sinks.
///
/// Todos são chamados mesmo que um falhe; o primeiro erro é retornado.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ReadingSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ReadingSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReadingSink for FanoutSink {
    fn record(&mut self, reading: &Reading) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.record(reading) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
