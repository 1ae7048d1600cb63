//! Abertura do link com o rádio, com número limitado de tentativas.
//!
//! ```text
//! Closed ──(tentativa)──▶ Opening ──(sucesso)──▶ Open
//!                          │  ▲
//!                          └──┘ falha, ainda há tentativas
//!                          │
//!                          └──(falha, sem tentativas)──▶ Failed
//! ```
//!
//! O transporte concreto fica atrás de [`Transport`] / [`Link`], o que
//! permite testar o core sem hardware.

use crate::types::{ConnectionState, Frame};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Parâmetros de conexão repassados ao transporte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Porta serial (ex.: `/dev/ttyUSB0`, `COM3`)
    pub port: String,
    /// Baud rate configurado no rádio
    pub baud_rate: u32,
}

/// Callback de entrega instalado no link.
pub type FrameCallback = Box<dyn FnMut(Frame) + Send + 'static>;

// ──────────────────────────────────────────────
// Erros
// ──────────────────────────────────────────────

/// Erros do transporte.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao abrir {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Erro de I/O no link: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link já fechado")]
    Closed,
}

/// Falha definitiva de `open`.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Falha ao abrir o dispositivo após {attempts} tentativas: {last_error}")]
    AttemptsExhausted {
        attempts: u32,
        last_error: TransportError,
    },
}

/// Erros de operação sobre um link aberto.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Callback de entrega já registrado")]
    CallbackAlreadyRegistered,

    #[error("Link fechado")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ──────────────────────────────────────────────
// Seams do transporte
// ──────────────────────────────────────────────

/// Link aberto fornecido pelo transporte.
pub trait Link {
    /// Instala o callback chamado uma vez por frame, na ordem de chegada.
    fn add_delivery_callback(&mut self, callback: FrameCallback) -> Result<(), TransportError>;

    /// Libera o dispositivo. Depois de retornar, o callback não roda mais.
    /// Chamadas repetidas não fazem nada.
    fn close(&mut self);
}

/// Capacidade de abrir links.
pub trait Transport {
    type Link: Link;

    fn open(&mut self, endpoint: &EndpointConfig) -> Result<Self::Link, TransportError>;
}

/// Espera entre tentativas.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Espera bloqueando a thread atual.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

// ──────────────────────────────────────────────
// Connector
// ──────────────────────────────────────────────

/// Abre links através de um [`Transport`] com retry.
pub struct Connector<T, D = ThreadDelay> {
    transport: T,
    delay: D,
    state: ConnectionState,
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: T) -> Self {
        Self::with_delay(transport, ThreadDelay)
    }
}

impl<T: Transport, D: Delay> Connector<T, D> {
    pub fn with_delay(transport: T, delay: D) -> Self {
        Self {
            transport,
            delay,
            state: ConnectionState::Closed,
        }
    }

    /// Estado da última chamada de [`open`](Self::open).
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn into_parts(self) -> (T, D) {
        (self.transport, self.delay)
    }

    /// Tenta abrir o link até `max_attempts` vezes, esperando `retry_delay`
    /// entre tentativas. Sucesso retorna na hora, sem espera extra.
    pub fn open(
        &mut self,
        endpoint: &EndpointConfig,
        max_attempts: NonZeroU32,
        retry_delay: Duration,
    ) -> Result<OpenLink<T::Link>, ConnectionError> {
        let max = max_attempts.get();
        self.state = ConnectionState::Closed;

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.state = ConnectionState::Opening;
            info!(attempt, max_attempts = max, "Tentativa {attempt}/{max}: abrindo {}...", endpoint.port);

            match self.transport.open(endpoint) {
                Ok(link) => {
                    self.state = ConnectionState::Open;
                    info!("Dispositivo aberto em {} ({} baud)", endpoint.port, endpoint.baud_rate);
                    return Ok(OpenLink::new(link));
                }
                Err(e) if attempt < max => {
                    warn!(attempt, error = %e, "Tentativa {attempt} falhou");
                    self.delay.delay(retry_delay);
                }
                Err(e) => {
                    self.state = ConnectionState::Failed;
                    error!(attempts = attempt, error = %e, "Falha ao abrir o dispositivo após {attempt} tentativas");
                    return Err(ConnectionError::AttemptsExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// OpenLink
// ──────────────────────────────────────────────

/// Link aberto, de posse exclusiva de quem chamou `open`.
///
/// Fecha no `Drop`, então nenhum caminho de saída vaza o dispositivo.
pub struct OpenLink<L: Link> {
    link: L,
    callback_registered: bool,
    closed: bool,
}

impl<L: Link> OpenLink<L> {
    fn new(link: L) -> Self {
        Self {
            link,
            callback_registered: false,
            closed: false,
        }
    }

    /// Instala o único callback de entrega do link.
    pub fn register_callback<F>(&mut self, on_frame: F) -> Result<(), LinkError>
    where
        F: FnMut(Frame) + Send + 'static,
    {
        if self.closed {
            return Err(LinkError::Closed);
        }
        if self.callback_registered {
            return Err(LinkError::CallbackAlreadyRegistered);
        }

        self.link.add_delivery_callback(Box::new(on_frame))?;
        self.callback_registered = true;
        debug!("Callback de entrega registrado");
        Ok(())
    }

    /// Fecha o link. Idempotente.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.link.close();
        info!("Link fechado");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<L: Link> Drop for OpenLink<L> {
    fn drop(&mut self) {
        self.close();
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
