//! # Windlink Core
//!
//! Núcleo do receptor de telemetria de vento via rádio XBee: abertura do
//! link com retry, decodificação do payload de 7 bytes e sinks plugáveis.
//!
//! ## Módulos
//! - [`types`] – `Frame`, `Reading` e estado da conexão
//! - [`protocol`] – Decode do payload de vento
//! - [`connector`] – Abertura com retry e ciclo de vida do link
//! - [`delivery`] – Callback de entrega (decode → sink)
//! - [`sink`] – Console, histórico CSV e fan-out
//! - [`config`] – Configuração unificada via TOML

pub mod config;
pub mod connector;
pub mod delivery;
pub mod protocol;
pub mod sink;
pub mod types;

// Re-exports convenientes
pub use config::AppConfig;
pub use connector::{Connector, ConnectionError, EndpointConfig, Link, OpenLink, Transport};
pub use delivery::FrameHandler;
pub use protocol::{DecodeError, decode};
pub use types::{ConnectionState, Frame, Reading};
