//! Tipos de dados do link de telemetria de vento.
//!
//! `Frame` é o que o transporte entrega; `Reading` é o que o decoder produz.

use std::fmt;

/// Fator m/s → mph.
pub const MPS_TO_MPH: f32 = 2.23694;

/// Fator m/s → nós.
pub const MPS_TO_KNOTS: f32 = 1.94384;

// ──────────────────────────────────────────────
// Frame
// ──────────────────────────────────────────────

/// Unidade bruta recebida do transporte.
///
/// `sender` é um token opaco (ex.: endereço 64-bit do XBee em hex) e nunca
/// é interpretado pelo core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sender: String,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(sender: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender: sender.into(),
            payload: payload.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Reading
// ──────────────────────────────────────────────

/// Leitura de velocidade do vento decodificada.
///
/// Só `speed_mps` é armazenado; mph e nós são projeções calculadas.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sender: String,
    /// Velocidade do vento (m/s), f32 little-endian na origem
    pub speed_mps: f32,
}

impl Reading {
    pub fn speed_mph(&self) -> f32 {
        self.speed_mps * MPS_TO_MPH
    }

    pub fn speed_knots(&self) -> f32 {
        self.speed_mps * MPS_TO_KNOTS
    }
}

// ──────────────────────────────────────────────
// Estado da conexão
// ──────────────────────────────────────────────

/// Estado da máquina de abertura do [`Connector`](crate::connector::Connector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Opening,
    Open,
    Failed,
}

impl ConnectionState {
    /// `Open` e `Failed` encerram uma chamada de `open`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Open | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_speeds_follow_mps() {
        let reading = Reading {
            sender: "0013A20040A1B2C3".into(),
            speed_mps: 10.0,
        };
        assert!((reading.speed_mph() - 22.3694).abs() < 1e-4);
        assert!((reading.speed_knots() - 19.4384).abs() < 1e-4);
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Open.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Opening.is_terminal());
        assert!(!ConnectionState::Closed.is_terminal());
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
