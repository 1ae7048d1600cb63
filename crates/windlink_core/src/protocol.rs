//! Decoder do payload de vento.
//!
//! Formato do payload (7 bytes):
//!
//! ```text
//! ┌───────────┬──────────────────────┬─────────────┐
//! │ Header(1) │ speed_mps f32 LE (4) │ Reserv. (2) │
//! └───────────┴──────────────────────┴─────────────┘
//! ```
//!
//! - Header e bytes reservados não são validados
//! - Qualquer padrão de bits do f32 é aceito (NaN e infinitos inclusive)

use crate::types::{Frame, Reading};

/// Tamanho exato do payload de vento.
pub const WIND_PAYLOAD_LEN: usize = 7;

/// Posição do f32 dentro do payload.
const SPEED_RANGE: std::ops::Range<usize> = 1..5;

/// Erros de decodificação de um frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Tamanho de payload inválido: {actual} bytes (esperado {expected})")]
    MalformedLength { expected: usize, actual: usize },
}

/// Decodifica um [`Frame`] em [`Reading`].
///
/// Frames malformados não são transitórios: quem chama descarta, não repete.
pub fn decode(frame: &Frame) -> Result<Reading, DecodeError> {
    let payload = frame.payload.as_slice();
    if payload.len() != WIND_PAYLOAD_LEN {
        return Err(DecodeError::MalformedLength {
            expected: WIND_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    let mut raw = [0u8; 4];
    raw.copy_from_slice(&payload[SPEED_RANGE]);

    Ok(Reading {
        sender: frame.sender.clone(),
        speed_mps: f32::from_le_bytes(raw),
    })
}

/// Monta um payload de 7 bytes com `speed_mps` em little-endian.
pub fn encode_wind_payload(header: u8, speed_mps: f32, reserved: [u8; 2]) -> [u8; WIND_PAYLOAD_LEN] {
    let mut payload = [0u8; WIND_PAYLOAD_LEN];
    payload[0] = header;
    payload[SPEED_RANGE].copy_from_slice(&speed_mps.to_le_bytes());
    payload[5..].copy_from_slice(&reserved);
    payload
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
