//! Parser incremental de frames API do XBee (modo API 1, sem escape).
//!
//! ```text
//! ┌──────────┬────────────┬──────────────────┬─────────────┐
//! │ 0x7E (1) │ Len BE (2) │ Frame data (Len) │ Checksum(1) │
//! └──────────┴────────────┴──────────────────┴─────────────┘
//! ```
//!
//! Checksum = `0xFF - (soma dos bytes de frame data & 0xFF)`.

use tracing::debug;
use windlink_core::Frame;

pub const START_DELIMITER: u8 = 0x7E;

/// Receive Packet (endereço 64-bit + 16-bit).
pub const RX_PACKET: u8 = 0x90;

/// RX Packet 64-bit (firmware 802.15.4 legado).
pub const RX_PACKET_64: u8 = 0x80;

/// Acima disso o "tamanho" é quase certamente lixo na linha.
pub const MAX_FRAME_DATA: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XbeeError {
    #[error("Checksum inválido: 0x{got:02X} (esperado 0x{expected:02X})")]
    Checksum { expected: u8, got: u8 },

    #[error("Frame API muito longo ({0} bytes, máximo {MAX_FRAME_DATA})")]
    TooLong(usize),

    #[error("Frame 0x{frame_type:02X} truncado ({len} bytes)")]
    Truncated { frame_type: u8, len: usize },
}

/// Frame API já validado (só o campo frame data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFrame {
    pub data: Vec<u8>,
}

impl ApiFrame {
    pub fn frame_type(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Extrai o [`Frame`] de telemetria de um pacote de recepção.
    ///
    /// `Ok(None)` para tipos que não carregam dados de sensor (status,
    /// respostas AT, ...).
    pub fn into_telemetry(self) -> Result<Option<Frame>, XbeeError> {
        // Offset do payload após o endereço 64-bit
        let payload_offset = match self.frame_type() {
            // tipo + addr64 + addr16 + options
            Some(RX_PACKET) => 1 + 8 + 2 + 1,
            // tipo + addr64 + rssi + options
            Some(RX_PACKET_64) => 1 + 8 + 1 + 1,
            _ => return Ok(None),
        };

        if self.data.len() < payload_offset {
            return Err(XbeeError::Truncated {
                frame_type: self.data[0],
                len: self.data.len(),
            });
        }

        let sender = hex_address(&self.data[1..9]);
        let payload = self.data[payload_offset..].to_vec();
        Ok(Some(Frame { sender, payload }))
    }
}

fn hex_address(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFF - sum
}

/// Monta um frame API completo (delimitador, tamanho, dados, checksum).
#[cfg(test)]
pub fn encode_api_frame(data: &[u8]) -> Vec<u8> {
    let len = data.len() as u16;
    let mut frame = Vec::with_capacity(data.len() + 4);
    frame.push(START_DELIMITER);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(data);
    frame.push(checksum(data));
    frame
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
enum State {
    #[default]
    Delimiter,
    LengthHigh,
    LengthLow(u8),
    Data(usize),
    Checksum,
}

/// Reconstrói frames API a partir do fluxo de bytes da serial.
#[derive(Debug, Default)]
pub struct ApiFrameParser {
    state: State,
    data: Vec<u8>,
    skipped: usize,
}

impl ApiFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consome um byte. Retorna um frame quando ele termina.
    pub fn feed(&mut self, byte: u8) -> Option<Result<ApiFrame, XbeeError>> {
        match self.state {
            State::Delimiter => {
                if byte == START_DELIMITER {
                    if self.skipped > 0 {
                        debug!("Descartados {} bytes antes do delimitador", self.skipped);
                        self.skipped = 0;
                    }
                    self.state = State::LengthHigh;
                } else {
                    self.skipped += 1;
                }
                None
            }
            State::LengthHigh => {
                self.state = State::LengthLow(byte);
                None
            }
            State::LengthLow(high) => {
                let len = u16::from_be_bytes([high, byte]) as usize;
                if len > MAX_FRAME_DATA {
                    self.reset();
                    return Some(Err(XbeeError::TooLong(len)));
                }
                self.data.clear();
                self.state = if len == 0 { State::Checksum } else { State::Data(len) };
                None
            }
            State::Data(len) => {
                self.data.push(byte);
                if self.data.len() == len {
                    self.state = State::Checksum;
                }
                None
            }
            State::Checksum => {
                let expected = checksum(&self.data);
                let data = std::mem::take(&mut self.data);
                self.reset();
                if byte == expected {
                    Some(Ok(ApiFrame { data }))
                } else {
                    Some(Err(XbeeError::Checksum { expected, got: byte }))
                }
            }
        }
    }

    /// Consome um bloco de bytes e retorna tudo que completou.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<Result<ApiFrame, XbeeError>> {
        bytes.iter().filter_map(|b| self.feed(*b)).collect()
    }

    fn reset(&mut self) {
        self.state = State::Delimiter;
        self.data.clear();
    }
}
