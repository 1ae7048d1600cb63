//! Transporte serial: abre o XBee com `serialport` e entrega frames de uma
//! thread de leitura dedicada.

use crate::xbee::ApiFrameParser;
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use serialport::SerialPort;
use std::io::{ErrorKind, Read};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use windlink_core::connector::{FrameCallback, Link, Transport, TransportError};
use windlink_core::EndpointConfig;

/// Pausa após erro de leitura que não é timeout.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(200);

/// Pausa quando a leitura volta vazia ou em timeout.
const IDLE_PAUSE: Duration = Duration::from_millis(10);

/// Abre portas seriais 8N1 com timeout de leitura fixo.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    read_timeout: Duration,
}

impl SerialTransport {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Transport for SerialTransport {
    type Link = SerialLink;

    fn open(&mut self, endpoint: &EndpointConfig) -> Result<SerialLink, TransportError> {
        let port = serialport::new(&endpoint.port, endpoint.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: endpoint.port.clone(),
                reason: e.to_string(),
            })?;

        Ok(SerialLink {
            port: Some(port),
            reader: None,
            shutdown: None,
        })
    }
}

/// Porta aberta. Com callback registrado, a porta pertence à thread de
/// leitura até o `close`.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    reader: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
}

impl Link for SerialLink {
    fn add_delivery_callback(&mut self, callback: FrameCallback) -> Result<(), TransportError> {
        let port = self.port.take().ok_or(TransportError::Closed)?;
        let name = port.name().unwrap_or_else(|| "?".into());

        let (handle, shutdown) = spawn_reader(port, name, callback)?;
        self.reader = Some(handle);
        self.shutdown = Some(shutdown);
        Ok(())
    }

    fn close(&mut self) {
        // Desconectar o channel já sinaliza a thread
        self.shutdown.take();

        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                error!("Thread de leitura terminou com panic");
            }
        }

        if self.port.take().is_some() {
            debug!("Porta serial liberada sem callback registrado");
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Inicia a thread de leitura. Soltar (ou usar) o `Sender` retornado pede
/// a parada; o `JoinHandle` confirma.
fn spawn_reader<R>(
    port: R,
    name: String,
    callback: FrameCallback,
) -> std::io::Result<(JoinHandle<()>, Sender<()>)>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded::<()>(1);
    let handle = std::thread::Builder::new()
        .name("xbee-receiver".into())
        .spawn(move || reader_loop(port, &name, callback, &rx))?;
    Ok((handle, tx))
}

fn reader_loop<R: Read>(mut port: R, name: &str, mut callback: FrameCallback, shutdown: &Receiver<()>) {
    info!("Recebendo frames API em {name}");

    let mut parser = ApiFrameParser::new();
    let mut buf = [0u8; 256];

    loop {
        match shutdown.try_recv() {
            Err(TryRecvError::Empty) => {}
            // Sinal explícito ou channel desconectado
            _ => break,
        }

        match port.read(&mut buf) {
            Ok(0) => std::thread::sleep(IDLE_PAUSE),
            Ok(n) => {
                for result in parser.feed_all(&buf[..n]) {
                    match result.and_then(|api| api.into_telemetry()) {
                        Ok(Some(frame)) => callback(frame),
                        Ok(None) => {}
                        Err(e) => warn!("Frame API inválido: {e}"),
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                // Timeout normal; a pausa limita o giro com timeout curto
                std::thread::sleep(IDLE_PAUSE);
            }
            Err(e) => {
                warn!("Erro ao ler {name}: {e}");
                std::thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }

    info!("Thread de leitura encerrada");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xbee::{RX_PACKET, encode_api_frame};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use windlink_core::Frame;
    use windlink_core::protocol::encode_wind_payload;

    /// Porta falsa: entrega blocos roteirizados e depois só timeouts.
    struct ScriptedPort {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => {
                    std::thread::sleep(Duration::from_millis(5));
                    Err(io::Error::new(ErrorKind::TimedOut, "timeout"))
                }
            }
        }
    }

    fn rx_packet(payload: &[u8]) -> Vec<u8> {
        let mut data = vec![RX_PACKET, 0x00, 0x13, 0xA2, 0x00, 0x41, 0xB2, 0xC3, 0xD4, 0xFF, 0xFE, 0x02];
        data.extend_from_slice(payload);
        encode_api_frame(&data)
    }

    #[test]
    fn reader_delivers_frames_and_stops_on_close() {
        let first = rx_packet(&encode_wind_payload(0x01, 1.0, [0, 0]));
        let second = rx_packet(&encode_wind_payload(0x01, 2.0, [0, 0]));
        let (head, tail) = second.split_at(4);

        let port = ScriptedPort {
            chunks: VecDeque::from([
                Ok(first),
                Err(io::Error::new(ErrorKind::TimedOut, "timeout")),
                Ok(head.to_vec()),
                Ok(tail.to_vec()),
            ]),
        };

        let seen: Arc<Mutex<Vec<Frame>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let (handle, shutdown) = spawn_reader(
            port,
            "mock".into(),
            Box::new(move |frame: Frame| sink.lock().unwrap().push(frame)),
        )
        .unwrap();

        // Espera os dois frames chegarem
        for _ in 0..200 {
            if seen.lock().unwrap().len() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        let mut link = SerialLink {
            port: None,
            reader: Some(handle),
            shutdown: Some(shutdown),
        };
        link.close();
        link.close();
        assert!(link.reader.is_none());

        let frames = seen.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.sender == "0013A20041B2C3D4"));
        assert_eq!(frames[1].payload[1..5], 2.0f32.to_le_bytes());
    }

    /// Porta que nunca tem dados e conta quantas leituras recebeu.
    struct IdlePort {
        reads: Arc<AtomicUsize>,
        empty: bool,
    }

    impl Read for IdlePort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.empty {
                Ok(0)
            } else {
                Err(io::Error::new(ErrorKind::TimedOut, "timeout"))
            }
        }
    }

    #[test]
    fn idle_port_does_not_spin() {
        for empty in [false, true] {
            let reads = Arc::new(AtomicUsize::new(0));
            let port = IdlePort {
                reads: Arc::clone(&reads),
                empty,
            };
            let (handle, shutdown) = spawn_reader(port, "idle".into(), Box::new(|_: Frame| {})).unwrap();

            std::thread::sleep(Duration::from_millis(100));
            drop(shutdown);
            handle.join().unwrap();

            // ~10 leituras com a pausa de 10 ms; sem ela seriam centenas de milhares
            let count = reads.load(Ordering::SeqCst);
            assert!(count >= 1 && count < 100, "leituras: {count}");
        }
    }
}
