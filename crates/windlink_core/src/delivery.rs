//! Fronteira do callback de entrega: decode → sink.
//!
//! Nenhuma falha de decode ou de sink sai daqui; o link continua recebendo.

use crate::protocol::decode;
use crate::sink::ReadingSink;
use crate::types::Frame;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Contadores de entrega, compartilháveis entre threads.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    frames: AtomicU64,
    readings: AtomicU64,
    malformed: AtomicU64,
    sink_failures: AtomicU64,
}

/// Cópia dos contadores num instante.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub readings: u64,
    pub malformed: u64,
    pub sink_failures: u64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            readings: self.readings.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

/// Handler instalado como callback do link.
pub struct FrameHandler<S> {
    sink: S,
    stats: Arc<DeliveryStats>,
}

impl<S: ReadingSink> FrameHandler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Processa um frame. Frames malformados são descartados com aviso;
    /// erros e panics do sink são registrados e engolidos.
    pub fn handle(&mut self, frame: Frame) {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);

        let reading = match decode(&frame) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                warn!("Frame descartado de {}: {e}", frame.sender);
                return;
            }
        };
        debug!("Leitura de {}: {:.2} m/s", reading.sender, reading.speed_mps);

        let sink = &mut self.sink;
        match panic::catch_unwind(AssertUnwindSafe(|| sink.record(&reading))) {
            Ok(Ok(())) => {
                self.stats.readings.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                error!("Sink falhou para leitura de {}: {e}", reading.sender);
            }
            Err(payload) => {
                self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Panic no sink para leitura de {}: {}",
                    reading.sender,
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    /// Converte o handler em callback para [`OpenLink::register_callback`](crate::connector::OpenLink::register_callback).
    pub fn into_callback(mut self) -> impl FnMut(Frame) + Send + 'static
    where
        S: 'static,
    {
        move |frame| self.handle(frame)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic sem mensagem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_wind_payload;
    use crate::sink::SinkError;
    use crate::types::Reading;
    use std::sync::Mutex;

    /// Sink que falha ou entra em panic conforme a velocidade.
    #[derive(Clone, Default)]
    struct Flaky(Arc<Mutex<Vec<f32>>>);

    impl ReadingSink for Flaky {
        fn record(&mut self, reading: &Reading) -> Result<(), SinkError> {
            if reading.speed_mps < 0.0 {
                return Err(SinkError::Rejected("negativo".into()));
            }
            if reading.speed_mps > 100.0 {
                panic!("velocidade absurda");
            }
            self.0.lock().unwrap().push(reading.speed_mps);
            Ok(())
        }
    }

    fn frame(speed: f32) -> Frame {
        Frame::new("0013A20041B2C3D4", encode_wind_payload(0x01, speed, [0, 0]).to_vec())
    }

    #[test]
    fn sink_error_does_not_stop_next_frame() {
        let sink = Flaky::default();
        let mut handler = FrameHandler::new(sink.clone());

        handler.handle(frame(-1.0));
        handler.handle(frame(3.0));

        assert_eq!(*sink.0.lock().unwrap(), vec![3.0]);
        let stats = handler.stats().snapshot();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.readings, 1);
        assert_eq!(stats.sink_failures, 1);
    }

    #[test]
    fn sink_panic_is_contained() {
        let sink = Flaky::default();
        let handler = FrameHandler::new(sink.clone());
        let stats = handler.stats();
        let mut callback = handler.into_callback();

        callback(frame(250.0));
        callback(frame(4.0));
        callback(frame(5.0));

        assert_eq!(*sink.0.lock().unwrap(), vec![4.0, 5.0]);
        assert_eq!(stats.snapshot().sink_failures, 1);
        assert_eq!(stats.snapshot().readings, 2);
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let sink = Flaky::default();
        let mut handler = FrameHandler::new(sink.clone());

        handler.handle(Frame::new("A", vec![1, 2, 3, 4, 5]));
        handler.handle(frame(1.5));

        assert_eq!(*sink.0.lock().unwrap(), vec![1.5]);
        assert_eq!(
            handler.stats().snapshot(),
            StatsSnapshot {
                frames: 2,
                readings: 1,
                malformed: 1,
                sink_failures: 0,
            }
        );
    }
}
