//! Dobles de prueba compartidos por los tests de los módulos.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    audio::player::{FinishSignal, PlaybackFailure, PlayerSink, StreamHandle},
    notify::Notifier,
};

/// Guarda todos los avisos recibidos
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: String) {
        self.messages.lock().push(message);
    }
}

#[derive(Default)]
struct FakeSinkState {
    connected: bool,
    current: Option<FinishSignal>,
    paused: bool,
    played: Vec<String>,
    rejections: usize,
    disconnected: bool,
}

/// Reproductor en memoria. Como Songbird, detener el track actual dispara su
/// evento de fin.
#[derive(Default)]
pub struct FakeSink {
    state: Mutex<FakeSinkState>,
}

impl FakeSink {
    pub fn connected() -> Self {
        let sink = Self::default();
        sink.state.lock().connected = true;
        sink
    }

    /// URLs de stream entregadas, en orden
    pub fn played(&self) -> Vec<String> {
        self.state.lock().played.clone()
    }

    /// Rechaza las próximas `count` entregas
    pub fn reject_next(&self, count: usize) {
        self.state.lock().rejections = count;
    }

    pub fn was_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }

    /// Simula el fin (o error) del track actual
    pub fn finish_current(&self, error: Option<String>) {
        let signal = self.state.lock().current.take();
        if let Some(signal) = signal {
            signal.finish(error);
        }
    }
}

#[async_trait]
impl PlayerSink for FakeSink {
    async fn play(
        &self,
        stream: &StreamHandle,
        on_finished: FinishSignal,
    ) -> Result<(), PlaybackFailure> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(PlaybackFailure::NotConnected);
        }
        if state.rejections > 0 {
            state.rejections -= 1;
            return Err(PlaybackFailure::Rejected("stream rechazado".to_string()));
        }
        state.played.push(stream.url().to_string());
        state.current = Some(on_finished);
        state.paused = false;
        Ok(())
    }

    async fn stop(&self) {
        let signal = {
            let mut state = self.state.lock();
            state.paused = false;
            state.current.take()
        };
        if let Some(signal) = signal {
            signal.finish(None);
        }
    }

    async fn pause(&self) {
        let mut state = self.state.lock();
        if state.current.is_some() {
            state.paused = true;
        }
    }

    async fn resume(&self) {
        self.state.lock().paused = false;
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && !state.paused
    }

    async fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && state.paused
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.current = None;
        state.disconnected = true;
    }
}
