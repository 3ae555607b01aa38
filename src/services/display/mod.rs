//! Display-protocol boundary.
//!
//! Everything that talks to the display server goes through `DisplayBackend`.
//! The monitor hint source and the reconfiguration transaction share one
//! connection through `SharedDisplay`, so a multi-step protocol sequence is
//! never interleaved with another caller's sequence.

mod backend;
mod edid;
#[cfg(test)]
pub mod fake;
mod x11;

pub use self::backend::{
    CrtcConfig, DisplayBackend, DisplayChange, ModeInfo, OutputInfo, ScreenSize,
};
use self::edid::parse_edid;
pub use self::x11::X11Display;

use crate::error::Result;
use crate::hints::{MonitorHint, OutputId};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

/// Разделяемое соединение с дисплейным сервером
#[derive(Clone)]
pub struct SharedDisplay {
    inner: Arc<Mutex<Box<dyn DisplayBackend>>>,
}

impl SharedDisplay {
    pub fn new(backend: impl DisplayBackend + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(backend))),
        }
    }

    /// Эксклюзивный доступ к протоколу на время одной последовательности запросов
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn DisplayBackend>> {
        self.inner.lock().await
    }
}

/// Захват сервера: `ungrab` выполняется ровно один раз при выходе из области видимости,
/// в том числе при ошибке посреди транзакции.
pub struct ServerGrab<'a> {
    backend: &'a dyn DisplayBackend,
}

impl<'a> ServerGrab<'a> {
    pub fn acquire(backend: &'a dyn DisplayBackend) -> Result<Self> {
        backend.grab_server()?;
        debug!("Сервер захвачен");
        Ok(Self { backend })
    }
}

impl Drop for ServerGrab<'_> {
    fn drop(&mut self) {
        match self.backend.ungrab_server() {
            Ok(()) => debug!("Сервер освобождён"),
            Err(e) => error!("Не удалось освободить сервер: {}", e),
        }
    }
}

/// Подсказка для одного выхода; `None`, если к выходу ничего не подключено
pub fn query_output(backend: &dyn DisplayBackend, output: OutputId) -> Result<Option<MonitorHint>> {
    let info = backend.output_info(output)?;
    if !info.connected {
        return Ok(None);
    }

    let edid = backend
        .output_edid(output)?
        .and_then(|blob| parse_edid(&blob))
        .unwrap_or_default();

    let screen = match info.crtc {
        Some(crtc) => backend.crtc_info(crtc)?.screen_hint(),
        None => None,
    };

    Ok(Some(
        MonitorHint::new(output, info.name)
            .with_physical_size(info.mm_width, info.mm_height)
            .with_monitor(edid.name, edid.serial)
            .with_screen(screen),
    ))
}

/// Снимок всех подключённых выходов в порядке, который отдаёт сервер
pub fn query_monitors(backend: &dyn DisplayBackend) -> Result<Vec<MonitorHint>> {
    let resources = backend.screen_resources()?;
    let mut monitors = Vec::with_capacity(resources.outputs.len());

    for output in resources.outputs {
        if let Some(hint) = query_output(backend, output)? {
            monitors.push(hint);
        }
    }

    Ok(monitors)
}
