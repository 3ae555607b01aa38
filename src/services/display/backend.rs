use crate::error::Result;
use crate::hints::{CrtcId, ModeId, OutputId, Position, Rotation, ScreenHint, Size};

/// Режим (разрешение) из ресурсов экрана
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeInfo {
    pub id: ModeId,
    pub width: u32,
    pub height: u32,
}

impl ModeInfo {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScreenResources {
    pub outputs: Vec<OutputId>,
    pub crtcs: Vec<CrtcId>,
    pub modes: Vec<ModeInfo>,
}

impl ScreenResources {
    pub fn mode(&self, id: ModeId) -> Option<ModeInfo> {
        self.modes.iter().find(|m| m.id == id).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputInfo {
    pub name: String,
    pub connected: bool,
    /// Текущий CRTC, `None` если выход никем не ведётся
    pub crtc: Option<CrtcId>,
    /// CRTC, которые вообще могут вести этот выход
    pub crtcs: Vec<CrtcId>,
    /// Режимы выхода, предпочтительные идут первыми
    pub modes: Vec<ModeId>,
    pub mm_width: u32,
    pub mm_height: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CrtcInfo {
    pub position: Position,
    pub size: Size,
    pub mode: Option<ModeId>,
    pub rotation: Rotation,
    pub outputs: Vec<OutputId>,
    pub possible: Vec<OutputId>,
}

impl CrtcInfo {
    pub fn is_active(&self) -> bool {
        self.mode.is_some()
    }

    pub fn is_unused(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn screen_hint(&self) -> Option<ScreenHint> {
        self.is_active().then(|| ScreenHint {
            position: self.position,
            size: self.size,
            rotation: self.rotation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcConfig {
    pub position: Position,
    pub mode: Option<ModeId>,
    pub rotation: Rotation,
    pub outputs: Vec<OutputId>,
}

impl CrtcConfig {
    /// Нулевая геометрия и пустой список выходов
    pub fn disabled() -> Self {
        Self {
            position: Position::default(),
            mode: None,
            rotation: Rotation::R0,
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
    pub width_mm: u32,
    pub height_mm: u32,
}

/// Асинхронное уведомление об изменении выходов или CRTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayChange {
    Output {
        output: OutputId,
        crtc: Option<CrtcId>,
        mode: Option<ModeId>,
        connected: bool,
    },
    Crtc {
        crtc: CrtcId,
        mode: Option<ModeId>,
    },
    Other,
}

/// Граница с протоколом дисплейного сервера.
///
/// Методы синхронные: каждый запрос дожидается ответа. Многошаговые
/// последовательности должны выполняться под одним захватом `SharedDisplay`.
pub trait DisplayBackend: Send + Sync {
    fn screen_resources(&self) -> Result<ScreenResources>;

    fn output_info(&self, output: OutputId) -> Result<OutputInfo>;

    fn crtc_info(&self, crtc: CrtcId) -> Result<CrtcInfo>;

    /// Сырой EDID блок выхода, если он есть
    fn output_edid(&self, output: OutputId) -> Result<Option<Vec<u8>>>;

    fn current_screen_size(&self) -> Result<Size>;

    fn set_crtc_config(&self, crtc: CrtcId, config: &CrtcConfig) -> Result<()>;

    fn disable_crtc(&self, crtc: CrtcId) -> Result<()> {
        self.set_crtc_config(crtc, &CrtcConfig::disabled())
    }

    fn set_screen_size(&self, size: &ScreenSize) -> Result<()>;

    fn set_output_primary(&self, output: OutputId) -> Result<()>;

    fn grab_server(&self) -> Result<()>;

    fn ungrab_server(&self) -> Result<()>;

    fn flush(&self) -> Result<()>;

    /// Подписка на уведомления об изменении выходов и CRTC
    fn select_change_events(&self) -> Result<()>;

    /// Снять подписку: пустая маска уведомлений
    fn clear_change_events(&self) -> Result<()>;

    /// Неблокирующее чтение следующего уведомления
    fn poll_change_event(&self) -> Result<Option<DisplayChange>>;
}
