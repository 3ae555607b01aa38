use serde::{Deserialize, Serialize};
use std::fmt;

pub type OutputId = u32;
pub type CrtcId = u32;
pub type ModeId = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Поворот выхода, только четыре допустимых значения
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    /// При 90° и 270° ширина и высота режима меняются местами
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }

    /// Размер, который режим `mode` реально занимает на экране при этом повороте
    pub fn occupied(&self, mode: Size) -> Size {
        if self.swaps_axes() {
            Size::new(mode.height, mode.width)
        } else {
            mode
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Геометрия активного CRTC в том виде, как он сейчас настроен
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenHint {
    pub position: Position,
    pub size: Size,
    pub rotation: Rotation,
}

impl fmt::Display for ScreenHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{} {}",
            self.size.width, self.size.height, self.position.x, self.position.y, self.rotation
        )
    }
}

/// Физический монитор, подключённый к выходу
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorHint {
    pub output_id: OutputId,
    pub output_name: String,
    pub width_mm: u32,
    pub height_mm: u32,
    pub monitor_name: Option<String>,
    pub monitor_serial: Option<String>,
    /// `None`, если выход подключён, но ни один CRTC его не ведёт
    pub screen: Option<ScreenHint>,
}

impl MonitorHint {
    pub fn new(output_id: OutputId, output_name: impl Into<String>) -> Self {
        Self {
            output_id,
            output_name: output_name.into(),
            width_mm: 0,
            height_mm: 0,
            monitor_name: None,
            monitor_serial: None,
            screen: None,
        }
    }

    pub fn with_physical_size(mut self, width_mm: u32, height_mm: u32) -> Self {
        self.width_mm = width_mm;
        self.height_mm = height_mm;
        self
    }

    pub fn with_monitor(mut self, name: Option<String>, serial: Option<String>) -> Self {
        self.monitor_name = name;
        self.monitor_serial = serial;
        self
    }

    pub fn with_screen(mut self, screen: Option<ScreenHint>) -> Self {
        self.screen = screen;
        self
    }
}

impl fmt::Display for MonitorHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.output_name)?;
        if let Some(name) = &self.monitor_name {
            write!(f, " \"{}\"", name)?;
        }
        match &self.screen {
            Some(screen) => write!(f, " [{}]", screen),
            None => write!(f, " [выключен]"),
        }
    }
}
