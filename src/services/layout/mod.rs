//! Layout resolution.
//!
//! A policy looks at the connected outputs and either declines (`fit` is
//! false) or takes the pass and answers `placement_for` per output. The
//! resolver asks policies in registration order and stops at the first one
//! that fits.

mod dynamic;
mod matcher;
mod resolver;
mod static_layout;
mod r#trait;

pub use self::dynamic::DynamicLayout;
pub use self::matcher::MonitorMatcher;
pub use self::r#trait::{create_policies, LayoutPolicy};
pub use self::resolver::{LayoutResolver, ResolvedLayout};
pub use self::static_layout::StaticLayout;

use crate::hints::{MonitorHint, OutputId, Position, Rotation, Size};
use crate::services::display::ModeInfo;
use std::fmt;

/// Целевая конфигурация одного выхода
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    pub position: Position,
    pub rotation: Rotation,
    pub primary: bool,
}

impl Placement {
    pub fn new(x: i32, y: i32, rotation: Rotation) -> Self {
        Self {
            position: Position::new(x, y),
            rotation,
            primary: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}+{} {}", self.position.x, self.position.y, self.rotation)?;
        if self.primary {
            write!(f, " primary")?;
        }
        Ok(())
    }
}

/// Подключённый выход вместе с режимом, который будет для него выбран
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutHint {
    pub monitor: MonitorHint,
    pub mode: Option<ModeInfo>,
}

impl LayoutHint {
    pub fn new(monitor: MonitorHint, mode: Option<ModeInfo>) -> Self {
        Self { monitor, mode }
    }

    pub fn output_id(&self) -> OutputId {
        self.monitor.output_id
    }

    /// Занимаемый на экране размер при повороте `rotation`
    pub fn occupied(&self, rotation: Rotation) -> Option<Size> {
        self.mode.map(|mode| rotation.occupied(mode.size()))
    }
}
