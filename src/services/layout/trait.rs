use crate::config::{LayoutConfig, LayoutKind, MonitorRuleConfig};
use crate::error::{AppError, Result};
use crate::hints::{OutputId, Rotation};
use tracing::info;

use super::dynamic::DynamicLayout;
use super::static_layout::StaticLayout;
use super::{LayoutHint, Placement};

/// Политика раскладки
pub trait LayoutPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Подходит ли политика к текущему набору выходов.
    /// Запоминает сопоставление, по которому потом отвечает `placement_for`.
    fn fit(&mut self, hints: &[LayoutHint]) -> bool;

    /// `None` означает, что выход нужно выключить
    fn placement_for(&self, output: OutputId) -> Option<Placement>;
}

pub(super) fn placement_from_config(layout: &str, monitor: &MonitorRuleConfig) -> Result<Placement> {
    let rotation = Rotation::from_degrees(monitor.rotation).ok_or_else(|| {
        AppError::Config(anyhow::anyhow!(
            "раскладка '{}': неверный поворот {}",
            layout,
            monitor.rotation
        ))
    })?;

    let placement = Placement::new(monitor.x, monitor.y, rotation);
    Ok(if monitor.primary {
        placement.primary()
    } else {
        placement
    })
}

/// Factory function to build the layout policies in declaration order
pub fn create_policies(layouts: &[LayoutConfig]) -> Result<Vec<Box<dyn LayoutPolicy>>> {
    let mut policies: Vec<Box<dyn LayoutPolicy>> = Vec::with_capacity(layouts.len());

    for layout in layouts {
        let policy: Box<dyn LayoutPolicy> = match layout.kind {
            LayoutKind::Static => Box::new(StaticLayout::from_config(layout)?),
            LayoutKind::Dynamic => Box::new(DynamicLayout::from_config(layout)?),
        };
        info!("Раскладка '{}' ({:?}) зарегистрирована", layout.name, layout.kind);
        policies.push(policy);
    }

    Ok(policies)
}
