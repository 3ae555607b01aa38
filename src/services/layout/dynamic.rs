use crate::config::{LayoutConfig, UnknownMonitors};
use crate::debug_if_enabled;
use crate::error::Result;
use crate::hints::{OutputId, Position, Rotation};
use std::collections::HashMap;
use tracing::debug;

use super::matcher::MonitorMatcher;
use super::r#trait::{placement_from_config, LayoutPolicy};
use super::{LayoutHint, Placement};

#[derive(Debug, Clone)]
pub struct DynamicEntry {
    pub matcher: MonitorMatcher,
    pub placement: Placement,
    pub required: bool,
}

/// Раскладка из конфигурации с необязательными мониторами.
///
/// Обязательные записи должны найти выход, необязательные ставятся, если
/// выход есть. Незнакомые выходы выключаются либо пристраиваются слева или
/// справа от уже занятой области.
pub struct DynamicLayout {
    name: String,
    entries: Vec<DynamicEntry>,
    unknown: UnknownMonitors,
    matched: HashMap<OutputId, Placement>,
}

/// Занятая область экрана: левый и правый края, верх
#[derive(Debug, Clone, Copy)]
struct Extent {
    left: i32,
    right: i32,
    top: i32,
}

impl DynamicLayout {
    pub fn new(name: impl Into<String>, entries: Vec<DynamicEntry>, unknown: UnknownMonitors) -> Self {
        Self {
            name: name.into(),
            entries,
            unknown,
            matched: HashMap::new(),
        }
    }

    pub fn from_config(config: &LayoutConfig) -> Result<Self> {
        let entries = config
            .monitors
            .iter()
            .map(|monitor| {
                Ok(DynamicEntry {
                    matcher: MonitorMatcher::from_config(monitor),
                    placement: placement_from_config(&config.name, monitor)?,
                    required: monitor.required,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(config.name.clone(), entries, config.unknown_monitors))
    }

    fn extent(&self, hints: &[LayoutHint]) -> Option<Extent> {
        let mut extent: Option<Extent> = None;

        for hint in hints {
            let Some(placement) = self.matched.get(&hint.output_id()) else {
                continue;
            };
            let width = hint
                .occupied(placement.rotation)
                .map_or(0, |size| size.width as i32);
            let (x, y) = (placement.position.x, placement.position.y);

            extent = Some(match extent {
                Some(e) => Extent {
                    left: e.left.min(x),
                    right: e.right.max(x + width),
                    top: e.top.min(y),
                },
                None => Extent {
                    left: x,
                    right: x + width,
                    top: y,
                },
            });
        }

        extent
    }

    fn place_unknown(&mut self, hints: &[LayoutHint]) {
        if self.unknown == UnknownMonitors::Disable {
            return;
        }

        let mut extent = self.extent(hints).unwrap_or(Extent {
            left: 0,
            right: 0,
            top: 0,
        });

        for hint in hints {
            if self.matched.contains_key(&hint.output_id()) {
                continue;
            }
            let Some(size) = hint.occupied(Rotation::R0) else {
                debug!(
                    "Раскладка '{}': у выхода {} нет режима, он остаётся выключенным",
                    self.name, hint.monitor.output_name
                );
                continue;
            };
            let width = size.width as i32;

            let x = match self.unknown {
                UnknownMonitors::Right => {
                    let x = extent.right;
                    extent.right += width;
                    x
                }
                _ => {
                    extent.left -= width;
                    extent.left
                }
            };

            debug_if_enabled!(
                "Раскладка '{}': незнакомый выход {} ставится в +{}+{}",
                self.name,
                hint.monitor.output_name,
                x,
                extent.top
            );
            self.matched
                .insert(hint.output_id(), Placement::new(x, extent.top, Rotation::R0));
        }
    }

    /// Сдвинуть всё так, чтобы раскладка не уходила в отрицательные координаты
    fn normalize(&mut self) {
        let min_x = self.matched.values().map(|p| p.position.x).min().unwrap_or(0);
        let min_y = self.matched.values().map(|p| p.position.y).min().unwrap_or(0);
        let shift = Position::new(-min_x.min(0), -min_y.min(0));

        if shift != Position::default() {
            for placement in self.matched.values_mut() {
                placement.position.x += shift.x;
                placement.position.y += shift.y;
            }
        }
    }
}

impl LayoutPolicy for DynamicLayout {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, hints: &[LayoutHint]) -> bool {
        self.matched.clear();

        for entry in &self.entries {
            let found = hints.iter().find(|hint| {
                !self.matched.contains_key(&hint.output_id()) && entry.matcher.matches(&hint.monitor)
            });

            match found {
                Some(hint) => {
                    self.matched.insert(hint.output_id(), entry.placement);
                }
                None if entry.required => {
                    debug_if_enabled!(
                        "Раскладка '{}': обязательный монитор {} не найден",
                        self.name,
                        entry.matcher
                    );
                    self.matched.clear();
                    return false;
                }
                None => {}
            }
        }

        self.place_unknown(hints);
        if self.matched.is_empty() {
            debug_if_enabled!("Раскладка '{}': не найдено ни одного монитора", self.name);
            return false;
        }
        self.normalize();
        true
    }

    fn placement_for(&self, output: OutputId) -> Option<Placement> {
        self.matched.get(&output).copied()
    }
}
