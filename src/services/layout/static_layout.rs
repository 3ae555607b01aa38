use crate::config::LayoutConfig;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::hints::OutputId;
use std::collections::HashMap;

use super::matcher::MonitorMatcher;
use super::r#trait::{placement_from_config, LayoutPolicy};
use super::{LayoutHint, Placement};

/// Фиксированный набор правил: подходит, только если каждое правило нашло
/// свой собственный выход. Остальные выходы выключаются.
pub struct StaticLayout {
    name: String,
    rules: Vec<(MonitorMatcher, Placement)>,
    matched: HashMap<OutputId, Placement>,
}

impl StaticLayout {
    pub fn new(name: impl Into<String>, rules: Vec<(MonitorMatcher, Placement)>) -> Self {
        Self {
            name: name.into(),
            rules,
            matched: HashMap::new(),
        }
    }

    pub fn from_config(config: &LayoutConfig) -> Result<Self> {
        let rules = config
            .monitors
            .iter()
            .map(|monitor| {
                Ok((
                    MonitorMatcher::from_config(monitor),
                    placement_from_config(&config.name, monitor)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(config.name.clone(), rules))
    }
}

impl LayoutPolicy for StaticLayout {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, hints: &[LayoutHint]) -> bool {
        self.matched.clear();

        for (matcher, placement) in &self.rules {
            let found = hints.iter().find(|hint| {
                !self.matched.contains_key(&hint.output_id()) && matcher.matches(&hint.monitor)
            });

            match found {
                Some(hint) => {
                    self.matched.insert(hint.output_id(), *placement);
                }
                None => {
                    debug_if_enabled!("Раскладка '{}': нет выхода для {}", self.name, matcher);
                    self.matched.clear();
                    return false;
                }
            }
        }

        true
    }

    fn placement_for(&self, output: OutputId) -> Option<Placement> {
        self.matched.get(&output).copied()
    }
}
