use crate::hints::OutputId;
use tracing::{info, warn};

use super::r#trait::LayoutPolicy;
use super::{LayoutHint, Placement};

/// Результат прохода: выбранная политика и решение по каждому выходу
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayout {
    pub policy: String,
    pub assignments: Vec<(OutputId, Option<Placement>)>,
}

impl ResolvedLayout {
    pub fn placement_for(&self, output: OutputId) -> Option<Placement> {
        self.assignments
            .iter()
            .find(|(id, _)| *id == output)
            .and_then(|(_, placement)| *placement)
    }
}

pub struct LayoutResolver {
    policies: Vec<Box<dyn LayoutPolicy>>,
}

impl LayoutResolver {
    pub fn new(policies: Vec<Box<dyn LayoutPolicy>>) -> Self {
        Self { policies }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Первая подошедшая политика выигрывает. `None`, если не подошла ни одна:
    /// текущая конфигурация тогда остаётся нетронутой.
    pub fn resolve(&mut self, hints: &[LayoutHint]) -> Option<ResolvedLayout> {
        let Some(index) = self.policies.iter_mut().position(|policy| policy.fit(hints)) else {
            let outputs: Vec<&str> = hints.iter().map(|h| h.monitor.output_name.as_str()).collect();
            warn!("Ни одна раскладка не подходит к выходам {:?}, изменений не будет", outputs);
            return None;
        };

        let policy = &self.policies[index];
        let assignments = hints
            .iter()
            .map(|hint| (hint.output_id(), policy.placement_for(hint.output_id())))
            .collect();

        info!("Выбрана раскладка '{}'", policy.name());
        Some(ResolvedLayout {
            policy: policy.name().to_string(),
            assignments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::{MonitorHint, Rotation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        name: &'static str,
        fits: bool,
        calls: Arc<AtomicUsize>,
    }

    impl LayoutPolicy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn fit(&mut self, _hints: &[LayoutHint]) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fits
        }

        fn placement_for(&self, _output: OutputId) -> Option<Placement> {
            Some(Placement::new(0, 0, Rotation::R0))
        }
    }

    fn fixed(name: &'static str, fits: bool) -> (Box<dyn LayoutPolicy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Fixed {
                name,
                fits,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn test_first_fitting_policy_wins() {
        let (p1, p1_calls) = fixed("p1", false);
        let (p2, p2_calls) = fixed("p2", true);
        let (p3, p3_calls) = fixed("p3", true);
        let mut resolver = LayoutResolver::new(vec![p1, p2, p3]);

        let hints = vec![LayoutHint::new(MonitorHint::new(66, "DP-1"), None)];
        let resolved = resolver.resolve(&hints).unwrap();

        assert_eq!(resolved.policy, "p2");
        assert_eq!(p1_calls.load(Ordering::SeqCst), 1);
        assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
        assert_eq!(p3_calls.load(Ordering::SeqCst), 0);
        assert!(resolved.placement_for(66).is_some());
    }

    #[test]
    fn test_no_fitting_policy_yields_nothing() {
        let (p1, _) = fixed("p1", false);
        let mut resolver = LayoutResolver::new(vec![p1]);
        assert_eq!(resolver.resolve(&[]), None);
    }
}
