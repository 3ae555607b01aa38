//! ReconfigurationTransaction: applies a resolved layout to the display server
//! inside one grab/ungrab critical section.
//!
//! Sequence: disable stale CRTCs, grow the screen if the new layout does not
//! fit the current one, bind one CRTC per placed output, set the final screen
//! size and the primary output, flush. The server is released exactly once by
//! `ServerGrab` no matter where the sequence stops.

use crate::error::{AppError, Result};
use crate::hints::{CrtcId, MonitorHint, OutputId, Position, Rotation, Size};
use crate::services::display::{
    query_output, CrtcConfig, DisplayBackend, ModeInfo, OutputInfo, ScreenSize, ServerGrab,
};
use crate::services::layout::{LayoutHint, Placement, ResolvedLayout};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Подключённый выход на момент прохода
#[derive(Debug, Clone)]
pub struct OutputSnapshot {
    pub id: OutputId,
    pub hint: MonitorHint,
    pub info: OutputInfo,
    /// Первый (предпочтительный) режим выхода
    pub mode: Option<ModeInfo>,
}

/// Всё, что транзакции нужно знать о сервере перед началом
#[derive(Debug, Clone, Default)]
pub struct DisplaySnapshot {
    pub outputs: Vec<OutputSnapshot>,
    /// Активные CRTC, которые ведут только отключённые выходы
    pub stale_crtcs: Vec<CrtcId>,
}

impl DisplaySnapshot {
    pub fn capture(backend: &dyn DisplayBackend) -> Result<Self> {
        let resources = backend.screen_resources()?;
        let mut outputs = Vec::new();

        for &output in &resources.outputs {
            let Some(hint) = query_output(backend, output)? else {
                continue;
            };
            let info = backend.output_info(output)?;
            let mode = info.modes.first().and_then(|&id| resources.mode(id));
            outputs.push(OutputSnapshot {
                id: output,
                hint,
                info,
                mode,
            });
        }

        let connected: HashSet<OutputId> = outputs.iter().map(|o| o.id).collect();
        let mut stale_crtcs = Vec::new();
        for &crtc in &resources.crtcs {
            let info = backend.crtc_info(crtc)?;
            if info.is_active() && info.outputs.iter().all(|o| !connected.contains(o)) {
                stale_crtcs.push(crtc);
            }
        }

        Ok(Self {
            outputs,
            stale_crtcs,
        })
    }

    pub fn layout_hints(&self) -> Vec<LayoutHint> {
        self.outputs
            .iter()
            .map(|o| LayoutHint::new(o.hint.clone(), o.mode))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    ServerGrabbed,
    CrtcsDisabled,
    CrtcsUpdated,
    ScreenSized,
    Flushed,
    ServerUngrabbed,
}

/// Выход, который получит новую конфигурацию
struct PlannedUpdate<'s> {
    output: &'s OutputSnapshot,
    placement: Placement,
    mode: ModeInfo,
}

impl PlannedUpdate<'_> {
    fn occupied(&self) -> Size {
        self.placement.rotation.occupied(self.mode.size())
    }
}

/// Наименьший прямоугольник от (0,0), в который помещаются все размещения
/// с учётом поворота.
pub fn screen_bounds(placements: &[(Position, Size, Rotation)]) -> Size {
    placements
        .iter()
        .fold(Size::default(), |bounds, &(position, mode, rotation)| {
            let occupied = rotation.occupied(mode);
            let right = (position.x.max(0) as u32) + occupied.width;
            let bottom = (position.y.max(0) as u32) + occupied.height;
            Size::new(bounds.width.max(right), bounds.height.max(bottom))
        })
}

/// Физический размер экрана по плотности основного выхода (по высоте)
fn physical_size(bounds: Size, primary: Option<(&OutputInfo, ModeInfo)>) -> (u32, u32) {
    match primary {
        Some((info, mode)) if mode.height > 0 && info.mm_height > 0 => {
            let mm_per_px = f64::from(info.mm_height) / f64::from(mode.height);
            (
                (f64::from(bounds.width) * mm_per_px).round() as u32,
                (f64::from(bounds.height) * mm_per_px).round() as u32,
            )
        }
        _ => (0, 0),
    }
}

pub struct ReconfigurationTransaction<'a> {
    backend: &'a dyn DisplayBackend,
    state: TransactionState,
    updated: Vec<String>,
}

impl<'a> ReconfigurationTransaction<'a> {
    pub fn new(backend: &'a dyn DisplayBackend) -> Self {
        Self {
            backend,
            state: TransactionState::Idle,
            updated: Vec::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn advance(&mut self, next: TransactionState) {
        debug!("Транзакция: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Применить раскладку. Возвращает итоговый размер экрана.
    pub fn apply(&mut self, snapshot: &DisplaySnapshot, resolved: &ResolvedLayout) -> Result<ScreenSize> {
        let mut disables: Vec<CrtcId> = snapshot.stale_crtcs.clone();
        let mut updates = Vec::new();

        for output in &snapshot.outputs {
            match resolved.placement_for(output.id) {
                Some(placement) => {
                    let mode = output.mode.ok_or_else(|| AppError::MissingMode {
                        output: output.info.name.clone(),
                    })?;
                    updates.push(PlannedUpdate {
                        output,
                        placement,
                        mode,
                    });
                }
                None => {
                    if let Some(crtc) = output.info.crtc {
                        disables.push(crtc);
                    }
                }
            }
        }

        // Без единого включённого выхода сервер остался бы с пустым экраном
        if updates.is_empty() {
            return Err(AppError::EmptyLayout {
                layout: resolved.policy.clone(),
            });
        }

        let bounds = screen_bounds(
            &updates
                .iter()
                .map(|u| (u.placement.position, u.mode.size(), u.placement.rotation))
                .collect::<Vec<_>>(),
        );

        let primary = updates.iter().find(|u| u.placement.primary);
        if primary.is_none() {
            warn!(
                "Раскладка '{}': основной выход не задан, физический размер экрана будет 0x0 мм",
                resolved.policy
            );
        }
        let primary_info = primary.map(|u| (&u.output.info, u.mode));
        let (width_mm, height_mm) = physical_size(bounds, primary_info);
        let target = ScreenSize {
            width: bounds.width,
            height: bounds.height,
            width_mm,
            height_mm,
        };

        info!(
            "Раскладка '{}': выключить CRTC {:?}, обновить выходов {}, экран {}x{} ({}x{} мм)",
            resolved.policy,
            disables,
            updates.len(),
            target.width,
            target.height,
            target.width_mm,
            target.height_mm
        );

        let result = self.execute(&disables, &updates, target, primary.map(|u| u.output.id));
        self.advance(TransactionState::ServerUngrabbed);

        if let Err(e) = &result {
            if self.updated.is_empty() {
                error!("Транзакция прервана до изменения выходов: {}", e);
            } else {
                error!(
                    "Транзакция прервана, уже обновлены выходы {:?}: {}",
                    self.updated, e
                );
            }
        }

        result
    }

    fn execute(
        &mut self,
        disables: &[CrtcId],
        updates: &[PlannedUpdate<'_>],
        target: ScreenSize,
        primary: Option<OutputId>,
    ) -> Result<ScreenSize> {
        let backend = self.backend;
        let _grab = ServerGrab::acquire(backend)?;
        self.advance(TransactionState::ServerGrabbed);

        for &crtc in disables {
            backend.disable_crtc(crtc)?;
            debug!("CRTC {} выключен", crtc);
        }
        self.advance(TransactionState::CrtcsDisabled);

        // CRTC за пределами текущего экрана сервер не примет
        let current = backend.current_screen_size()?;
        let grown = Size::new(current.width.max(target.width), current.height.max(target.height));
        if grown != current {
            debug!(
                "Экран временно расширен {}x{} -> {}x{}",
                current.width, current.height, grown.width, grown.height
            );
            backend.set_screen_size(&ScreenSize {
                width: grown.width,
                height: grown.height,
                width_mm: target.width_mm.max(1),
                height_mm: target.height_mm.max(1),
            })?;
        }

        let mut assigned: HashSet<CrtcId> = HashSet::new();
        for update in updates {
            let crtc = self.assign_crtc(update.output, &assigned, disables)?;
            assigned.insert(crtc);

            let config = CrtcConfig {
                position: update.placement.position,
                mode: Some(update.mode.id),
                rotation: update.placement.rotation,
                outputs: vec![update.output.id],
            };
            backend.set_crtc_config(crtc, &config)?;

            let occupied = update.occupied();
            info!(
                "Выход {} -> CRTC {}: {}x{}{}",
                update.output.info.name, crtc, occupied.width, occupied.height, update.placement
            );
            self.updated.push(update.output.info.name.clone());
        }
        self.advance(TransactionState::CrtcsUpdated);

        backend.set_screen_size(&target)?;
        if let Some(output) = primary {
            backend.set_output_primary(output)?;
        }
        self.advance(TransactionState::ScreenSized);

        backend.flush()?;
        self.advance(TransactionState::Flushed);

        Ok(target)
    }

    /// Активный CRTC выхода, иначе первый свободный совместимый
    fn assign_crtc(
        &self,
        output: &OutputSnapshot,
        assigned: &HashSet<CrtcId>,
        disabled: &[CrtcId],
    ) -> Result<CrtcId> {
        if let Some(crtc) = output.info.crtc {
            if !disabled.contains(&crtc) && !assigned.contains(&crtc) {
                return Ok(crtc);
            }
        }

        for &crtc in &output.info.crtcs {
            if assigned.contains(&crtc) {
                continue;
            }
            let info = self.backend.crtc_info(crtc)?;
            if info.is_unused() && info.possible.contains(&output.id) {
                debug!("Выходу {} назначен свободный CRTC {}", output.info.name, crtc);
                return Ok(crtc);
            }
        }

        Err(AppError::NoUsableCrtc {
            output: output.info.name.clone(),
        })
    }
}
