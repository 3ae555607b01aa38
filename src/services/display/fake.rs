//! In-memory display server used by tests.

use super::backend::*;
use crate::app_error;
use crate::error::Result;
use crate::hints::{CrtcId, ModeId, OutputId, Position, Rotation, Size};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Вызов протокола, записанный фейком
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCall {
    Grab,
    Ungrab,
    Flush,
    SetCrtc(CrtcId, CrtcConfig),
    SetScreenSize(ScreenSize),
    SetPrimary(OutputId),
}

#[derive(Default)]
struct FakeState {
    outputs: BTreeMap<OutputId, (OutputInfo, Option<Vec<u8>>)>,
    crtcs: BTreeMap<CrtcId, CrtcInfo>,
    modes: Vec<ModeInfo>,
    screen: Size,
    events: VecDeque<DisplayChange>,
    calls: Vec<DisplayCall>,
    failing_crtc: Option<CrtcId>,
    selected: bool,
}

#[derive(Clone, Default)]
pub struct FakeDisplay {
    state: Arc<Mutex<FakeState>>,
}

pub fn fake_edid(name: &str) -> Vec<u8> {
    let mut data = vec![0u8; 128];
    data[..8].copy_from_slice(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    data[54] = 0x3A;
    let offset = 72;
    data[offset + 3] = 0xFC;
    let mut payload = [0x20u8; 13];
    let len = name.len().min(13);
    payload[..len].copy_from_slice(&name.as_bytes()[..len]);
    if len < 13 {
        payload[len] = 0x0A;
    }
    data[offset + 5..offset + 18].copy_from_slice(&payload);
    data
}

impl FakeDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mode(&self, id: ModeId, width: u32, height: u32) {
        self.state.lock().modes.push(ModeInfo { id, width, height });
    }

    pub fn add_crtc(&self, crtc: CrtcId, possible: &[OutputId]) {
        self.state.lock().crtcs.insert(
            crtc,
            CrtcInfo {
                possible: possible.to_vec(),
                ..Default::default()
            },
        );
    }

    pub fn add_output(
        &self,
        output: OutputId,
        name: &str,
        crtcs: &[CrtcId],
        modes: &[ModeId],
        monitor_name: Option<&str>,
    ) {
        let info = OutputInfo {
            name: name.to_string(),
            connected: true,
            crtc: None,
            crtcs: crtcs.to_vec(),
            modes: modes.to_vec(),
            mm_width: 600,
            mm_height: 340,
        };
        self.state
            .lock()
            .outputs
            .insert(output, (info, monitor_name.map(fake_edid)));
    }

    pub fn set_physical_size(&self, output: OutputId, mm_width: u32, mm_height: u32) {
        if let Some((info, _)) = self.state.lock().outputs.get_mut(&output) {
            info.mm_width = mm_width;
            info.mm_height = mm_height;
        }
    }

    pub fn disconnect(&self, output: OutputId) {
        if let Some((info, edid)) = self.state.lock().outputs.get_mut(&output) {
            info.connected = false;
            *edid = None;
        }
    }

    /// Включить CRTC на выходе, минуя журнал вызовов
    pub fn activate(&self, crtc: CrtcId, output: OutputId, mode: ModeId, x: i32, y: i32, rotation: Rotation) {
        let mut state = self.state.lock();
        let size = state
            .modes
            .iter()
            .find(|m| m.id == mode)
            .map(|m| m.size())
            .unwrap_or_default();
        if let Some(info) = state.crtcs.get_mut(&crtc) {
            info.mode = Some(mode);
            info.position = Position::new(x, y);
            info.size = size;
            info.rotation = rotation;
            info.outputs = vec![output];
        }
        if let Some((info, _)) = state.outputs.get_mut(&output) {
            info.crtc = Some(crtc);
        }
    }

    pub fn set_screen(&self, width: u32, height: u32) {
        self.state.lock().screen = Size::new(width, height);
    }

    pub fn fail_on_crtc(&self, crtc: CrtcId) {
        self.state.lock().failing_crtc = Some(crtc);
    }

    pub fn push_event(&self, change: DisplayChange) {
        self.state.lock().events.push_back(change);
    }

    pub fn calls(&self) -> Vec<DisplayCall> {
        self.state.lock().calls.clone()
    }

    pub fn grab_count(&self) -> usize {
        self.count(|c| matches!(c, DisplayCall::Grab))
    }

    pub fn ungrab_count(&self) -> usize {
        self.count(|c| matches!(c, DisplayCall::Ungrab))
    }

    pub fn is_selected(&self) -> bool {
        self.state.lock().selected
    }

    fn count(&self, pred: impl Fn(&DisplayCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }
}

impl DisplayBackend for FakeDisplay {
    fn screen_resources(&self) -> Result<ScreenResources> {
        let state = self.state.lock();
        Ok(ScreenResources {
            outputs: state.outputs.keys().copied().collect(),
            crtcs: state.crtcs.keys().copied().collect(),
            modes: state.modes.clone(),
        })
    }

    fn output_info(&self, output: OutputId) -> Result<OutputInfo> {
        self.state
            .lock()
            .outputs
            .get(&output)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| app_error!(internal, "нет выхода {}", output))
    }

    fn crtc_info(&self, crtc: CrtcId) -> Result<CrtcInfo> {
        self.state
            .lock()
            .crtcs
            .get(&crtc)
            .cloned()
            .ok_or_else(|| app_error!(internal, "нет CRTC {}", crtc))
    }

    fn output_edid(&self, output: OutputId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .state
            .lock()
            .outputs
            .get(&output)
            .and_then(|(_, edid)| edid.clone()))
    }

    fn current_screen_size(&self) -> Result<Size> {
        Ok(self.state.lock().screen)
    }

    fn set_crtc_config(&self, crtc: CrtcId, config: &CrtcConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(DisplayCall::SetCrtc(crtc, config.clone()));

        if state.failing_crtc == Some(crtc) {
            return Err(app_error!(internal, "SetCrtcConfig для {} отклонён", crtc));
        }

        let size = config
            .mode
            .and_then(|id| state.modes.iter().find(|m| m.id == id))
            .map(|m| m.size())
            .unwrap_or_default();

        let previous = state
            .crtcs
            .get(&crtc)
            .map(|c| c.outputs.clone())
            .unwrap_or_default();
        for output in previous {
            if let Some((info, _)) = state.outputs.get_mut(&output) {
                info.crtc = None;
            }
        }
        for output in &config.outputs {
            if let Some((info, _)) = state.outputs.get_mut(output) {
                info.crtc = Some(crtc);
            }
        }

        let info = state
            .crtcs
            .get_mut(&crtc)
            .ok_or_else(|| app_error!(internal, "нет CRTC {}", crtc))?;
        info.mode = config.mode;
        info.position = config.position;
        info.rotation = config.rotation;
        info.size = size;
        info.outputs = config.outputs.clone();
        Ok(())
    }

    fn set_screen_size(&self, size: &ScreenSize) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(DisplayCall::SetScreenSize(*size));
        state.screen = Size::new(size.width, size.height);
        Ok(())
    }

    fn set_output_primary(&self, output: OutputId) -> Result<()> {
        self.state.lock().calls.push(DisplayCall::SetPrimary(output));
        Ok(())
    }

    fn grab_server(&self) -> Result<()> {
        self.state.lock().calls.push(DisplayCall::Grab);
        Ok(())
    }

    fn ungrab_server(&self) -> Result<()> {
        self.state.lock().calls.push(DisplayCall::Ungrab);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.state.lock().calls.push(DisplayCall::Flush);
        Ok(())
    }

    fn select_change_events(&self) -> Result<()> {
        self.state.lock().selected = true;
        Ok(())
    }

    fn clear_change_events(&self) -> Result<()> {
        self.state.lock().selected = false;
        Ok(())
    }

    fn poll_change_event(&self) -> Result<Option<DisplayChange>> {
        Ok(self.state.lock().events.pop_front())
    }
}
