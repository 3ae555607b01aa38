use super::backend::*;
use crate::app_error;
use crate::error::Result;
use crate::hints::{CrtcId, OutputId, Position, Rotation, Size};
use crate::trace_if_enabled;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt};
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt as _, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::CURRENT_TIME;

/// 32 * u32 = 128 байт базового блока EDID
const EDID_LENGTH_WORDS: u32 = 32;

/// Реализация границы с дисплейным сервером через X11 RandR
pub struct X11Display {
    conn: RustConnection,
    root: Window,
    edid_atom: u32,
}

impl X11Display {
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(display)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| app_error!(source_unavailable, "X-сервер не вернул экран #{}", screen_num))?;

        let version = conn.randr_query_version(1, 5)?.reply()?;
        info!(
            "Подключение к X-серверу установлено, RandR {}.{}",
            version.major_version, version.minor_version
        );

        let edid_atom = conn.intern_atom(false, b"EDID")?.reply()?.atom;

        Ok(Self {
            conn,
            root,
            edid_atom,
        })
    }

    fn config_timestamp(&self) -> Result<u32> {
        Ok(self
            .conn
            .randr_get_screen_resources_current(self.root)?
            .reply()?
            .config_timestamp)
    }
}

fn non_zero(id: u32) -> Option<u32> {
    (id != 0).then_some(id)
}

fn rotation_from_x11(rotation: randr::Rotation) -> Rotation {
    let bits = u16::from(rotation);
    if bits & u16::from(randr::Rotation::ROTATE0) != 0 {
        Rotation::R0
    } else if bits & u16::from(randr::Rotation::ROTATE90) != 0 {
        Rotation::R90
    } else if bits & u16::from(randr::Rotation::ROTATE180) != 0 {
        Rotation::R180
    } else if bits & u16::from(randr::Rotation::ROTATE270) != 0 {
        Rotation::R270
    } else {
        Rotation::R0
    }
}

fn rotation_to_x11(rotation: Rotation) -> randr::Rotation {
    match rotation {
        Rotation::R0 => randr::Rotation::ROTATE0,
        Rotation::R90 => randr::Rotation::ROTATE90,
        Rotation::R180 => randr::Rotation::ROTATE180,
        Rotation::R270 => randr::Rotation::ROTATE270,
    }
}

fn to_i16(value: i32) -> Result<i16> {
    i16::try_from(value).map_err(|_| app_error!(internal, "координата {} вне диапазона X11", value))
}

fn to_u16(value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| app_error!(internal, "размер {} вне диапазона X11", value))
}

impl DisplayBackend for X11Display {
    fn screen_resources(&self) -> Result<ScreenResources> {
        let reply = self
            .conn
            .randr_get_screen_resources_current(self.root)?
            .reply()?;

        Ok(ScreenResources {
            outputs: reply.outputs,
            crtcs: reply.crtcs,
            modes: reply
                .modes
                .iter()
                .map(|m| ModeInfo {
                    id: m.id,
                    width: u32::from(m.width),
                    height: u32::from(m.height),
                })
                .collect(),
        })
    }

    fn output_info(&self, output: OutputId) -> Result<OutputInfo> {
        let reply = self.conn.randr_get_output_info(output, CURRENT_TIME)?.reply()?;

        Ok(OutputInfo {
            name: String::from_utf8_lossy(&reply.name).into_owned(),
            connected: reply.connection == randr::Connection::CONNECTED,
            crtc: non_zero(reply.crtc),
            crtcs: reply.crtcs,
            modes: reply.modes,
            mm_width: reply.mm_width,
            mm_height: reply.mm_height,
        })
    }

    fn crtc_info(&self, crtc: CrtcId) -> Result<CrtcInfo> {
        let reply = self.conn.randr_get_crtc_info(crtc, CURRENT_TIME)?.reply()?;

        Ok(CrtcInfo {
            position: Position::new(i32::from(reply.x), i32::from(reply.y)),
            size: Size::new(u32::from(reply.width), u32::from(reply.height)),
            mode: non_zero(reply.mode),
            rotation: rotation_from_x11(reply.rotation),
            outputs: reply.outputs,
            possible: reply.possible,
        })
    }

    fn output_edid(&self, output: OutputId) -> Result<Option<Vec<u8>>> {
        let reply = self
            .conn
            .randr_get_output_property(
                output,
                self.edid_atom,
                AtomEnum::ANY,
                0,
                EDID_LENGTH_WORDS,
                false,
                false,
            )?
            .reply()?;

        Ok((!reply.data.is_empty()).then_some(reply.data))
    }

    fn current_screen_size(&self) -> Result<Size> {
        let geometry = self.conn.get_geometry(self.root)?.reply()?;
        Ok(Size::new(u32::from(geometry.width), u32::from(geometry.height)))
    }

    fn set_crtc_config(&self, crtc: CrtcId, config: &CrtcConfig) -> Result<()> {
        let timestamp = self.config_timestamp()?;
        let reply = self
            .conn
            .randr_set_crtc_config(
                crtc,
                CURRENT_TIME,
                timestamp,
                to_i16(config.position.x)?,
                to_i16(config.position.y)?,
                config.mode.unwrap_or(0),
                rotation_to_x11(config.rotation),
                &config.outputs,
            )?
            .reply()?;

        if reply.status != randr::SetConfig::SUCCESS {
            return Err(app_error!(
                internal,
                "SetCrtcConfig для CRTC {} завершился со статусом {:?}",
                crtc,
                reply.status
            ));
        }
        Ok(())
    }

    fn set_screen_size(&self, size: &ScreenSize) -> Result<()> {
        self.conn
            .randr_set_screen_size(
                self.root,
                to_u16(size.width)?,
                to_u16(size.height)?,
                size.width_mm,
                size.height_mm,
            )?
            .check()?;
        Ok(())
    }

    fn set_output_primary(&self, output: OutputId) -> Result<()> {
        self.conn.randr_set_output_primary(self.root, output)?.check()?;
        Ok(())
    }

    fn grab_server(&self) -> Result<()> {
        self.conn.grab_server()?.check()?;
        Ok(())
    }

    fn ungrab_server(&self) -> Result<()> {
        self.conn.ungrab_server()?.check()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }

    fn select_change_events(&self) -> Result<()> {
        self.conn
            .randr_select_input(
                self.root,
                randr::NotifyMask::OUTPUT_CHANGE | randr::NotifyMask::CRTC_CHANGE,
            )?
            .check()?;
        self.conn.flush()?;
        Ok(())
    }

    fn clear_change_events(&self) -> Result<()> {
        self.conn
            .randr_select_input(self.root, randr::NotifyMask::from(0u16))?
            .check()?;
        self.conn.flush()?;
        Ok(())
    }

    fn poll_change_event(&self) -> Result<Option<DisplayChange>> {
        let event = match self.conn.poll_for_event()? {
            Some(event) => event,
            None => return Ok(None),
        };

        let change = match event {
            Event::RandrNotify(notify) if notify.sub_code == randr::Notify::OUTPUT_CHANGE => {
                let oc = notify.u.as_oc();
                DisplayChange::Output {
                    output: oc.output,
                    crtc: non_zero(oc.crtc),
                    mode: non_zero(oc.mode),
                    connected: oc.connection == randr::Connection::CONNECTED,
                }
            }
            Event::RandrNotify(notify) if notify.sub_code == randr::Notify::CRTC_CHANGE => {
                let cc = notify.u.as_cc();
                DisplayChange::Crtc {
                    crtc: cc.crtc,
                    mode: non_zero(cc.mode),
                }
            }
            other => {
                trace_if_enabled!("Пропущено событие X11: {:?}", other);
                DisplayChange::Other
            }
        };

        Ok(Some(change))
    }
}
