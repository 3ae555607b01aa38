/// Имя и серийный номер монитора из EDID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdidInfo {
    pub name: Option<String>,
    pub serial: Option<String>,
}

const HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
const DESCRIPTOR_OFFSETS: [usize; 4] = [54, 72, 90, 108];
const TAG_SERIAL: u8 = 0xFF;
const TAG_NAME: u8 = 0xFC;

/// Разбор базового блока EDID (128 байт).
///
/// Читаются только дескрипторы имени (0xFC) и серийного номера (0xFF);
/// при отсутствии текстового серийника берётся числовой из заголовка.
pub fn parse_edid(data: &[u8]) -> Option<EdidInfo> {
    if data.len() < 128 || data[..8] != HEADER {
        return None;
    }

    let mut info = EdidInfo::default();

    for offset in DESCRIPTOR_OFFSETS {
        let descriptor = &data[offset..offset + 18];
        // Дисплейный дескриптор, а не тайминг
        if descriptor[0] != 0 || descriptor[1] != 0 || descriptor[2] != 0 {
            continue;
        }
        match descriptor[3] {
            TAG_NAME => info.name = descriptor_text(&descriptor[5..]),
            TAG_SERIAL => info.serial = descriptor_text(&descriptor[5..]),
            _ => {}
        }
    }

    if info.serial.is_none() {
        let numeric = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        if numeric != 0 {
            info.serial = Some(numeric.to_string());
        }
    }

    Some(info)
}

fn descriptor_text(raw: &[u8]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0x0A).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..end]).trim().to_string();
    (!text.is_empty()).then_some(text)
}
