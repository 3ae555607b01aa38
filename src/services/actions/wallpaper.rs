use crate::config::{ActionConfig, WallpaperConfig};
use crate::error::{AppError, Result};
use crate::hints::MonitorHint;
use crate::services::display::{query_monitors, SharedDisplay};
use crate::services::listeners::CorrelatedValues;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::command::run_program;
use super::r#trait::Action;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// Обои: по случайной картинке на каждый активный экран.
///
/// Картинки одного запуска не повторяются, а показанные в прошлый раз
/// пропускаются, пока хватает других. Загрузкой и кадрированием занимается
/// внешняя программа.
pub struct WallpaperAction {
    defaults: WallpaperConfig,
    display: Option<SharedDisplay>,
    shown: Mutex<Vec<PathBuf>>,
}

impl WallpaperAction {
    pub const NAME: &'static str = "wallpaper";

    pub fn new(defaults: WallpaperConfig, display: Option<SharedDisplay>) -> Self {
        Self {
            defaults,
            display,
            shown: Mutex::new(Vec::new()),
        }
    }

    fn directory(&self, config: &ActionConfig) -> Result<PathBuf> {
        config
            .params
            .get("directory")
            .map(PathBuf::from)
            .or_else(|| self.defaults.directory.clone())
            .ok_or_else(|| AppError::action(Self::NAME, "не задан каталог с обоями"))
    }

    fn setter(&self, config: &ActionConfig) -> Vec<String> {
        match config.params.get("setter") {
            Some(setter) => setter.split_whitespace().map(str::to_string).collect(),
            None => self.defaults.setter.clone(),
        }
    }

    /// Геометрия на момент запуска: предыдущие действия правила
    /// (например, `layout`) могли её уже поменять.
    async fn monitors(&self, values: &CorrelatedValues) -> Result<Option<Vec<MonitorHint>>> {
        match &self.display {
            Some(display) => {
                let backend = display.lock().await;
                Ok(Some(query_monitors(backend.as_ref())?))
            }
            None => Ok(values.monitors().map(<[MonitorHint]>::to_vec)),
        }
    }

    #[cfg(test)]
    fn shown(&self) -> Vec<PathBuf> {
        self.shown.lock().clone()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Картинки каталога и его подкаталогов в порядке путей
pub async fn collect_images(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let mut pending = vec![directory.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if is_image(&path) {
                images.push(path);
            }
        }
    }

    images.sort();
    Ok(images)
}

/// Число активных экранов; без сведений о мониторах - один
pub fn screen_count(monitors: Option<&[MonitorHint]>) -> usize {
    monitors
        .unwrap_or_default()
        .iter()
        .filter(|m| m.screen.is_some())
        .count()
        .max(1)
}

/// `count` разных случайных картинок, не из `shown`.
///
/// Если непоказанных не хватает, выбор идёт из всех; если картинок
/// меньше, чем экранов, они повторяются.
pub fn pick_images<R: Rng + ?Sized>(
    rng: &mut R,
    images: &[PathBuf],
    count: usize,
    shown: &[PathBuf],
) -> Vec<PathBuf> {
    if images.is_empty() || count == 0 {
        return Vec::new();
    }

    let fresh: Vec<&PathBuf> = images.iter().filter(|p| !shown.contains(p)).collect();
    let pool: Vec<&PathBuf> = if fresh.len() >= count {
        fresh
    } else {
        images.iter().collect()
    };

    let mut chosen: Vec<PathBuf> = pool
        .choose_multiple(rng, count.min(pool.len()))
        .map(|p| (*p).clone())
        .collect();

    if chosen.len() < count {
        let base = chosen.clone();
        chosen.extend(base.iter().cycle().take(count - base.len()).cloned());
    }
    chosen
}

#[async_trait::async_trait]
impl Action for WallpaperAction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, values: &CorrelatedValues, config: &ActionConfig) -> Result<()> {
        let directory = self.directory(config)?;
        let images = collect_images(&directory).await?;
        if images.is_empty() {
            return Err(AppError::action(
                Self::NAME,
                format!("в каталоге {} нет картинок", directory.display()),
            ));
        }

        let monitors = self.monitors(values).await?;
        let count = screen_count(monitors.as_deref());
        let chosen = {
            let shown = self.shown.lock();
            pick_images(&mut rand::thread_rng(), &images, count, &shown)
        };
        debug!("Обои: {:?}", chosen);

        let mut argv = self.setter(config);
        argv.extend(chosen.iter().map(|p| p.display().to_string()));
        run_program(Self::NAME, &argv).await?;

        info!("Обои установлены: {} экран(ов)", chosen.len());
        *self.shown.lock() = chosen;
        Ok(())
    }
}
