use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

mod config;
mod error;
mod hints;
mod services;
mod utils;

use config::{Config, LoggingConfig};
use services::layout::{create_policies, LayoutResolver};
use services::rules::register_rules;
use services::{
    create_dispatcher, create_sources, BootstrapGate, DetectionAggregator, LayoutAction,
    ListenerRegistry, SharedDisplay, X11Display,
};

#[derive(Parser, Debug)]
#[command(name = "deskctx")]
#[command(about = "Перестраивает мониторы и запускает действия при смене окружения")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "deskctx.toml")]
    config: String,

    /// Режим сухого запуска (без реальных действий)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Вывести по одному снимку каждого источника и выйти
    #[arg(long)]
    query: bool,

    /// Один раз применить подходящую раскладку и выйти
    #[arg(long, conflicts_with_all = ["query", "dry_run"])]
    apply_layout: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    init_tracing(args.log_level.as_deref(), &config.logging)?;

    info!("Запуск deskctx v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - реальные действия отключены");
    }

    // Соединение с X-сервером общее для источника мониторов и раскладок
    let display = if args.dry_run {
        None
    } else {
        match X11Display::connect(None) {
            Ok(display) => Some(SharedDisplay::new(display)),
            Err(e) if args.apply_layout => return Err(e.into()),
            Err(e) => {
                error!("X-сервер недоступен, мониторы отслеживаться не будут: {}", e);
                None
            }
        }
    };

    if args.apply_layout {
        let display = display.context("Нет соединения с X-сервером")?;
        let resolver = LayoutResolver::new(create_policies(&config.layouts)?);
        let action = LayoutAction::new(display, resolver);

        match action.apply().await? {
            Some(screen) => info!("Раскладка применена: экран {}x{}", screen.width, screen.height),
            None => warn!("Ни одна раскладка не подошла, конфигурация не изменена"),
        }
        return Ok(());
    }

    let sources = create_sources(config.clone(), display.clone(), args.dry_run)?;
    let mut aggregator =
        DetectionAggregator::new(sources, BootstrapGate::from_config(&config.detection));

    if args.query {
        for (kind, result) in aggregator.query_all().await {
            match result {
                Ok(value) => println!("{}: {}", kind, value),
                Err(e) => println!("{}: ошибка: {}", kind, e),
            }
        }
        return Ok(());
    }

    // Инициализация компонентов
    let dispatcher = Arc::new(create_dispatcher(config.clone(), display, args.dry_run)?);
    let mut registry = ListenerRegistry::new();
    register_rules(&mut registry, &config.rules, dispatcher)?;
    if registry.is_empty() {
        warn!("Правила не заданы, изменения окружения будут только логироваться");
    }

    aggregator.start().await?;
    let events = aggregator.watch();

    info!("Все компоненты инициализированы");

    let mut registry_handle = tokio::spawn(registry.run(events));
    let mut registry_finished = false;

    info!("Все сервисы запущены");

    // Ожидание сигнала завершения
    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
            Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
        },
        _ = &mut registry_handle => {
            registry_finished = true;
            warn!("Поток событий закрыт: все источники остановились");
        }
    }

    info!("Завершение работы...");

    // Источники останавливаются сразу; начатые запуски правил доводятся до конца
    aggregator.stop().await;

    if !registry_finished {
        let shutdown_timeout = Duration::from_secs(5);
        match tokio::time::timeout(shutdown_timeout, registry_handle).await {
            Ok(_) => info!("Все правила завершили работу корректно"),
            Err(_) => warn!("Таймаут при завершении правил"),
        }
    }

    info!("deskctx завершил работу");
    Ok(())
}

fn init_tracing(cli_level: Option<&str>, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let directives = match cli_level {
        Some(level) => level.to_string(),
        None if !logging.filter.is_empty() => logging.filter.clone(),
        None => logging.level.clone(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    Ok(())
}
