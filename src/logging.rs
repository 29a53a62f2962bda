use std::{
    io,
    path::PathBuf,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking::{self, WorkerGuard},
    rolling,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_DIR_ENV: &str = "CVARS_LOG_DIR";
const LOG_FILE_PREFIX: &str = "cvars.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static PANIC_HOOK: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber. Console output goes to stderr so report
/// JSON on stdout stays parseable; a daily file is added when
/// `CVARS_LOG_DIR` is set.
pub fn init() -> Result<()> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_target(false).with_writer(io::stderr);

    let (file_layer, guard) = match resolve_log_dir()? {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let (writer, guard) = non_blocking::NonBlockingBuilder::default()
                .lossy(false)
                .finish(rolling::daily(&dir, LOG_FILE_PREFIX));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    if subscriber.try_init().is_ok() {
        if let Some(guard) = guard {
            let _ = FILE_GUARD.set(guard);
        }
        install_panic_hook();
    }

    Ok(())
}

fn resolve_log_dir() -> Result<Option<PathBuf>> {
    let Ok(dir) = std::env::var(LOG_DIR_ENV) else {
        return Ok(None);
    };
    if dir.trim().is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(dir);
    if path.is_absolute() {
        return Ok(Some(path));
    }
    let base = std::env::current_dir().context("failed to resolve current working directory")?;
    Ok(Some(base.join(path)))
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                tracing::error!(
                    target: "panic",
                    file = location.file(),
                    line = location.line(),
                    message = %info
                );
            } else {
                tracing::error!(target: "panic", message = %info);
            }
            default_hook(info);
        }));
    });
}
