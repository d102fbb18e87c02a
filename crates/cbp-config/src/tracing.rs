// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

// Flushes the chrome trace on process exit; must stay alive for as long as
// events are recorded.
static CHROME_GUARD: OnceLock<Mutex<tracing_chrome::FlushGuard>> = OnceLock::new();

/// Configures the global tracing subscriber: an env-filtered fmt layer, plus
/// a chrome trace writer when `CBP_TRACE_CHROME` names a file.
pub fn init_tracing() -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stdout().is_terminal());
    let chrome_layer = chrome_trace_path().map(|path| {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file(path)
            .include_args(true)
            .build();
        let _ = CHROME_GUARD.set(Mutex::new(guard));
        layer
    });

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(chrome_layer)
        .init();

    Ok(())
}

fn chrome_trace_path() -> Option<PathBuf> {
    let raw = std::env::var_os("CBP_TRACE_CHROME")?;
    if raw.is_empty() {
        return None;
    }
    Some(PathBuf::from(raw))
}

/// Error emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialisation_is_rejected() {
        assert!(init_tracing().is_ok());
        assert!(matches!(init_tracing(), Err(InitError::AlreadyInitialised)));
    }
}
