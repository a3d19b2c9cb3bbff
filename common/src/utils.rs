// Common Crate - utils.rs
// common/src/utils.rs
use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

/// Setup tracing for the service.
///
/// `level` is one of `trace`, `debug`, `info`, `warn`, `error`; anything
/// unrecognised falls back to `info`.
pub fn setup_tracing(level: &str) -> Result<(), SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

fn parse_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}
