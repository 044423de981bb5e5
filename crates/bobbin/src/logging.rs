use tracing::Level;

use crate::error::{BobbinError, BobbinResult};

/// Install a `fmt` subscriber printing events at `level` and above.
///
/// Fails instead of panicking when a global subscriber is already set.
pub fn init_logging(level: Level) -> BobbinResult<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|err| BobbinError::Logging(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error() {
        let _ = init_logging(Level::INFO);
        assert!(matches!(
            init_logging(Level::DEBUG),
            Err(BobbinError::Logging(_))
        ));
    }
}
