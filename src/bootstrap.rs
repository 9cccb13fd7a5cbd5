//! Process setup: tracing and client construction.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing from the `DYNAREDIS_LOG` environment variable.
///
/// Defaults to "info" if unset. Does nothing if a global subscriber is
/// already installed.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Connect to DynamoDB and build a [`Client`](crate::Client) as configured.
#[cfg(feature = "dynamo")]
pub async fn connect(config: &crate::config::ClientConfig) -> crate::Result<crate::Client> {
    use std::sync::Arc;

    use crate::backend::DynamoBackend;

    let backend = DynamoBackend::connect(&config.dynamo, config.table.clone()).await?;
    Ok(crate::Client::with_config(Arc::new(backend), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!("tracing initialized twice");
    }
}
