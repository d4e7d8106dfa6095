//! Atelier Client - storefront commerce core.
//!
//! Implements the quotation/order lifecycle state machine, the payment
//! ledger that gates production, and the real-time chat channel that
//! follows the customer's active commerce entity. The embedding
//! application supplies the UI and the concrete chat transport; this
//! crate owns the semantics.

use std::path::Path;
use std::sync::Once;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod channel;
pub mod chat;
pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod order;
pub mod payments;
pub mod quotation;
pub mod storefront;

pub use config::StorefrontConfig;
pub use error::{ChatError, CommerceError};
pub use storefront::{start_refresh_loop, Storefront};

static LOGGING_INIT: Once = Once::new();

/// Initialize structured logging (console, plus a daily-rolling file when
/// `log_dir` is given). Safe to call more than once; only the first call
/// installs the subscriber.
pub fn init_logging(log_dir: Option<&Path>) {
    LOGGING_INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,atelier_client_lib=debug"));

        let console_layer = fmt::layer().with_target(true);
        let registry = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer);

        match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).ok();
                let file_appender = tracing_appender::rolling::daily(dir, "atelier");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let file_layer = fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true);
                registry.with(file_layer).init();
                // Keep the guard alive for the process lifetime — dropping
                // it would stop flushing file logs.
                std::mem::forget(guard);
            }
            None => registry.init(),
        }

        info!("Atelier client core v{} logging ready", env!("CARGO_PKG_VERSION"));
    });
}
