use std::path::Path;
use std::sync::Once;

use library_catalog::{Catalog, StoreConfig};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Open a catalogue stored in `dir`, with cheap password hashing.
pub fn open_catalog(dir: &Path) -> anyhow::Result<Catalog> {
    init_tracing();
    let config = StoreConfig {
        password_memory_kib: 8,
        password_passes: 1,
        ..StoreConfig::with_path(dir.join("database").join("books_db.sqlite"))
    };
    Ok(Catalog::connect(config)?)
}
