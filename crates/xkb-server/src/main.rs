//! xkb-server entry point.
//!
//! Wires the infrastructure adapters to the keyboard device and runs until
//! Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()             -- TOML file or defaults
//!  └─ LoadKeymapUseCase::load() -- built-in compiler, fallback keymap
//!  └─ KeyboardDevice::new()     -- behind a tokio Mutex
//!  └─ start tasks
//!       ├─ console client pump  (logs every notification)
//!       └─ AccessX timeout      (when enabled in the config)
//! ```

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use xkb_core::{
    changes::{ClientId, EventCause},
    keymap::{controls::ctrls, AtomTable},
    protocol::codec::{decode_event, WireOrder},
};
use xkb_server::application::{
    dispatch_notifications::{ClientRecord, ClientRegistry, NotificationDispatcher},
    keyboard_device::KeyboardDevice,
    load_keymap::{KeymapSource, LoadKeymapUseCase},
};
use xkb_server::infrastructure::{
    clients::ChannelConnection,
    compiler::BuiltinCompiler,
    feedback::LoggingFeedbackDevice,
    storage::config::{load_config, ServerConfig},
};

/// Client id of the built-in console listener.
const CONSOLE_CLIENT: ClientId = ClientId(0);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (ServerConfig::default(), Some(e)),
    };

    // Initialise structured logging.  `RUST_LOG` overrides the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    if let Some(e) = config_error {
        warn!("failed to load config, using defaults: {e}");
    }
    info!("xkb-server starting");

    // ── Keymap ────────────────────────────────────────────────────────────────
    let mut atoms = AtomTable::new();
    let loader = LoadKeymapUseCase::new(Arc::new(BuiltinCompiler));
    let source = KeymapSource::Components(config.keymap_components());
    let mut loaded = loader.load(&source, &mut atoms).await?;
    if loaded.fallback {
        warn!("running with the built-in keymap");
    }
    config.apply_to_controls(&mut loaded.keymap.ctrls);

    // ── Device and clients ────────────────────────────────────────────────────
    let clients = Arc::new(RwLock::new(ClientRegistry::new()));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&clients),
        config.server.event_base,
        config.server.device_id,
    ));
    let min = loaded.keymap.min_key_code;
    let max = loaded.keymap.max_key_code;
    let device = KeyboardDevice::new(
        loaded.keymap,
        dispatcher,
        Arc::new(LoggingFeedbackDevice::new()),
        config.accessx.bell_percent,
    );
    let device = Arc::new(Mutex::new(device));

    let (console, mut console_rx) = ChannelConnection::new(CONSOLE_CLIENT);
    {
        let mut record =
            ClientRecord::new(CONSOLE_CLIENT, WireOrder::native(), Arc::new(console), min, max);
        record.xkb_initialised = true;
        record.map_notify_mask = u16::MAX;
        record.new_keyboard_notify_mask = u16::MAX;
        clients
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .register(record);
    }
    if let Some(interest) = device.lock().await.add_client_resource(CONSOLE_CLIENT, 1) {
        interest.select_all();
    }

    // ── Console pump ──────────────────────────────────────────────────────────
    let event_base = config.server.event_base;
    tokio::spawn(async move {
        while let Some(bytes) = console_rx.recv().await {
            match decode_event(&bytes, event_base, WireOrder::native()) {
                Ok((header, event)) => debug!(seq = header.sequence, ?event, "notification"),
                Err(e) => debug!("undecodable notification: {e}"),
            }
        }
    });

    // ── AccessX timeout ───────────────────────────────────────────────────────
    if config.accessx.enabled && config.accessx.timeout_secs > 0 {
        let device = Arc::clone(&device);
        let timeout = Duration::from_secs(u64::from(config.accessx.timeout_secs));
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut device = device.lock().await;
            if device.keymap().ctrls.is_enabled(ctrls::ACCESSX_TIMEOUT) {
                info!("accessx timeout expired");
                device.accessx_timeout(&EventCause::default());
            }
        });
    }

    info!(device = config.server.device_id, "xkb-server ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    device.lock().await.beeper().cancel();
    info!("xkb-server stopped");
    Ok(())
}
