//! memory-palace: stdio entry point for the memory engine.
//!
//! Spec §6 treats the request/response framing itself as an external
//! collaborator — "an external stdio transport delivers decoded calls and
//! returns encoded replies." This binary is the minimal line-delimited-JSON
//! incarnation of that transport: one `Operation` (§protocol) per line of
//! stdin, one `Envelope` per line of stdout. A host that wants richer
//! framing (length-prefixed, MCP, etc.) wraps this same `Engine` instead.
//!
//! Grounded on the teacher's own binary entry points (`tracing_subscriber`
//! env-filter init, then a run loop) — generalized here from an HTTP
//! accept loop to a stdin read loop, since this engine's transport is
//! stdio, not a socket.

use std::io::{self, BufRead, Write};

use memory_palace_core::config::ConfigStore;
use memory_palace_core::engine::Engine;
use memory_palace_core::protocol::{Envelope, Operation};
use memory_palace_core::store::StoreLayout;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn resolve_store_root() -> io::Result<std::path::PathBuf> {
    if let Ok(explicit) = std::env::var("OPEN_PALACE_HOME") {
        return Ok(std::path::PathBuf::from(explicit));
    }
    StoreLayout::default_root()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[tokio::main]
async fn main() -> io::Result<()> {
    init_tracing();

    let root = resolve_store_root()?;
    let layout = StoreLayout::new(root);
    let config = ConfigStore::load_or_init(layout.config_path())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    // No in-process sampling reference is available over stdio: a host that
    // wants the `sampling` strategy wired in embeds this crate directly and
    // passes its own callback to `Engine::new` instead of running this
    // binary. Over stdio the engine falls back to `direct` whenever
    // `config.llm.mode` asks for `auto` or `sampling`.
    let engine = match Engine::new(layout, config, None) {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize memory engine store");
            return Err(io::Error::new(io::ErrorKind::Other, err.to_string()));
        }
    };

    tracing::info!("memory-palace ready, reading operations from stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match serde_json::from_str::<Operation>(trimmed) {
            Ok(op) => match engine.dispatch(op).await {
                Ok(value) => Envelope::ok(value),
                Err(err) => {
                    tracing::warn!(error = %err, "operation failed");
                    Envelope::err(&err)
                }
            },
            Err(parse_err) => {
                let err = memory_palace_core::error::Error::InvalidArgument(format!(
                    "malformed request: {parse_err}"
                ));
                Envelope::err(&err)
            }
        };

        let rendered = serde_json::to_string(&envelope)
            .unwrap_or_else(|_| r#"{"is_error":true,"text":"failed to encode response"}"#.to_string());
        writeln!(stdout, "{rendered}")?;
        stdout.flush()?;
    }

    Ok(())
}
