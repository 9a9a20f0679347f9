//! Command handlers.

use std::path::{Path, PathBuf};

use eyre::{bail, eyre, WrapErr};
use serde::Serialize;
use seedkeeper_core::{ExposeSecret, Phase, SessionManager, StoreBackend, StoreKind, WalletConfig};

use crate::output;
use crate::GlobalOpts;

#[derive(Serialize)]
struct StatusReport {
    phase: Phase,
    initialized: bool,
    backend: &'static str,
    data_dir: Option<String>,
    error: Option<String>,
}

struct Session {
    manager: SessionManager,
    backend: StoreBackend,
    data_dir: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> eyre::Result<WalletConfig> {
    let Some(path) = path else {
        return Ok(WalletConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config '{}'", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("invalid config '{}'", path.display()))
}

fn resolve_data_dir(opts: &GlobalOpts) -> Option<PathBuf> {
    opts.data_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|dir| dir.join("seedkeeper")))
}

/// Opens the store and refreshes the manager's state from it.
async fn open(opts: &GlobalOpts) -> eyre::Result<Session> {
    let config = load_config(opts.config.as_deref())?;
    let data_dir = resolve_data_dir(opts);
    tracing::debug!(data_dir = ?data_dir, namespace = %config.namespace, "opening store");

    let backend = StoreBackend::detect(data_dir.as_deref(), &config.namespace);
    let manager = SessionManager::from_backend(&backend, config)?;
    manager.check_initialization().await;
    Ok(Session {
        manager,
        backend,
        data_dir,
    })
}

fn password(opts: &GlobalOpts) -> eyre::Result<&str> {
    opts.password
        .as_deref()
        .filter(|password| !password.is_empty())
        .ok_or_else(|| eyre!("a password is required: pass --password or set SEEDKEEPER_PASSWORD"))
}

const fn backend_name(kind: StoreKind) -> &'static str {
    match kind {
        StoreKind::Durable => "durable",
        StoreKind::Development => "development (not persistent)",
    }
}

/// `seedkeeper status`
pub async fn status(opts: &GlobalOpts) -> eyre::Result<()> {
    let session = open(opts).await?;
    let state = session.manager.state();
    let durable = session.backend.kind() == StoreKind::Durable;
    output::print_value(
        &StatusReport {
            phase: state.phase(),
            initialized: state.is_initialized,
            backend: backend_name(session.backend.kind()),
            data_dir: session
                .data_dir
                .filter(|_| durable)
                .map(|dir| dir.display().to_string()),
            error: state.error,
        },
        opts.json,
    );
    Ok(())
}

/// `seedkeeper init --seed <PHRASE>`; leaves the wallet locked.
pub async fn init(opts: &GlobalOpts, seed: &str) -> eyre::Result<()> {
    let password = password(opts)?;
    if seed.trim().is_empty() {
        bail!("the seed phrase must not be empty");
    }
    let session = open(opts).await?;
    if session.backend.kind() == StoreKind::Development {
        tracing::warn!("no usable data directory; the wallet will be lost when this process exits");
    }
    session
        .manager
        .try_initialize(password, seed)
        .await
        .wrap_err("failed to create wallet")?;
    session.manager.lock().await;
    output::print_success("wallet created", opts.json);
    Ok(())
}

/// `seedkeeper unlock`: verifies the password and locks again.
pub async fn unlock(opts: &GlobalOpts) -> eyre::Result<()> {
    let password = password(opts)?;
    let session = open(opts).await?;
    session.manager.try_unlock(password).await?;
    session.manager.lock().await;
    output::print_success("password verified", opts.json);
    Ok(())
}

/// `seedkeeper show-seed`
pub async fn show_seed(opts: &GlobalOpts) -> eyre::Result<()> {
    let password = password(opts)?;
    let session = open(opts).await?;
    session.manager.try_unlock(password).await?;
    let seed = session.manager.get_seed_phrase().await;
    session.manager.lock().await;
    let seed = seed?;

    if opts.json {
        println!("{}", serde_json::json!({ "seed": seed.expose_secret() }));
    } else {
        println!("{}", seed.expose_secret());
    }
    Ok(())
}

/// `seedkeeper clear --yes`
pub async fn clear(opts: &GlobalOpts, yes: bool) -> eyre::Result<()> {
    if !yes {
        bail!("refusing to delete the wallet without --yes");
    }
    let session = open(opts).await?;
    session.manager.try_clear().await.wrap_err("failed to clear wallet")?;
    output::print_success("wallet cleared", opts.json);
    Ok(())
}
