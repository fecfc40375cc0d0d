// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! jvd: the jeeves viewer daemon.

use fs2::FileExt;
use jv_engine::IssueLifecycle;
use jv_server::{Listener, ServerCtx};
use jv_store::{Layout, Store};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let layout = Layout::resolve();
    std::fs::create_dir_all(layout.root())?;

    let file_appender = tracing_appender::rolling::daily(layout.root().join("logs"), "jvd.log");
    let (writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    // One daemon per data root.
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(layout.lock_path())?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(format!(
            "another jvd already owns {}",
            layout.root().display()
        )
        .into());
    }

    let store = Arc::new(Store::open(layout.root())?);
    let lifecycle = IssueLifecycle::new(layout.clone(), store);
    lifecycle.ensure_workflow_content()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let socket_path = layout.root().join("jvd.sock");
        let _ = std::fs::remove_file(&socket_path);
        let unix = tokio::net::UnixListener::bind(&socket_path)?;
        tracing::info!(socket = %socket_path.display(), "jvd listening");

        let ctx = Arc::new(ServerCtx::new(lifecycle));
        Listener::new(unix, ctx).run().await;
        Ok(())
    })
}
