use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod backend;
mod bootstrap;
mod config;
mod dbus_interface;
mod delivery;
mod engine;
mod reconciler;
mod roster;
mod sampler;
mod session;
mod status;
#[cfg(test)]
mod testkit;

use config::{BusKind, Config};
use session::{SessionController, SessionSettings};
use status::{Phase, StatusBoard};

const BUS_NAME: &str = "org.rollcall.Attendance1";
const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    let config = Config::from_env();
    let status = StatusBoard::new();

    let (roster, references) = roster::load(&config.roster_path, &config.data_dir).context("failed to load roster")?;
    tracing::info!(students = roster.identities().len(), "roster loaded");

    status.set(Phase::ModelsLoading);
    let engine = match engine::spawn_engine(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
        &config.camera_device,
        config.warmup_frames,
    ) {
        Ok(engine) => engine,
        Err(e) => {
            status.set(Phase::ModelsUnavailable);
            return Err(e).context("failed to start vision engine");
        }
    };

    let gallery = bootstrap::load_gallery(&engine, references, &status).await;
    let gallery_ready = !gallery.is_empty();
    let matcher = Arc::new(rollcall_core::FaceMatcher::new(gallery, config.match_metric, config.match_threshold));

    let backend = Arc::new(backend::HttpBackend::new(&config.backend_url, config.backend_timeout)?);
    let (outbound, _delivery) = delivery::spawn_delivery(backend, config.delivery);

    let controller = SessionController::new(
        engine,
        matcher,
        Arc::new(parking_lot::Mutex::new(roster)),
        status.clone(),
        outbound,
        SessionSettings {
            sample_interval: config.sample_interval,
            sample_timeout: config.sample_timeout,
            snapshot_quality: config.snapshot_quality,
            mark_absent_on_stop: config.mark_absent_on_stop,
        },
    );
    let controller = Arc::new(tokio::sync::Mutex::new(controller));

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, dbus_interface::AttendanceService::new(Arc::clone(&controller)))?
        .build()
        .await
        .context("failed to register on D-Bus")?;
    tracing::info!(bus = ?config.bus, name = BUS_NAME, "D-Bus interface registered");
    tokio::spawn(dbus_interface::forward_phases(conn.clone(), OBJECT_PATH, status.subscribe()));

    if config.autostart && gallery_ready {
        if let Err(e) = controller.lock().await.start().await {
            tracing::warn!(error = %e, "autostart session failed");
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    let mut controller = controller.lock().await;
    if controller.is_active() {
        if let Err(e) = controller.stop().await {
            tracing::warn!(error = %e, "failed to stop session cleanly");
        }
    }

    Ok(())
}
