use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use zbus::proxy;

#[proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn start_session(&self) -> zbus::Result<String>;
    fn stop_session(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
    fn roster(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face-recognition attendance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a recognition session
    Start,
    /// Stop the running session and print its summary
    Stop,
    /// Show daemon status
    Status,
    /// Show enrolled students and their attendance counters
    Roster,
    /// List V4L2 capture devices (no daemon needed)
    Devices {
        /// Also capture one frame from this device
        #[arg(long)]
        probe: Option<String>,
    },
}

async fn proxy(system: bool) -> Result<AttendanceProxy<'static>> {
    tracing::debug!(system, "connecting to rollcalld");
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn list_devices(probe: Option<String>) -> Result<()> {
    let devices = rollcall_hw::Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for dev in &devices {
        println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }

    if let Some(path) = probe {
        let camera = rollcall_hw::Camera::open(&path).with_context(|| format!("cannot open {path}"))?;
        let frame = camera.capture_frame().context("capture failed")?;
        println!(
            "{path}: {}x{} {:?}, frame #{}{}",
            frame.width,
            frame.height,
            camera.fourcc,
            frame.sequence,
            if frame.is_dark { " (dark)" } else { "" }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let id = proxy(cli.system).await?.start_session().await?;
            println!("Session started: {id}");
        }
        Commands::Stop => {
            let summary = proxy(cli.system).await?.stop_session().await?;
            print_json(&summary)?;
        }
        Commands::Status => {
            let status = proxy(cli.system).await?.status().await?;
            print_json(&status)?;
        }
        Commands::Roster => {
            let roster = proxy(cli.system).await?.roster().await?;
            let identities: Vec<serde_json::Value> =
                serde_json::from_str(&roster).context("daemon returned invalid JSON")?;
            println!("{:<8} {:<16} {:>7} {:>7}", "ID", "NAME", "PRESENT", "ABSENT");
            for identity in identities {
                println!(
                    "{:<8} {:<16} {:>7} {:>7}",
                    identity["id"].as_str().unwrap_or("?"),
                    identity["label"].as_str().unwrap_or("?"),
                    identity["present"].as_u64().unwrap_or(0),
                    identity["absent"].as_u64().unwrap_or(0)
                );
            }
        }
        Commands::Devices { probe } => list_devices(probe)?,
    }

    Ok(())
}
