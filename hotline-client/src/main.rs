//! hlxfer - run a single Hotline file transfer from the command line

mod args;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hotline_client::transfers::{format_bytes, format_speed};
use hotline_client::{
    ControlEndpoint, TaskManager, TaskStatus, TransferEvent, TransferExecutor, TransferReply,
    TransferSettings,
};
use hotline_common::handshake::ReferenceNumber;

use args::{Args, Command, SessionArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut settings = match &args.config {
        Some(path) => match TransferSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => TransferSettings::default(),
    };
    settings.verify_certificates |= args.verify_certificates;
    settings.tolerate_short_reads |= args.tolerate_short_reads;
    if let Command::Download(download) = &args.command
        && let Some(dir) = &download.dir
    {
        settings.download_dir = Some(dir.clone());
    }
    debug!(?settings, "settings loaded");

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let tasks = Arc::new(TaskManager::new());
    let executor = TransferExecutor::new(Arc::clone(&tasks), settings, event_tx);

    let (id, handle) = match &args.command {
        Command::Download(download) => {
            let session = match resolve_session(&download.session).await {
                Ok(session) => session,
                Err(message) => {
                    eprintln!("{message}");
                    return ExitCode::FAILURE;
                }
            };
            let id =
                executor.queue_download(&download.name, download.session.folder_segments());
            let reply = TransferReply {
                reference: ReferenceNumber::from_u32(download.session.reference),
                transfer_size: download.size,
                file_size: download.file_size,
            };
            (id, executor.start_download(id, &session, reply))
        }
        Command::Upload(upload) => {
            let session = match resolve_session(&upload.session).await {
                Ok(session) => session,
                Err(message) => {
                    eprintln!("{message}");
                    return ExitCode::FAILURE;
                }
            };
            let id = match executor
                .queue_upload(&upload.file, upload.session.folder_segments())
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("{e}");
                    return ExitCode::FAILURE;
                }
            };
            let reply = TransferReply::new(
                ReferenceNumber::from_u32(upload.session.reference),
                upload.size,
            );
            (id, executor.start_upload(id, &session, reply))
        }
    };

    // The worker holds the only other sender; the loop ends when it finishes
    drop(executor);
    print_events(&tasks, event_rx).await;

    if let Err(e) = handle.await {
        error!(error = %e, "transfer worker panicked");
        return ExitCode::FAILURE;
    }

    report(&tasks, id)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve HOST[:PORT] into the control endpoint the transfer derives from
async fn resolve_session(session: &SessionArgs) -> Result<ControlEndpoint, String> {
    let (host, port) = session.host_and_port()?;
    let addr = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| format!("cannot resolve {}: {e}", session.server))?
        .next()
        .ok_or_else(|| format!("cannot resolve {}", session.server))?;

    Ok(ControlEndpoint::new(addr, session.tls).with_host(host))
}

async fn print_events(tasks: &TaskManager, mut events: mpsc::UnboundedReceiver<TransferEvent>) {
    let mut stderr = std::io::stderr();
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Progress {
                id,
                transferred_bytes,
            } => {
                let Some(task) = tasks.get(id) else { continue };
                let _ = write!(
                    stderr,
                    "\r{:>5.1}%  {} / {}  {}    ",
                    task.progress_percent(),
                    format_bytes(transferred_bytes),
                    format_bytes(task.total_bytes),
                    format_speed(task.speed),
                );
                let _ = stderr.flush();
            }
            TransferEvent::Status { status, .. } if status.is_finished() => {
                let _ = writeln!(stderr);
            }
            TransferEvent::Status { .. } => {}
        }
    }
}

fn report(tasks: &TaskManager, id: Uuid) -> ExitCode {
    let Some(task) = tasks.get(id) else {
        eprintln!("transfer task disappeared");
        return ExitCode::FAILURE;
    };

    match task.status {
        TaskStatus::Completed => {
            let location = task
                .local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| task.remote_display_path());
            println!(
                "{} {} ({}) in {:.1}s",
                task.direction,
                location,
                format_bytes(task.transferred_bytes),
                task.elapsed().as_secs_f64()
            );
            ExitCode::SUCCESS
        }
        status => {
            eprintln!(
                "{} {}: {}",
                task.direction,
                status,
                task.error.as_deref().unwrap_or("did not finish")
            );
            ExitCode::FAILURE
        }
    }
}
