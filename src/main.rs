use clap::Parser;
use dotenvy::dotenv;
use s3_to_sftp::config::{SftpTarget, WorkerConfig};
use s3_to_sftp::infrastructure::sftp::{DEFAULT_SESSION_TIMEOUT, SftpRemote};
use s3_to_sftp::infrastructure::{queue, storage};
use s3_to_sftp::services::metrics::EmfMetricsSink;
use s3_to_sftp::{ControllerSettings, JobController};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relays S3 file notifications from SQS to an SFTP server", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Messages per poll (1-10)
    #[arg(short, long)]
    batch_size: Option<i32>,

    /// Assumed transfer throughput in MB/s
    #[arg(short, long)]
    throughput: Option<u64>,

    /// Lease safety margin percentage (1-100)
    #[arg(short, long)]
    margin: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut config = WorkerConfig::from_env();
    config.debug |= args.debug;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(throughput) = args.throughput {
        config.throughput_mbps = throughput;
    }
    if let Some(margin) = args.margin {
        config.margin_percent = margin;
    }
    let config = config.clamped();

    let default_filter = if config.debug {
        "s3_to_sftp=debug,metrics=debug"
    } else {
        "s3_to_sftp=info,metrics=info"
    };
    let filter = if config.debug {
        tracing_subscriber::EnvFilter::new(default_filter)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting S3 to SFTP relay...");
    info!(
        "⚙️  Batch={} Throughput={}MB/s Margin={}% Timeout={:?}",
        config.batch_size,
        config.throughput_mbps,
        config.margin_percent,
        config.operation_timeout()
    );

    let target = SftpTarget::from_env()?;
    let aws_config = storage::load_aws_config().await;
    let blob_store = storage::setup_storage(&aws_config);
    let job_queue = queue::setup_queue(&aws_config, &config).await?;
    let session_timeout = config
        .operation_timeout()
        .unwrap_or(DEFAULT_SESSION_TIMEOUT);
    let remote = Arc::new(SftpRemote::connect(&target, session_timeout).await?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let controller = JobController::new(
        job_queue,
        blob_store,
        remote,
        Arc::new(EmfMetricsSink),
        ControllerSettings::new(&config, &target),
        shutdown_rx,
    );

    if let Err(e) = controller.run().await {
        error!("❌ Relay terminated: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, finishing current job...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, finishing current job...");
        },
    }
}
