use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use session_relay::api;
use session_relay::config::Config;
use session_relay::error::Result;
use session_relay::report::{HttpMailer, LogMailer, ReportMailer, ReportQueue, ReportSettings};
use session_relay::session::SessionCoordinator;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_mailer(config: &Config) -> Result<Arc<dyn ReportMailer>> {
    match HttpMailer::new(&config.mail)? {
        Some(mailer) => {
            tracing::info!("Report delivery via mail API enabled");
            Ok(Arc::new(mailer))
        }
        None => {
            tracing::warn!("MAIL_API_URL not set, reports will be written but not delivered");
            Ok(Arc::new(LogMailer))
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let reports = ReportQueue::new(
        build_mailer(&config)?,
        ReportSettings {
            output_dir: config.report.output_dir.clone(),
            timezone: config.report.timezone()?,
        },
    );
    let coordinator = SessionCoordinator::new(config.session.clone(), reports);

    let routes = api::routes::routes(coordinator, config.server.stun_server_url.clone());

    let (ip, port) = config.bind_address();
    tracing::info!(
        host = %config.server.host,
        port = port,
        grace_secs = config.session.grace_period.as_secs(),
        "Session relay listening"
    );
    warp::serve(routes).run((ip, port)).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Session relay failed to start");
        std::process::exit(1);
    }
}
