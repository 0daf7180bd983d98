use clap::Parser;
use otpradius_server::{
    Args, Authenticator, AuthenticatorKind, Config, EapAuthenticator, Handler, HealthServer,
    PacketServer, Server, TotpAuthenticator,
};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if args.validate {
        println!("Configuration is valid");
        println!("  RADIUS: {}", config.bind_addr);
        println!("  Health: {}", config.health_addr);
        println!("  Authenticator: {:?}", config.authenticator);
        match config.allowed_client_sources {
            Some(network) => println!("  Allowed client sources: {}", network),
            None => println!("  Allowed client sources: any"),
        }
        if config.valid_users.is_empty() {
            println!("  Valid users: any");
        } else {
            println!("  Valid users: {}", config.valid_users.join(", "));
        }
        process::exit(0);
    }

    info!("otpradius v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let authenticator: Arc<dyn Authenticator> = match config.authenticator {
        AuthenticatorKind::Totp => {
            if config.valid_users.is_empty() {
                warn!("No valid users configured, any username with a correct code is accepted");
            }
            Arc::new(
                TotpAuthenticator::new(config.totp.clone())
                    .with_valid_users(config.valid_users.clone()),
            )
        }
        AuthenticatorKind::Eap => {
            warn!("EAP authenticator selected; PEAP is not implemented, every request is rejected");
            Arc::new(EapAuthenticator::new())
        }
    };

    match config.allowed_client_sources {
        Some(network) => info!("Accepting clients from {}", network),
        None => warn!("No allowed client sources configured, accepting requests from any address"),
    }

    let handler =
        Handler::new(authenticator).with_allowed_client_sources(config.allowed_client_sources);
    let radius =
        PacketServer::bind(config.bind_addr, config.client_secret.clone(), Arc::new(handler))
            .await?;
    let health = HealthServer::bind(config.health_addr).await?;

    Server::new(Arc::new(radius), Arc::new(health))
        .with_shutdown_grace(config.shutdown_grace)
        .run(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Listening for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Listening for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
