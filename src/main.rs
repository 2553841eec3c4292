use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pesapal_checkout::config::Config;
use pesapal_checkout::handlers;
use pesapal_checkout::models::{Customer, PaymentMethod, PaymentRequest};
use pesapal_checkout::orchestrator::{PaymentOrchestrator, PaymentOutcome};
use pesapal_checkout::payments::PesapalClient;
use pesapal_checkout::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "pesapal-checkout")]
#[command(about = "M-PESA checkout backed by the PesaPal v3 API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Run a single payment from the terminal
    Pay {
        /// Amount in KES
        #[arg(long)]
        amount: Decimal,
        /// Kenyan phone number (07XXXXXXXX, 01XXXXXXXX or 254XXXXXXXXX)
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        /// Customer display name
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        /// mpesa sends an STK push; card returns the hosted page URL
        #[arg(long, default_value = "mpesa", value_parser = parse_method)]
        method: PaymentMethod,
        /// Return after the push is sent instead of waiting for confirmation
        #[arg(long)]
        no_wait: bool,
    },
}

fn parse_method(s: &str) -> Result<PaymentMethod, String> {
    PaymentMethod::from_str(s).ok_or_else(|| format!("unknown payment method '{}'", s))
}

fn build_orchestrator(config: &Config) -> PaymentOrchestrator {
    let client = PesapalClient::new(&config.pesapal).unwrap_or_else(|e| {
        eprintln!("Failed to create PesaPal client: {}", e);
        std::process::exit(1);
    });

    PaymentOrchestrator::new(Arc::new(client), config.orchestrator_settings())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pesapal_checkout=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.pesapal.consumer_key.is_none() || config.pesapal.consumer_secret.is_none() {
        tracing::warn!(
            "PESAPAL_CONSUMER_KEY or PESAPAL_CONSUMER_SECRET not set, token requests will fail"
        );
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Pay {
            amount,
            phone,
            email,
            name,
            description,
            method,
            no_wait,
        } => {
            let request = PaymentRequest {
                amount,
                description,
                customer: Customer { email, phone, name },
                method,
            };
            let succeeded = pay(&config, request, no_wait).await;
            if !succeeded {
                std::process::exit(1);
            }
        }
    }
}

async fn serve(config: Config) {
    tracing::info!(
        "PesaPal environment: {:?} ({})",
        config.pesapal.environment,
        config.pesapal.api_base()
    );
    tracing::info!("IPN URL: {}", config.ipn_url);

    let state = AppState::new(build_orchestrator(&config));

    // Build the application router
    let app = handlers::app(state, config.rate_limit, &config.allowed_origins)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Checkout server listening on {}", addr);

    // Connect info feeds the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

/// Runs one attempt and reports it on stdout. Returns whether it succeeded.
async fn pay(config: &Config, request: PaymentRequest, no_wait: bool) -> bool {
    let orchestrator = build_orchestrator(config);
    let outcome = orchestrator.initiate(request).await;

    println!("{}", outcome.status_message());

    match outcome {
        PaymentOutcome::Pending {
            order_tracking_id,
            poll,
            ..
        } => {
            println!("Order tracking id: {}", order_tracking_id);
            if no_wait {
                poll.cancel();
                return true;
            }

            let result = tokio::select! {
                result = poll.wait() => result,
                _ = shutdown_signal() => {
                    println!("Stopped waiting for confirmation");
                    return false;
                }
            };
            println!("{}", result.status_message());
            result.is_success()
        }
        PaymentOutcome::Redirect {
            redirect_url,
            order_tracking_id,
        } => {
            println!("Order tracking id: {}", order_tracking_id);
            println!("Complete the payment at: {}", redirect_url);
            true
        }
        PaymentOutcome::Rejected { .. } | PaymentOutcome::Failed { .. } => false,
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping...");
}
