use std::{env, fs::OpenOptions, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::Level;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use lifesync::{
    AppState, AuthConfig, auth::PasswordHash, build_router, graceful_shutdown, logging_middleware,
    sanitize::SanitizeConfig,
};

/// The longest access token lifetime the server accepts: 30 days.
const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 30;

/// The REST API server for LifeSync.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// How many minutes an access token is valid for, at most 30 days.
    #[arg(
        long,
        default_value_t = 30,
        value_parser = clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_MINUTES)
    )]
    token_ttl_minutes: i64,

    /// The bcrypt cost for hashing passwords.
    #[arg(long, default_value_t = PasswordHash::DEFAULT_COST)]
    password_cost: u32,

    /// Input whose suspicion score is above this value is rejected.
    #[arg(long, default_value_t = SanitizeConfig::DEFAULT_REJECTION_THRESHOLD)]
    rejection_threshold: u32,

    /// Do not log suspicious input.
    #[arg(long)]
    no_log_suspicious: bool,

    /// The level suspicious input is logged at.
    #[arg(long, default_value_t = Level::WARN)]
    sanitize_log_level: Level,

    /// Origins that browsers may call the API from, separated by commas.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "http://localhost:5173,http://127.0.0.1:5173"
    )]
    allowed_origins: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logging();

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let secret = env::var("SECRET").expect("The environment variable 'SECRET' must be set");

    let auth_config = AuthConfig {
        token_ttl: Duration::minutes(args.token_ttl_minutes),
        password_cost: args.password_cost,
    };
    let sanitize_config = SanitizeConfig {
        log_suspicious: !args.no_log_suspicious,
        log_level: args.sanitize_log_level,
        rejection_threshold: args.rejection_threshold,
    };

    let conn = Connection::open(&args.db_path).expect("Could not open the database");
    let state = AppState::new(conn, &secret, auth_config, sanitize_config)
        .expect("Could not create the app state");

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = build_router(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors_layer(&args.allowed_origins));
    let router = add_tracing_layer(router);

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("The server stopped with an error");
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse() {
            Ok(origin) => Some(origin),
            Err(error) => {
                tracing::warn!("Ignoring invalid CORS origin {origin:?}: {error}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
