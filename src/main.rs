use actix_cors::Cors;
use actix_web::{middleware::Compress, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

use quill::config::AppConfig;
use quill::mail::Mailer;
use quill::openapi::ApiDoc;
use quill::routes::{config, AppState};
use quill::storage::FsFileStore;
use quill::summary::Summarizer;

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use quill::repo::inmem::InMemRepo;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker).
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let app_config = Arc::new(AppConfig::from_env());
    info!("Bootstrapping blog server");
    info!("Mail configured: {}", app_config.mail.is_some());
    info!("Summarizer configured: {}", app_config.gemini_api_key.is_some());

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        quill::repo::pg::PgRepo::new(pool)
    };

    let files = match FsFileStore::new(app_config.upload_dir.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Failed to initialize upload store: {e}");
            std::process::exit(1);
        }
    };
    let mailer = Arc::new(Mailer::from_config(
        app_config.mail.as_ref(),
        &app_config.public_base_url,
    ));
    let summarizer = Arc::new(Summarizer::new(
        app_config.gemini_api_key.clone(),
        app_config.gemini_api_url.clone(),
    ));

    let openapi = ApiDoc::openapi();
    let port = app_config.port;

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = app_config.frontend_url.as_deref() {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                files: files.clone(),
                mailer: mailer.clone(),
                summarizer: summarizer.clone(),
                config: app_config.clone(),
            }))
    })
    .bind(("0.0.0.0", port))?;

    info!("Listening on http://0.0.0.0:{port}");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    if env::var("JWT_SECRET").is_err() {
        eprintln!("Missing required environment variable: JWT_SECRET");
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }
    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }
    if env::var("MAIL_USERNAME").is_err() {
        eprintln!("Warning: mail not configured (MAIL_USERNAME missing)");
        eprintln!("Password reset emails will not be sent");
    }
    if env::var("GEMINI_API_KEY").is_err() {
        eprintln!("Warning: GEMINI_API_KEY not set; post summaries disabled");
    }
}
