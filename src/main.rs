use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use courseboard::config::Settings;
use courseboard::notify::{HttpMailer, LogMailer, Mailer};
use courseboard::openapi::ApiDoc;
use courseboard::repo::{inmem::InMemRepo, pg::PgRepo, Repo};
use courseboard::{config, AppState, SecurityHeaders};

async fn build_repo(settings: &Settings) -> anyhow::Result<Arc<dyn Repo>> {
    if let Some(url) = settings.database_url.as_deref() {
        use sqlx::postgres::PgPoolOptions;
        let pool = PgPoolOptions::new()
            .max_connections(settings.database_max_connections)
            .connect(url)
            .await
            .context("connecting to DATABASE_URL")?;
        sqlx::migrate!().run(&pool).await.context("running migrations")?;
        info!("Using Postgres repository backend");
        return Ok(Arc::new(PgRepo::new(pool)));
    }
    match settings.data_dir.as_deref() {
        Some(dir) => {
            info!(dir, "Using in-memory repository backend with JSON snapshot");
            Ok(Arc::new(InMemRepo::with_snapshot_dir(dir)))
        }
        None => {
            info!("Using in-memory repository backend (nothing persisted)");
            Ok(Arc::new(InMemRepo::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env only in debug builds; deployments set the environment themselves
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let settings = Settings::from_env()?;
    info!("Bootstrapping courseboard");
    info!(google = settings.google.is_some(), mail = settings.mail.is_some(), "Optional integrations");
    info!(frontend = %settings.frontend_url, "Frontend URL");

    let repo = build_repo(&settings).await?;
    let mailer: Arc<dyn Mailer> = match settings.mail.clone() {
        Some(cfg) => Arc::new(HttpMailer::new(cfg)),
        None => Arc::new(LogMailer),
    };

    let bind_addr = settings.bind_addr.clone();
    let hsts = settings.enable_hsts;
    let state = web::Data::new(AppState::new(repo, mailer, settings));
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&state.settings.frontend_url)
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(hsts))
            .wrap(cors)
            .app_data(state.clone())
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .configure(config)
    })
    .bind(&bind_addr)
    .with_context(|| format!("binding {bind_addr}"))?;

    info!("Listening on http://{}", bind_addr);
    server.run().await?;
    Ok(())
}
