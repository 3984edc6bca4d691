use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use placegrab_api::auth::JwtService;
use placegrab_api::routes::{self, AppState};
use placegrab_common::Config;
use placegrab_pipeline::browser::{BrowserSession, BrowserSettings};
use placegrab_pipeline::caption::BrowserCaptionSource;
use placegrab_pipeline::extractor::LlmTextExtractor;
use placegrab_pipeline::images::discovery::BrowserImageSource;
use placegrab_pipeline::images::ocr::VisionReader;
use placegrab_pipeline::store::{LocalPhotoStore, PgCatalog, RedisCounterStore};
use placegrab_pipeline::{AnalyzePipeline, PipelineConfig, PipelineDeps};
use places_client::{GooglePlacesClient, NaverLocalClient};

#[derive(Parser)]
#[command(name = "placegrab-api", about = "Extract and resolve places from post URLs")]
struct Cli {
    /// Bind address
    #[arg(long, env = "WEB_HOST")]
    host: Option<String>,

    /// Bind port
    #[arg(long, env = "WEB_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pipeline_config = PipelineConfig::default();

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Migrations complete");

    let counters = Arc::new(RedisCounterStore::connect(&config.redis_url).await?);

    let browser = Arc::new(BrowserSession::new(BrowserSettings {
        url: config.browserless_url.clone(),
        token: config.browserless_token.clone(),
        page_timeout: pipeline_config.page_timeout,
        max_tabs: pipeline_config.max_tabs,
    }));
    if let Err(e) = browser.start().await {
        // open_page retries the start lazily
        warn!(error = %e, "Browser not available at startup");
    }

    let text_model = OpenAi::new(&config.openai_api_key, &config.text_model);
    let vision_model = OpenAi::new(&config.openai_api_key, &config.vision_model);

    let deps = PipelineDeps::builder()
        .counters(counters)
        .catalog(Arc::new(PgCatalog::new(pool)))
        .captions(Arc::new(BrowserCaptionSource::new(browser.clone())))
        .extractor(Arc::new(LlmTextExtractor::new(text_model)))
        .images(Arc::new(BrowserImageSource::new(
            browser.clone(),
            pipeline_config.max_images,
        )?))
        .reader(Arc::new(VisionReader::new(vision_model)))
        .local_search(Arc::new(NaverLocalClient::new(
            config.naver_client_id.clone(),
            config.naver_client_secret.clone(),
        )?))
        .places(Arc::new(GooglePlacesClient::new(
            config.google_maps_api_key.clone(),
        )?))
        .photos(Arc::new(LocalPhotoStore::new(&config.photo_dir, "/static/uploads")))
        .build();

    let state = AppState {
        pipeline: Arc::new(AnalyzePipeline::new(deps, pipeline_config)),
        jwt: JwtService::new(&config.jwt_secret),
    };
    let app = routes::build_router(state, &config.photo_dir);

    let host = cli.host.unwrap_or(config.web_host);
    let port = cli.port.unwrap_or(config.web_port);
    let addr = format!("{host}:{port}");
    info!("placegrab-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    browser.stop().await;
    info!("Shut down");
    Ok(())
}
