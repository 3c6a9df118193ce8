use actix_web::{
    get,
    http::{header, Method, StatusCode},
    route, web, HttpRequest, HttpResponse, HttpResponseBuilder, Responder,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::error;

pub mod cache;
pub mod clock;
pub mod custom_date;
pub mod error;
pub mod fetch;
pub mod recipe;
pub mod service;
pub mod snapshot;
pub mod xml;

use clock::SystemClock;
use fetch::HttpFeedSource;
use recipe::{ImagePolicy, NormalizeOptions};
use service::{CardSource, Cards, FeedService, ServiceSettings};
use snapshot::SnapshotStore;

#[derive(Parser, Debug, Clone)]
#[clap(about, version, author)]
pub struct Args {
    #[clap(short, long, env = "RECIPE_FEED_IP", default_value = "127.0.0.1")]
    pub ip: String,

    #[clap(short, long, env = "RECIPE_FEED_PORT", default_value = "3000")]
    pub port: u16,

    #[clap(
        short,
        long,
        env = "FEED_URL",
        default_value = "https://www.bonappetit.com/feed/recipes-rss-feed/rss"
    )]
    pub feed_url: String,

    /// Cache lifetime in minutes
    #[clap(short, long, env = "CACHE_TTL_MINUTES", default_value = "15")]
    pub cache_ttl: u32,

    /// Default and maximum number of cards per response, also the cache size
    #[clap(short, long, env = "MAX_ITEMS", default_value = "20")]
    pub limit: u16,

    /// Upstream fetch timeout in seconds
    #[clap(short = 't', long, env = "FETCH_TIMEOUT_SECS", default_value = "10")]
    pub fetch_timeout: u64,

    /// Durable copy of the last good result, read only when everything else fails
    #[clap(short, long, env = "SNAPSHOT_PATH")]
    pub snapshot_path: Option<String>,

    #[clap(long, env = "IMAGE_POLICY", value_enum, default_value = "drop")]
    pub image_policy: ImagePolicy,

    #[clap(
        long,
        env = "PLACEHOLDER_IMAGE",
        default_value = "/images/recipe-placeholder.jpg"
    )]
    pub placeholder_image: String,
}

impl Args {
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            default_feed_url: self.feed_url.clone(),
            ttl: chrono::Duration::minutes(self.cache_ttl.into()),
            max_items: usize::from(self.limit.max(1)),
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            normalize: NormalizeOptions {
                image_policy: self.image_policy,
                placeholder_image: self.placeholder_image.clone(),
            },
        }
    }
}

pub struct AppState {
    pub config: Args,
    pub service: FeedService,
}

impl AppState {
    /// Production wiring: HTTP feed source, wall clock, optional snapshot file.
    pub fn from_args(config: Args) -> error::Result<Self> {
        let settings = config.service_settings();
        let source = HttpFeedSource::new(settings.fetch_timeout)?;
        let snapshot = config.snapshot_path.as_deref().map(SnapshotStore::new);

        let service = FeedService::new(
            settings,
            Arc::new(source),
            Arc::new(SystemClock),
            snapshot,
        );

        Ok(Self { config, service })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecipeQuery {
    pub feed: Option<String>,
    pub limit: Option<String>,
}

impl RecipeQuery {
    /// Anything but a positive integer means "use the default".
    fn limit(&self) -> Option<usize> {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|&l| l > 0)
    }
}

#[route("/api/recipes", method = "GET", method = "HEAD", method = "OPTIONS")]
async fn recipes(
    query: web::Query<RecipeQuery>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> impl Responder {
    if req.method() == Method::OPTIONS {
        return with_cors(HttpResponse::NoContent()).finish();
    }

    match app_data
        .service
        .recipes(query.feed.as_deref(), query.limit())
        .await
    {
        Ok(cards) => create_response(&req, &cards),
        Err(e) => {
            error!("No recipes available: {}", e);
            let body = serde_json::json!({
                "error": "Recipe feed unavailable",
                "detail": e.to_string(),
            });
            with_cors(HttpResponse::BadGateway()).json(body)
        }
    }
}

#[get("/health")]
async fn health() -> impl Responder {
    with_cors(HttpResponse::Ok()).json(serde_json::json!({ "status": "ok" }))
}

fn with_cors(mut response: HttpResponseBuilder) -> HttpResponseBuilder {
    response.insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"));
    response.insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, HEAD, OPTIONS"));
    response.insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"));
    response
}

fn cache_status(source: CardSource) -> &'static str {
    match source {
        CardSource::Cache => "HIT",
        CardSource::Network => "MISS",
        CardSource::StaleCache => "STALE",
        CardSource::Snapshot => "SNAPSHOT",
    }
}

fn last_modified(updated_at: DateTime<Utc>) -> header::HttpDate {
    let secs = u64::try_from(updated_at.timestamp()).unwrap_or(0);
    header::HttpDate::from(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}

fn create_response(req: &HttpRequest, cards: &Cards) -> HttpResponse {
    let status = match cards.source {
        CardSource::Snapshot => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    let body = match serde_json::to_string(&cards.cards) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to serialize recipes: {}", e);
            return with_cors(HttpResponse::InternalServerError())
                .json(serde_json::json!({ "error": "Failed to serialize recipes" }));
        }
    };

    let mut response = with_cors(HttpResponse::build(status));
    response.insert_header((header::CONTENT_TYPE, "application/json"));
    response.insert_header((header::CACHE_CONTROL, "no-store"));
    response.insert_header((header::LAST_MODIFIED, last_modified(cards.updated_at).to_string()));
    response.insert_header(("X-Cache", cache_status(cards.source)));

    if req.method() == Method::HEAD {
        response
            .insert_header((header::CONTENT_LENGTH, body.len()))
            .finish()
    } else {
        response.body(body)
    }
}
