use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use block_cutter::render::render_plan;
use block_cutter::sequence::SequenceSummary;
use block_cutter::types::{DEFAULT_KERF, DEFAULT_MIN_SLICE, deserialize_u32_from_number};
use block_cutter::{
    Dims, PartType, PlacedPart, Problem, SolveOptions, Statistics, StockBlock, solve,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Deserialize, Serialize)]
struct BlockRequest {
    #[serde(alias = "l", deserialize_with = "deserialize_u32_from_number")]
    length: u32,
    #[serde(alias = "w", deserialize_with = "deserialize_u32_from_number")]
    width: u32,
    #[serde(alias = "h", deserialize_with = "deserialize_u32_from_number")]
    height: u32,
}

impl BlockRequest {
    fn dims(&self) -> Dims {
        Dims::new(self.length, self.width, self.height)
    }
}

#[derive(Deserialize, Serialize)]
struct PartRequest {
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    id: u32,
    #[serde(flatten)]
    size: BlockRequest,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    qty: u32,
    #[serde(default)]
    value: Option<u64>,
    #[serde(default = "default_true")]
    allow_rotation: bool,
}

#[derive(Deserialize, Serialize)]
struct OptimizeRequest {
    block: BlockRequest,
    parts: Vec<PartRequest>,
    #[serde(default = "default_kerf", deserialize_with = "deserialize_u32_from_number")]
    kerf: u32,
    #[serde(default = "default_min_slice", deserialize_with = "deserialize_u32_from_number")]
    min_slice: u32,
    #[serde(default)]
    options: SolveOptions,
}

fn default_true() -> bool {
    true
}

fn default_kerf() -> u32 {
    DEFAULT_KERF
}

fn default_min_slice() -> u32 {
    DEFAULT_MIN_SLICE
}

#[derive(Serialize)]
struct OptimizeResponse {
    stats: Statistics,
    placements: Vec<PlacedPart>,
    tree: Option<String>,
    cutting_sequence: Option<serde_json::Value>,
}

fn build_problem(req: &OptimizeRequest) -> block_cutter::Result<Problem> {
    let stock = StockBlock::new(req.block.dims())?
        .with_kerf(req.kerf)
        .with_min_slice(req.min_slice);
    let parts = req
        .parts
        .iter()
        .map(|p| {
            let part = PartType::new(p.id, p.size.dims(), p.qty)?.with_rotation(p.allow_rotation);
            match p.value {
                Some(v) => part.with_value(v),
                None => Ok(part),
            }
        })
        .collect::<block_cutter::Result<Vec<_>>>()?;
    Problem::new(stock, parts)
}

fn summary_json(summary: SequenceSummary<'_>) -> Option<serde_json::Value> {
    serde_json::to_value(summary)
        .inspect_err(|e| tracing::error!(error = %e, "cutting sequence not serializable"))
        .ok()
}

async fn optimize(
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, (StatusCode, String)> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /optimize"
    );

    if req.parts.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "at least one part is required".to_string(),
        ));
    }
    let problem = build_problem(&req).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let options = req.options;

    let response = tokio::task::spawn_blocking(move || {
        let outcome = solve(&problem, &options);
        let sequence = outcome.sequence(&problem);
        OptimizeResponse {
            tree: outcome.plan.as_ref().map(render_plan),
            cutting_sequence: sequence.as_ref().and_then(|s| summary_json(s.summary())),
            stats: outcome.stats,
            placements: outcome.placements,
        }
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(response))
}

#[tokio::main]
async fn main() {
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/optimize", post(optimize))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await.expect("server error");
}
