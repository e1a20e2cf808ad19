//! Address Normalizer - freeform address parsing and OCR invoice mapping server.

mod config;
mod credentials;
mod error;
mod fallback;
mod invoice;
mod json_path;
mod llm_client;
mod locale;
mod parser;
mod patterns;
mod schema;
mod transliterate;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::ServiceConfig;
use credentials::{CredentialSource, EnvCredentials, SupabaseCredentials};
use fallback::LlmAddressFallback;
use llm_client::ChatClient;
use locale::LocaleTag;
use parser::{AddressParser, ClassifiedLine};
use patterns::{FieldKind, PatternLibrary};
use schema::{AddressRecord, InvoiceMapping};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    parser: AddressParser,
    fallback: Arc<LlmAddressFallback>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "address_normalizer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env();

    // Compile pattern sets once; shared read-only by every request
    let locale_configs = config::load_locale_configs(config.pattern_overrides_dir.as_deref())?;
    let library = Arc::new(PatternLibrary::from_configs(&locale_configs));
    info!("Compiled pattern sets for {} locales", locale_configs.len());

    let credentials: Arc<dyn CredentialSource> = match &config.supabase {
        Some(settings) => {
            info!("LLM key lookup: Supabase table {}", settings.table);
            Arc::new(SupabaseCredentials::new(settings.clone()))
        }
        None => {
            info!("LLM key lookup: env var {}", config.llm_key_env);
            Arc::new(EnvCredentials::new(config.llm_key_env.clone()))
        }
    };

    let chat = ChatClient::new(config.llm_api_url.clone(), config.llm_model.clone());
    info!("LLM fallback model: {}", chat.model());

    let state = AppState {
        parser: AddressParser::new(library),
        fallback: Arc::new(LlmAddressFallback::new(credentials, Arc::new(chat))),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/patterns", get(list_patterns))
        .route("/address/detect", post(detect_locale))
        .route("/address/parse", post(parse_address))
        .route("/address/classify", post(classify_lines))
        .route("/address/transliterate", post(transliterate_text))
        .route("/address/llm", post(parse_with_llm))
        .route("/invoices/map", post(map_invoice))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
struct TextRequest {
    text: String,
    /// `russian` | `european` | `global`; detected from the text when absent.
    #[serde(default)]
    locale: Option<String>,
}

#[derive(Serialize)]
struct DetectResponse {
    locale: LocaleTag,
}

#[derive(Serialize)]
struct ParseResponse {
    locale: LocaleTag,
    record: AddressRecord,
    /// Same record with free-text fields in Latin script.
    latin: AddressRecord,
}

#[derive(Serialize)]
struct ClassifyResponse {
    locale: LocaleTag,
    lines: Vec<ClassifiedLine>,
}

#[derive(Serialize)]
struct TransliterateResponse {
    text: String,
}

#[derive(Serialize)]
struct PatternSummary {
    locale: LocaleTag,
    fields: Vec<FieldKind>,
}

/// Explicit locale hint, or script detection when none was given.
fn resolve_locale(req: &TextRequest) -> Result<LocaleTag, (StatusCode, String)> {
    match req.locale.as_deref() {
        Some(hint) => LocaleTag::from_str(hint).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Unknown locale: {}. Available: russian, european, global", hint),
            )
        }),
        None => Ok(locale::detect(&req.text)),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Fields each locale family can extract.
async fn list_patterns(State(state): State<AppState>) -> Json<Vec<PatternSummary>> {
    let library = state.parser.library();
    Json(
        LocaleTag::ALL
            .into_iter()
            .map(|locale| library.get(locale))
            .map(|set| PatternSummary {
                locale: set.locale(),
                fields: set.fields(),
            })
            .collect(),
    )
}

async fn detect_locale(Json(req): Json<TextRequest>) -> Json<DetectResponse> {
    Json(DetectResponse {
        locale: locale::detect(&req.text),
    })
}

async fn parse_address(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<Json<ParseResponse>, (StatusCode, String)> {
    let (locale, record) = match req.locale.as_deref() {
        Some(_) => {
            let locale = resolve_locale(&req)?;
            (locale, state.parser.parse(&req.text, locale))
        }
        None => state.parser.parse_auto(&req.text),
    };
    let latin = transliterate::transliterate_record(&record);
    Ok(Json(ParseResponse {
        locale,
        record,
        latin,
    }))
}

async fn classify_lines(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<Json<ClassifyResponse>, (StatusCode, String)> {
    let locale = resolve_locale(&req)?;
    Ok(Json(ClassifyResponse {
        locale,
        lines: state.parser.classify_lines(&req.text, locale),
    }))
}

async fn transliterate_text(Json(req): Json<TextRequest>) -> Json<TransliterateResponse> {
    Json(TransliterateResponse {
        text: transliterate::transliterate(&req.text),
    })
}

/// LLM fallback. Responds `null` when the fallback is unavailable.
async fn parse_with_llm(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<Json<Option<AddressRecord>>, (StatusCode, String)> {
    let hint = match req.locale.as_deref() {
        Some(_) => Some(resolve_locale(&req)?),
        None => None,
    };
    Ok(Json(state.fallback.parse_via_llm(&req.text, hint).await))
}

/// Map an OCR provider prediction document. Accepts any JSON shape.
async fn map_invoice(Json(doc): Json<serde_json::Value>) -> Json<InvoiceMapping> {
    Json(invoice::map_document(&doc))
}
