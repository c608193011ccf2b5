//! Servidor web Axum para treinar o HMM e rotular sequências de traços

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hmm_core::{
    corpus::{demo_stroke_corpus, stroke_schema, weather_model, weather_observations},
    estimator::{ParameterEstimator, TrainingSummary},
    evaluate::{validate, ConfusionMatrix},
    viterbi::{ViterbiDecoder, ViterbiResult, ViterbiStep},
    HmmError, HmmModel, ModelSchema, Observation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Configuração lida do ambiente na inicialização
struct Config {
    /// Endereço de escuta (`HMM_WEB_ADDR`)
    addr: String,
}

impl Config {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            addr: lookup("HMM_WEB_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        }
    }
}

/// Estado compartilhado da aplicação.
///
/// O modelo é imutável: treinar troca o `Arc` inteiro, e quem já estava
/// decodificando continua com a versão anterior.
#[derive(Default)]
struct AppState {
    model: RwLock<Option<Arc<HmmModel>>>,
}

impl AppState {
    async fn current_model(&self) -> Result<Arc<HmmModel>, ApiError> {
        self.model.read().await.clone().ok_or(ApiError::NoModel)
    }

    async fn replace_model(&self, model: HmmModel) {
        *self.model.write().await = Some(Arc::new(model));
    }
}

/// Erros devolvidos pela API como `{"error": "..."}`
enum ApiError {
    NoModel,
    Hmm(HmmError),
    Internal(String),
}

impl From<HmmError> for ApiError {
    fn from(e: HmmError) -> Self {
        ApiError::Hmm(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoModel => (
                StatusCode::CONFLICT,
                "nenhum modelo treinado; use /train ou /train/demo".to_string(),
            ),
            ApiError::Hmm(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Deserialize)]
struct TrainRequest {
    schema: ModelSchema,
    observations: Vec<Vec<Observation>>,
    labels: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct TrainResponse {
    summary: TrainingSummary,
    model: HmmModel,
}

#[derive(Deserialize)]
struct LabelRequest {
    sequence: Vec<Observation>,
}

#[derive(Serialize)]
struct LabelResponse {
    #[serde(flatten)]
    result: ViterbiResult,
    processing_ms: u64,
}

#[derive(Deserialize)]
struct BatchRequest {
    sequences: Vec<Vec<Observation>>,
}

#[derive(Serialize)]
struct BatchItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct EvaluateRequest {
    observations: Vec<Vec<Observation>>,
    labels: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct EvaluateResponse {
    confusion: ConfusionMatrix,
    accuracy: f64,
}

/// Eventos enviados pelo WebSocket durante uma decodificação
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum LabelEvent {
    Step(ViterbiStep),
    Done { labels: Vec<String>, log_score: f64 },
    Error { message: String },
}

/// Mensagem WebSocket recebida do cliente: `{sequence}` ou a lista pura
#[derive(Deserialize)]
#[serde(untagged)]
enum WsRequest {
    Wrapped { sequence: Vec<Observation> },
    Bare(Vec<Observation>),
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = Arc::new(AppState::default());

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!("Servidor HMM iniciado em http://{}", config.addr);
    axum::serve(listener, app(state)).await
}

fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/train", post(train_handler))
        .route("/train/demo", post(train_demo_handler))
        .route("/model", get(model_handler))
        .route("/label", post(label_handler))
        .route("/label/batch", post(label_batch_handler))
        .route("/evaluate", post(evaluate_handler))
        .route("/demo/weather", get(weather_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Retorna a página principal HTML
async fn index_handler() -> impl IntoResponse {
    Html(include_str!("templates/index.html"))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Treina um modelo novo com o corpus enviado e o torna o modelo atual
async fn train_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(move || {
        fit(&req.schema, &req.observations, &req.labels)
    })
    .await??;

    state.replace_model(response.model.clone()).await;
    Ok(Json(response))
}

/// Treina com o corpus sintético de esboços embutido no `hmm-core`
async fn train_demo_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TrainResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(|| {
        let (observations, labels) = demo_stroke_corpus();
        fit(&stroke_schema(), &observations, &labels)
    })
    .await??;

    state.replace_model(response.model.clone()).await;
    Ok(Json(response))
}

fn fit(
    schema: &ModelSchema,
    observations: &[Vec<Observation>],
    labels: &[Vec<String>],
) -> Result<TrainResponse, HmmError> {
    let (model, summary) = ParameterEstimator::new(schema).fit_with_summary(observations, labels)?;

    info!(
        "HMM treinado: {} sequências, {} traços, estados {:?}",
        summary.num_sequences,
        summary.num_observations,
        schema.states()
    );
    Ok(TrainResponse { summary, model })
}

async fn model_handler(State(state): State<Arc<AppState>>) -> Result<Json<HmmModel>, ApiError> {
    let model = state.current_model().await?;
    Ok(Json(model.as_ref().clone()))
}

/// Rotula uma sequência com o modelo atual, devolvendo também a tabela do Viterbi
async fn label_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LabelRequest>,
) -> Result<Json<LabelResponse>, ApiError> {
    let model = state.current_model().await?;
    let start = std::time::Instant::now();

    let result = tokio::task::spawn_blocking(move || {
        ViterbiDecoder::new(&model).decode(&req.sequence)
    })
    .await??;

    Ok(Json(LabelResponse {
        result,
        processing_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Rotula várias sequências; o erro de uma não derruba as outras
async fn label_batch_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<Vec<BatchItem>>, ApiError> {
    let model = state.current_model().await?;

    let results = tokio::task::spawn_blocking(move || {
        ViterbiDecoder::new(&model).label_batch(&req.sequences)
    })
    .await?;

    let items = results
        .into_iter()
        .map(|r| match r {
            Ok(labels) => BatchItem {
                labels: Some(labels),
                error: None,
            },
            Err(e) => BatchItem {
                labels: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    Ok(Json(items))
}

/// Tabela de confusão do modelo atual sobre um corpus rotulado
async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let model = state.current_model().await?;

    let confusion = tokio::task::spawn_blocking(move || {
        validate(&model, &req.observations, &req.labels)
    })
    .await??;

    info!("Avaliação: acurácia {:.3} em {} traços", confusion.accuracy(), confusion.total());
    Ok(Json(EvaluateResponse {
        accuracy: confusion.accuracy(),
        confusion,
    }))
}

/// Decodificação do exemplo do clima (parâmetros fixos)
async fn weather_handler() -> Result<Json<ViterbiResult>, ApiError> {
    let model = weather_model();
    let result = ViterbiDecoder::new(&model).decode(&weather_observations())?;
    Ok(Json(result))
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Cada mensagem de texto é uma sequência; responde com um evento por passo do Viterbi
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let events = match serde_json::from_str::<WsRequest>(&text) {
                    Ok(WsRequest::Wrapped { sequence }) | Ok(WsRequest::Bare(sequence)) => {
                        decode_events(&state, sequence).await
                    }
                    Err(e) => vec![LabelEvent::Error {
                        message: format!("mensagem inválida: {e}"),
                    }],
                };

                for event in &events {
                    if let Ok(json) = serde_json::to_string(event) {
                        if socket.send(Message::Text(json)).await.is_err() {
                            return; // cliente desconectou
                        }
                    }
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

async fn decode_events(state: &AppState, sequence: Vec<Observation>) -> Vec<LabelEvent> {
    let model = match state.current_model().await {
        Ok(model) => model,
        Err(_) => {
            return vec![LabelEvent::Error {
                message: "nenhum modelo treinado".to_string(),
            }]
        }
    };

    info!("Rotulando via WebSocket: {} traços", sequence.len());
    let decoded =
        tokio::task::spawn_blocking(move || ViterbiDecoder::new(&model).decode(&sequence)).await;

    match decoded {
        Ok(Ok(result)) => {
            let mut events: Vec<LabelEvent> =
                result.steps.into_iter().map(LabelEvent::Step).collect();
            events.push(LabelEvent::Done {
                labels: result.labels,
                log_score: result.log_score,
            });
            events
        }
        Ok(Err(e)) => vec![LabelEvent::Error {
            message: e.to_string(),
        }],
        Err(e) => {
            warn!("decodificação abortada: {e}");
            vec![LabelEvent::Error {
                message: e.to_string(),
            }]
        }
    }
}
