use ragforge::conversation::{ApiKey, ConversationEngine, GeminiClient};
use ragforge::metrics::SessionMetrics;
use ragforge::sequencer::{Clock, InstantClock, TokioClock};
use ragforge::session::SessionOrchestrator;
use ragforge::{api, config, logging};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let backend = GeminiClient::new(config.gemini_base_url.clone(), config.request_timeout)
        .expect("Failed to build backend client");
    let credential = config.gemini_api_key.clone().and_then(ApiKey::new);
    if credential.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; questions will be answered with an error");
    }
    let engine = ConversationEngine::new(Arc::new(backend), credential, config.request_timeout);
    let orchestrator = SessionOrchestrator::new(engine, Arc::new(SessionMetrics::new()));
    let clock: Arc<dyn Clock> = if config.instant_processing {
        Arc::new(InstantClock)
    } else {
        Arc::new(TokioClock)
    };
    let app = api::create_router(api::AppState::new(orchestrator, clock));

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.expect("Server terminated");
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
