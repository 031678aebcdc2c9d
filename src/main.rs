//! Bharosa Engine
//!
//! Credit-decision orchestration service for a trust-based P2P lending
//! platform: multi-agent reasoning with visible traces, six-factor risk
//! scoring, fraud detection, quadratic loan voting, and the reliability
//! kit underneath it all.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bharosa_engine::config::Config;
use bharosa_engine::domain::gamification::GamificationService;
use bharosa_engine::domain::loans::{LoanService, RepaymentService};
use bharosa_engine::domain::vouching::VouchingService;
use bharosa_engine::orchestrator::Orchestrator;
use bharosa_engine::reliability::BackgroundTaskManager;
use bharosa_engine::server::{run_server, AppState};
use bharosa_engine::services::{
    BlockchainClient, DodoClient, ElevenLabsBackend, MemoryStore, MessagingClient, NullMessaging,
    OpenAiCompatibleClient, PaymentsClient, Services, SimulatedLedger, SimulatedPayments,
    TtsEngine, TwilioClient, VoiceMap, WebhookVerifier,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Config::from_env()?;

    println!("\n{}", "═".repeat(60));
    println!("🏦 Bharosa Engine v0.2.0");
    println!("{}", "═".repeat(60));
    println!("Agents: Nova | RiskOracle | FraudGuard | LoanAdvisor | TrustAnalyzer | ActionAgent");
    println!("{}\n", "═".repeat(60));
    info!(environment = %config.environment, debug = config.debug, "starting bharosa engine");

    let tasks = Arc::new(BackgroundTaskManager::new());
    let store = Arc::new(MemoryStore::new());

    let llm = Arc::new(OpenAiCompatibleClient::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
    ));

    let payments: Arc<dyn PaymentsClient> = match config.payments_api_key {
        Some(ref key) => Arc::new(DodoClient::new(config.payments_base_url.clone(), key.clone())),
        None => {
            info!("payments credentials absent, using simulated gateway");
            Arc::new(SimulatedPayments)
        }
    };

    let messaging: Arc<dyn MessagingClient> =
        match (&config.messaging_account_sid, &config.messaging_auth_token) {
            (Some(sid), Some(token)) => Arc::new(TwilioClient::new(
                sid.clone(),
                token.clone(),
                config.messaging_from_number.clone(),
            )),
            _ => {
                info!("messaging credentials absent, notifications are logged only");
                Arc::new(NullMessaging)
            }
        };

    let blockchain: Arc<dyn BlockchainClient> = if config.chain_rpc_url.is_some() {
        Arc::new(SimulatedLedger::new())
    } else {
        info!("chain rpc absent, notarization disabled");
        Arc::new(SimulatedLedger::unconfigured())
    };

    let tts = Arc::new(TtsEngine::new(
        Box::new(ElevenLabsBackend::new(
            config.tts_base_url.clone(),
            config.tts_api_key.clone().unwrap_or_default(),
        )),
        VoiceMap {
            en: config.tts_voice_en.clone(),
            hi: config.tts_voice_hi.clone(),
            ml: config.tts_voice_ml.clone(),
        },
        config.tts_model.clone(),
    ));

    let services = Services {
        store: store.clone(),
        llm,
        payments: payments.clone(),
        messaging: messaging.clone(),
        blockchain: blockchain.clone(),
        tts,
        tasks: tasks.clone(),
    };

    let orchestrator = Arc::new(Orchestrator::new(services.clone(), &config));
    let vouching = Arc::new(VouchingService::new(
        store.clone(),
        blockchain.clone(),
        tasks.clone(),
    ));
    let loans = Arc::new(LoanService::new(
        store.clone(),
        orchestrator.clone(),
        payments,
        messaging,
        blockchain.clone(),
        tasks.clone(),
    ));
    let repayments = Arc::new(RepaymentService::new(
        store.clone(),
        blockchain,
        vouching.clone(),
        tasks.clone(),
    ));
    let gamification = Arc::new(GamificationService::new(store.clone()));

    let state = AppState {
        orchestrator,
        loans,
        repayments,
        vouching,
        gamification,
        services,
        webhook_verifier: WebhookVerifier::new(config.payments_webhook_secret.clone()),
        rate_limiter: Arc::new(bharosa_engine::reliability::RateLimiter::new(
            config.rate_limit_per_minute,
        )),
    };

    run_server(state, &config).await?;

    info!("draining background tasks before exit");
    tasks.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
