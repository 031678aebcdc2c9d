//! External-Service Ports
//!
//! Narrow interfaces the core depends on: the store, the LLM, payments,
//! messaging, the blockchain notary, and text-to-speech. Each port has a
//! production client and an in-memory/simulated implementation used for
//! tests and unconfigured environments.

pub mod blockchain;
pub mod llm;
pub mod messaging;
pub mod payments;
pub mod store;
pub mod tts;

pub use blockchain::{BlockchainClient, SimulatedLedger};
pub use llm::{LlmClient, LlmError, OpenAiCompatibleClient, ScriptedLlm};
pub use messaging::{Channel, MessagingClient, NullMessaging, TemplateKey, TwilioClient};
pub use payments::{CheckoutSession, DodoClient, PaymentsClient, Payout, SimulatedPayments, WebhookVerifier};
pub use store::{MemoryStore, Store, StoreError};
pub use tts::{ElevenLabsBackend, SpeechBackend, TtsEngine, VoiceMap};

use std::sync::Arc;

use crate::reliability::BackgroundTaskManager;

/// Everything the orchestrator and domain services reach out to, assembled
/// once at startup.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub llm: Arc<dyn LlmClient>,
    pub payments: Arc<dyn PaymentsClient>,
    pub messaging: Arc<dyn MessagingClient>,
    pub blockchain: Arc<dyn BlockchainClient>,
    pub tts: Arc<TtsEngine>,
    pub tasks: Arc<BackgroundTaskManager>,
}
