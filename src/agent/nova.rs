//! Nova Agent
//!
//! The user-facing conversational agent: resolves intent, hands loan and
//! trust questions to specialists, and otherwise replies in the user's
//! language with a warm, jargon-free persona.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::agent::{Agent, AgentContext, AgentId, AgentResult, ReasoningTrace};
use crate::domain::{DiaryKind, Language};
use crate::error::EngineError;
use crate::services::llm::{chat_reliable, LlmClient};

const VALID_INTENTS: [&str; 9] = [
    "greeting",
    "loan_request",
    "loan_inquiry",
    "balance_check",
    "trust_score",
    "reputation",
    "payment_reminder",
    "emergency",
    "general_question",
];

#[derive(Debug, Deserialize)]
struct IntentGuess {
    intent: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    entities: Value,
}

fn default_confidence() -> f64 {
    0.8
}

pub struct NovaAgent {
    llm: Arc<dyn LlmClient>,
}

impl NovaAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn respond(&self, context: &AgentContext, trace: &mut ReasoningTrace) -> Result<AgentResult, EngineError> {
        trace.observe_with(
            format!(
                "User (trust score: {}, language: {}) says: '{}'",
                context.trust_score,
                context.language.as_str(),
                context.current_request
            ),
            0.95,
        );

        let intent = self.detect_intent(&context.current_request, context.language).await;
        trace.analyze_with(
            format!(
                "Detected intent: {} (entities: {})",
                intent.intent, intent.entities
            ),
            intent.confidence,
        );

        if matches!(intent.intent.as_str(), "loan_request" | "loan_inquiry") {
            trace.hypothesize_with(
                "User asking about loans - will consult LoanAdvisor agent",
                0.85,
            );
            return Ok(AgentResult::ok(
                self.id(),
                json!({ "needs_specialist": true, "intent": intent.intent }),
                trace.clone(),
            )
            .with_next(AgentId::LoanAdvisor));
        }

        if matches!(intent.intent.as_str(), "trust_score" | "reputation") {
            trace.hypothesize_with(
                "User asking about trust - will consult TrustAnalyzer agent",
                0.85,
            );
            return Ok(AgentResult::ok(
                self.id(),
                json!({ "needs_specialist": true, "intent": intent.intent }),
                trace.clone(),
            )
            .with_next(AgentId::TrustAnalyzer));
        }

        trace.act_with(
            format!("Generating empathetic response in {}", context.language.as_str()),
            0.9,
        );
        let response = self.generate_response(context, &intent).await?;
        let preview: String = response.chars().take(100).collect();
        trace.conclude_with(format!("Response ready: {preview}..."), 0.88);

        Ok(AgentResult::ok(
            self.id(),
            json!({
                "response": response,
                "intent": intent.intent,
                "language": context.language.as_str(),
            }),
            trace.clone(),
        ))
    }

    async fn detect_intent(&self, message: &str, language: Language) -> IntentGuess {
        let prompt = format!(
            r#"Analyze this message and return JSON with intent and entities:
Message: "{message}"

Possible intents:
- greeting (hi, hello, namaste)
- loan_request (want loan, need money urgently)
- loan_inquiry (what is EMI, how much can I borrow)
- balance_check (my balance, SAATHI tokens)
- trust_score (my score, bharosa, trust level)
- payment_reminder (when is EMI due)
- emergency (urgent, hospital, emergency fund)
- general_question (anything else)

Return ONLY valid JSON: {{"intent": "...", "confidence": 0.0-1.0, "entities": {{}}}}
"#
        );

        let fallback = || IntentGuess {
            intent: "general_question".into(),
            confidence: 0.5,
            entities: json!({}),
        };

        match chat_reliable(self.llm.as_ref(), &prompt, None, language).await {
            Ok(response) => match parse_intent_json(&response) {
                Some(guess) if VALID_INTENTS.contains(&guess.intent.as_str()) => guess,
                Some(_) | None => fallback(),
            },
            Err(_) => fallback(),
        }
    }

    async fn generate_response(
        &self,
        context: &AgentContext,
        intent: &IntentGuess,
    ) -> Result<String, EngineError> {
        let system = persona_prompt(context.language);

        let recent_expenses: Vec<String> = context
            .financial_diary
            .iter()
            .filter(|e| e.kind == DiaryKind::Expense)
            .take(5)
            .map(|e| {
                format!(
                    "₹{} for {}",
                    e.amount,
                    e.category.as_deref().unwrap_or("other")
                )
            })
            .collect();
        let expense_summary = if recent_expenses.is_empty() {
            "No recent transactions".to_string()
        } else {
            recent_expenses.join(", ")
        };

        let name = context
            .user_profile
            .as_ref()
            .map(|p| p.full_name.clone())
            .unwrap_or_else(|| "Friend".to_string());

        let prompt = format!(
            r#"USER CONTEXT:
- Name: {name}
- Trust Score: {score}/100 ({dots} out of 10 people trust them)
- SAATHI Balance: {balance} tokens
- Active Loans: {active}
- Circles: {circles}
- Recent Activity: {expense_summary}

USER MESSAGE: {message}
DETECTED INTENT: {intent}

Generate a warm, helpful response in {language}.
If they have active loans or low balance, offer proactive advice with empathy.
Keep it short (2-3 sentences).
"#,
            score = context.trust_score,
            dots = context.trust_score / 10,
            balance = context.saathi_balance,
            active = context.active_loans().count(),
            circles = context.circles.len(),
            message = context.current_request,
            intent = intent.intent,
            language = context.language.as_str(),
        );

        chat_reliable(self.llm.as_ref(), &prompt, Some(system), context.language).await
    }

    /// Canned plain-language explanations of financial concepts.
    pub fn explain_in_simple_terms(
        concept: &str,
        amount: f64,
        tenure_weeks: u32,
        language: Language,
    ) -> String {
        match (concept, language) {
            ("emi", Language::Hi) => {
                format!("हर हफ्ते ₹{amount:.0} दें। {tenure_weeks} हफ्ते बाद खत्म!")
            }
            ("emi", Language::Ml) => format!(
                "എല്ലാ ആഴ്ചയും ₹{amount:.0} അടയ്ക്കുക. {tenure_weeks} ആഴ്ച കഴിഞ്ഞാൽ തീർന്നു!"
            ),
            ("emi", _) => format!(
                "You pay ₹{amount:.0} every week. After {tenure_weeks} weeks, you're done!"
            ),
            ("interest", Language::Hi) => format!(
                "₹{amount:.0} लें, ₹{:.0} वापस करें। ₹{:.0} उधार का खर्चा है।",
                amount * 1.1,
                amount * 0.1
            ),
            ("interest", Language::Ml) => format!(
                "₹{amount:.0} കടം വാങ്ങുക, ₹{:.0} തിരികെ നൽകുക. ₹{:.0} കടത്തിന്റെ ചെലവ്.",
                amount * 1.1,
                amount * 0.1
            ),
            ("interest", _) => format!(
                "Borrow ₹{amount:.0}, return ₹{:.0}. Extra ₹{:.0} is the cost of borrowing.",
                amount * 1.1,
                amount * 0.1
            ),
            ("trust_score", Language::Hi) => {
                "भरोसा स्कोर बताता है कितने लोग आप पर विश्वास करते हैं। ज्यादा = बड़ा लोन मिल सकता है।".to_string()
            }
            ("trust_score", Language::Ml) => {
                "വിശ്വാസ സ്കോർ എത്ര പേർ നിങ്ങളെ വിശ്വസിക്കുന്നു എന്ന് കാണിക്കുന്നു.".to_string()
            }
            ("trust_score", _) => {
                "Your trust score shows how many people believe in you. Higher = bigger loans possible.".to_string()
            }
            _ => "I'll explain simply...".to_string(),
        }
    }
}

#[async_trait]
impl Agent for NovaAgent {
    fn id(&self) -> AgentId {
        AgentId::Nova
    }

    async fn run(&self, context: &AgentContext) -> AgentResult {
        let preview: String = context.current_request.chars().take(50).collect();
        let mut trace = ReasoningTrace::new(self.id().as_str(), format!("Respond to: {preview}..."));
        match self.respond(context, &mut trace).await {
            Ok(result) => result,
            Err(err) => {
                trace.reflect_with(format!("Error occurred: {err}"), 0.3);
                AgentResult::failed(self.id(), err, trace)
            }
        }
    }
}

/// Pull the first JSON object out of an LLM reply, tolerating code fences.
fn parse_intent_json(response: &str) -> Option<IntentGuess> {
    let mut text = response.trim();
    if text.contains("```") {
        let inner = text.split("```").nth(1)?;
        text = inner.trim_start_matches("json").trim();
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    serde_json::from_str(&text[start..=end]).ok()
}

fn persona_prompt(language: Language) -> &'static str {
    match language {
        Language::En => {
            "You are Nova, a warm and caring AI financial assistant for a community \
             lending circle. You help working families manage money, get fair loans, \
             and build trust.\n\
             YOUR PERSONALITY:\n\
             - Speak like a helpful neighbor, not a bank\n\
             - Use simple words, avoid jargon\n\
             - Be encouraging but honest\n\
             - Show empathy for financial struggles\n\
             WHEN EXPLAINING:\n\
             - EMI: \"You pay ₹550 every week, 10 times total = ₹5500\"\n\
             - Interest: \"For every ₹100 you borrow, return ₹110\"\n\
             - Trust Score: \"7 out of 10 people in your circle trust you\"\n\
             NEVER:\n\
             - Use percentages or complex math\n\
             - Judge someone's financial situation\n\
             - Recommend loans they can't afford"
        }
        Language::Hi => {
            "आप Nova (नोवा) हैं, एक सामुदायिक लेंडिंग सर्कल की मिलनसार AI सहायक।\n\
             आपका स्वभाव:\n\
             - पड़ोसी की तरह बात करें, बैंक की तरह नहीं\n\
             - सरल शब्दों का उपयोग करें\n\
             - हौसला बढ़ाएं लेकिन ईमानदार रहें\n\
             - आर्थिक कठिनाइयों के प्रति सहानुभूति दिखाएं\n\
             समझाते समय:\n\
             - EMI: \"हर हफ्ते ₹550 दें, 10 बार = कुल ₹5500\"\n\
             - ब्याज: \"₹100 उधार लें, ₹110 वापस करें\"\n\
             - भरोसा: \"10 में से 7 लोग आप पर भरोसा करते हैं\"\n\
             कभी नहीं:\n\
             - प्रतिशत या जटिल गणित का उपयोग करें\n\
             - किसी की आर्थिक स्थिति पर फैसला सुनाएं"
        }
        Language::Ml => {
            "നിങ്ങൾ Nova (നോവ) ആണ്, ഒരു കമ്മ്യൂണിറ്റി ലെൻഡിംഗ് സർക്കിളിന്റെ സൗഹൃദ AI സഹായി.\n\
             നിങ്ങളുടെ സ്വഭാവം:\n\
             - അയൽക്കാരനെ പോലെ സംസാരിക്കുക\n\
             - ലളിതമായ വാക്കുകൾ ഉപയോഗിക്കുക\n\
             - പ്രോത്സാഹിപ്പിക്കുക, എന്നാൽ സത്യസന്ധമായിരിക്കുക\n\
             വിശദീകരിക്കുമ്പോൾ:\n\
             - EMI: \"എല്ലാ ആഴ്ചയും ₹550 അടയ്ക്കുക, 10 തവണ = ₹5500\"\n\
             - പലിശ: \"₹100 കടം വാങ്ങുക, ₹110 തിരികെ നൽകുക\"\n\
             - വിശ്വാസം: \"10-ൽ 7 പേർ നിങ്ങളെ വിശ്വസിക്കുന്നു\""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::ScriptedLlm;
    use uuid::Uuid;

    fn ctx(message: &str, language: Language) -> AgentContext {
        let mut context = AgentContext::empty(Uuid::new_v4());
        context.current_request = message.to_string();
        context.language = language;
        context.trust_score = 10;
        context
    }

    #[tokio::test]
    async fn test_greeting_generates_reply() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(r#"{"intent": "greeting", "confidence": 0.95, "entities": {}}"#);
        llm.push("Namaste! Main aapki madad ke liye hoon. Aaj kya karna hai?");

        let agent = NovaAgent::new(llm);
        let result = agent.run(&ctx("Namaste", Language::Hi)).await;
        assert!(result.success);
        assert_eq!(result.result["intent"], "greeting");
        assert!(result.result["response"]
            .as_str()
            .unwrap()
            .contains("Namaste"));
        assert!(result.next_agent.is_none());
        assert!(result.trace.is_complete());
    }

    #[tokio::test]
    async fn test_loan_intent_routes_to_advisor() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(r#"{"intent": "loan_request", "confidence": 0.9, "entities": {"amount": 5000}}"#);

        let agent = NovaAgent::new(llm);
        let result = agent.run(&ctx("I need a loan urgently", Language::En)).await;
        assert!(result.success);
        assert_eq!(result.next_agent, Some(AgentId::LoanAdvisor));
        assert_eq!(result.result["needs_specialist"], true);
        assert_eq!(result.result["intent"], "loan_request");
        // No reply is generated when handing off.
        assert!(result.result.get("response").is_none());
    }

    #[tokio::test]
    async fn test_trust_intent_routes_to_analyzer() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(r#"{"intent": "trust_score", "confidence": 0.9, "entities": {}}"#);

        let agent = NovaAgent::new(llm);
        let result = agent.run(&ctx("what is my bharosa score", Language::En)).await;
        assert_eq!(result.next_agent, Some(AgentId::TrustAnalyzer));
    }

    #[tokio::test]
    async fn test_unparseable_intent_falls_back() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push("I think the user wants... something?");
        llm.push("Happy to help with whatever you need.");

        let agent = NovaAgent::new(llm);
        let result = agent.run(&ctx("hmm", Language::En)).await;
        assert!(result.success);
        assert_eq!(result.result["intent"], "general_question");
    }

    #[test]
    fn test_parse_intent_with_code_fence() {
        let guess = parse_intent_json(
            "```json\n{\"intent\": \"balance_check\", \"confidence\": 0.8, \"entities\": {}}\n```",
        )
        .unwrap();
        assert_eq!(guess.intent, "balance_check");
    }

    #[test]
    fn test_simple_explanations() {
        let en = NovaAgent::explain_in_simple_terms("emi", 550.0, 10, Language::En);
        assert!(en.contains("₹550"));
        assert!(en.contains("10 weeks"));
        let hi = NovaAgent::explain_in_simple_terms("interest", 100.0, 10, Language::Hi);
        assert!(hi.contains("₹110"));
    }
}
