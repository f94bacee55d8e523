//! Structured multi-step reasoning agent.
//!
//! [`ReasoningAgent`] walks a task through four completions (analysis,
//! alternatives, trade-offs, final decision) and returns the result as a
//! [`DecisionPath`], ready to be recorded by an adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::decision::{ConfidenceLevel, DecisionPath, Payload, ThoughtStep};
use crate::error::LangbaseResult;
use crate::parsing::{parse_alternatives, parse_final_decision};
use crate::prompts::{
    alternatives_prompt, analysis_prompt, decision_prompt, tradeoff_prompt,
    DECISION_SYSTEM_PROMPT, INVESTMENT_ANALYSIS, INVESTMENT_ASPECTS,
};

/// Text returned by a completion backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Completion text.
    pub text: String,
    /// Total tokens consumed, when the backend reports it.
    pub token_usage: Option<u64>,
}

impl Completion {
    /// A completion without token usage.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_usage: None,
        }
    }
}

/// A language model that answers one prompt at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Answer `prompt` under the `system` instructions.
    async fn complete(&self, system: &str, prompt: &str) -> LangbaseResult<Completion>;
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn complete(&self, system: &str, prompt: &str) -> LangbaseResult<Completion> {
        (**self).complete(system, prompt).await
    }
}

/// Agent that produces a four-step decision path for any task.
pub struct ReasoningAgent<C> {
    name: String,
    client: C,
}

impl<C: CompletionClient> ReasoningAgent<C> {
    /// Create an agent named `name` over `client`.
    pub fn new(name: impl Into<String>, client: C) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    /// Agent name, used as the default agent id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Analyze `task` and return the decision path.
    ///
    /// Step confidence levels come from [`ConfidenceLevel::classify_text`],
    /// which is a rough lexical heuristic. The final confidence score is the
    /// model's own 0-1 figure. A failing completion aborts the analysis.
    pub async fn analyze_task(&self, task: &str, context: Payload) -> LangbaseResult<DecisionPath> {
        info!(agent = %self.name, task = %task, "Starting task analysis");
        let mut path = DecisionPath::new(task).with_context(context.clone());
        let mut tokens = TokenTally::default();

        let analysis = tokens.add(self.ask(&analysis_prompt(task, &context)).await?);
        path.add_step(
            ThoughtStep::new(
                "Initial Problem Analysis",
                analysis.as_str(),
                ConfidenceLevel::classify_text(&analysis),
            )
            .with_evidence("context", Value::Object(context)),
        );

        let alternatives = tokens.add(self.ask(&alternatives_prompt(task, &analysis)).await?);
        let parsed = parse_alternatives(&alternatives);
        debug!(agent = %self.name, count = parsed.len(), "Parsed alternatives");
        path.add_step(
            ThoughtStep::new(
                "Alternative Solutions",
                "Exploring different approaches",
                ConfidenceLevel::classify_text(&alternatives),
            )
            .with_evidence("initial_analysis", analysis.as_str())
            .with_alternatives(parsed),
        );

        let tradeoffs = tokens.add(self.ask(&tradeoff_prompt(task, &alternatives)).await?);
        path.add_step(
            ThoughtStep::new(
                "Trade-off Analysis",
                tradeoffs.as_str(),
                ConfidenceLevel::classify_text(&tradeoffs),
            )
            .with_evidence("alternatives", alternatives.as_str()),
        );

        let decision_text = tokens.add(
            self.ask(&decision_prompt(task, &analysis, &alternatives, &tradeoffs))
                .await?,
        );
        let decision = parse_final_decision(&decision_text);
        path.add_step(
            ThoughtStep::new(
                "Final Decision Synthesis",
                decision.reasoning.as_str(),
                ConfidenceLevel::from_score(decision.confidence),
            )
            .with_evidence("tradeoffs", tradeoffs.as_str()),
        );

        let mut chain = Payload::new();
        chain.insert("initial_analysis".to_string(), json!(analysis));
        chain.insert("alternatives".to_string(), json!(alternatives));
        chain.insert("tradeoffs".to_string(), json!(tradeoffs));
        chain.insert("final_reasoning".to_string(), json!(decision.reasoning));
        path.set_outcome(decision.decision, Some(decision.confidence), Some(chain));

        path.add_metric("llm_calls", tokens.calls);
        if let Some(total) = tokens.total {
            path.add_metric("token_usage", total);
        }

        info!(
            agent = %self.name,
            task_id = %path.task_id,
            confidence = decision.confidence,
            "Task analysis complete"
        );
        Ok(path)
    }

    /// Analyze a company as an investment opportunity.
    pub async fn analyze_investment_opportunity(
        &self,
        company: &str,
    ) -> LangbaseResult<DecisionPath> {
        let mut context = Payload::new();
        context.insert("company".to_string(), json!(company));
        context.insert("analysis_type".to_string(), json!(INVESTMENT_ANALYSIS));
        context.insert("required_aspects".to_string(), json!(INVESTMENT_ASPECTS));

        self.analyze_task(
            &format!("Analyze investment opportunity for {}", company),
            context,
        )
        .await
    }

    async fn ask(&self, prompt: &str) -> LangbaseResult<Completion> {
        self.client.complete(DECISION_SYSTEM_PROMPT, prompt).await
    }
}

#[derive(Default)]
struct TokenTally {
    calls: u32,
    total: Option<u64>,
}

impl TokenTally {
    fn add(&mut self, completion: Completion) -> String {
        self.calls += 1;
        if let Some(tokens) = completion.token_usage {
            self.total = Some(self.total.unwrap_or(0) + tokens);
        }
        completion.text
    }
}
