//! Prompt definitions for the reasoning agent
//!
//! The agent runs four completions per task. The system prompt is shared;
//! the user prompts are built from the task and the earlier responses. The
//! alternatives and decision prompts ask for the line-oriented blocks that
//! [`crate::parsing`] understands.

use crate::decision::Payload;

/// System prompt shared by every analysis step.
pub const DECISION_SYSTEM_PROMPT: &str =
    "You are a rational decision-making agent. Provide detailed, structured analysis.";

/// Context value of `analysis_type` that selects the investment prompt.
pub const INVESTMENT_ANALYSIS: &str = "investment";

/// Aspects an investment analysis must cover.
pub const INVESTMENT_ASPECTS: [&str; 4] = [
    "business_model",
    "market_position",
    "growth_potential",
    "risks",
];

/// Step 1: break the task down.
///
/// Uses the investment variant when the context has
/// `analysis_type = "investment"` and a `company`.
pub fn analysis_prompt(task: &str, context: &Payload) -> String {
    let investment_company = context
        .get("analysis_type")
        .and_then(|v| v.as_str())
        .filter(|kind| *kind == INVESTMENT_ANALYSIS)
        .and_then(|_| context.get("company"))
        .and_then(|v| v.as_str());

    if let Some(company) = investment_company {
        return format!(
            r#"Analyze {company} as an investment opportunity. Consider:
1. Business Model & Competitive Advantage
2. Market Position & Industry Analysis
3. Growth Potential & Expansion Opportunities
4. Financial Health & Performance
5. Management & Leadership
6. Risks & Challenges

Provide a comprehensive analysis covering each aspect."#
        );
    }

    let context = serde_json::to_string(context).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"Analyze the following task in detail:
Task: {task}
Context: {context}

Consider:
1. Key objectives and constraints
2. Critical factors to consider
3. Potential challenges and opportunities
4. Relevant context and implications

Provide a structured analysis that breaks down the problem."#
    )
}

/// Step 2: propose alternatives in `START_ALTERNATIVE` blocks.
pub fn alternatives_prompt(task: &str, analysis: &str) -> String {
    format!(
        r#"Based on this analysis: {analysis}

Generate multiple alternative approaches for: {task}

For each alternative:
1. Describe the approach
2. List key advantages
3. List potential disadvantages
4. Rate feasibility (1-10)

Format each alternative as:
START_ALTERNATIVE
Approach: [Description]
Advantages: [List]
Disadvantages: [List]
Feasibility: [1-10]
END_ALTERNATIVE"#
    )
}

/// Step 3: compare the alternatives.
pub fn tradeoff_prompt(task: &str, alternatives: &str) -> String {
    format!(
        r#"Given these alternatives: {alternatives}

Analyze the trade-offs for: {task}

Consider:
1. Cost-benefit analysis
2. Risk-reward assessment
3. Short-term vs long-term implications
4. Resource requirements

Provide a structured comparison of the trade-offs."#
    )
}

/// Step 4: commit to a decision in a `START_DECISION` block.
pub fn decision_prompt(task: &str, analysis: &str, alternatives: &str, tradeoffs: &str) -> String {
    format!(
        r#"Based on:
Initial Analysis: {analysis}
Alternatives: {alternatives}
Trade-offs: {tradeoffs}

Make a final decision for: {task}

Provide:
1. Clear decision/recommendation
2. Confidence level (0-1)
3. Detailed reasoning

Format:
START_DECISION
Decision: [Your decision]
Confidence: [0-1]
Reasoning: [Detailed explanation]
END_DECISION"#
    )
}
