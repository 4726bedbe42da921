//! Prompt assembly
//!
//! System prompts and user payload builders for the four structured
//! operations. Prompts are built in sections from the investigation
//! context so the model only ever sees tables that actually exist.

use crate::models::{AnomalyAlert, Evidence, Hypothesis, InvestigationContext, QueryResult};

/// Base system prompt for hypothesis generation
const HYPOTHESES_PROMPT_BASE: &str = r#"You are a senior data reliability engineer investigating a data-quality anomaly.

Given an anomaly alert and context about the affected dataset, produce candidate hypotheses that could explain the anomaly.

## Rules
1. Each hypothesis must belong to exactly one category:
   - upstream_dependency: a source table or feed failed or degraded
   - transformation_bug: the pipeline producing this dataset has a logic defect
   - data_quality: bad records entered the data itself
   - infrastructure: storage, compute, or scheduling failure
   - expected_variance: the deviation is normal (seasonality, campaign, backfill)
2. Prefer diversity: cover different categories rather than restating one idea.
3. Each suggested_query must be a single read-only SELECT against the tables listed in the context. Never invent tables or columns.
4. Reason from the evidence in the context (lineage, correlations, time-series pattern), not from generic possibilities."#;

/// Output contract for hypothesis generation
const HYPOTHESES_JSON_FORMAT: &str = r#"

## Output format

Respond with a JSON object:

```json
{
  "hypotheses": [
    {
      "id": "h001",
      "title": "Short hypothesis title",
      "category": "upstream_dependency",
      "reasoning": "Why this could explain the anomaly, citing context",
      "suggested_query": "SELECT ... LIMIT 100"
    }
  ]
}
```

Field notes:
- id: "h001", "h002", ... in order
- category: one of the five categories above, exactly
- suggested_query: one SELECT statement, with a LIMIT"#;

pub fn hypotheses_system_prompt(max_hypotheses: usize) -> String {
    format!(
        "{HYPOTHESES_PROMPT_BASE}\n5. Produce at most {max_hypotheses} hypotheses.{HYPOTHESES_JSON_FORMAT}"
    )
}

pub fn hypotheses_user_prompt(alert: &AnomalyAlert, context: &InvestigationContext) -> String {
    format!(
        "ANOMALY:\n{}\n\nCONTEXT:\n{}",
        alert.summary(),
        context.to_prompt_string()
    )
}

/// System prompt for probe generation
const QUERY_PROMPT: &str = r#"You write one read-only SQL probe to test a hypothesis about a data anomaly.

## Rules
1. Output exactly one SELECT statement. No DDL, no DML, no multiple statements.
2. Use ONLY tables and columns from the provided schema.
3. Include a LIMIT clause.
4. The query must produce evidence that could CONFIRM OR REFUTE the hypothesis, not merely restate the anomaly.
5. Do not repeat a query that was already run; each probe must add information.

Respond with the SQL only, in a ```sql fence."#;

pub fn query_system_prompt() -> String {
    QUERY_PROMPT.to_string()
}

pub fn query_user_prompt(
    alert: &AnomalyAlert,
    context: &InvestigationContext,
    hypothesis: &Hypothesis,
    prior_queries: &[String],
    prior_failures: &[String],
    critique: Option<&str>,
) -> String {
    let mut sections = vec![
        format!("ANOMALY:\n{}", alert.summary()),
        format!(
            "HYPOTHESIS ({}): {}\nReasoning: {}",
            hypothesis.category.as_str(),
            hypothesis.title,
            hypothesis.reasoning
        ),
        context.schema.to_prompt_string(10, 15),
    ];

    if !prior_queries.is_empty() {
        sections.push(format!(
            "QUERIES ALREADY RUN (do not repeat):\n{}",
            prior_queries.join("\n")
        ));
    }
    if !prior_failures.is_empty() {
        sections.push(format!(
            "QUERIES THAT FAILED (avoid their mistakes):\n{}",
            prior_failures.join("\n")
        ));
    }
    if let Some(critique) = critique {
        sections.push(format!(
            "CRITIQUE OF THE PREVIOUS ATTEMPT (address this directly):\n{critique}"
        ));
    }

    sections.join("\n\n")
}

/// System prompt for evidence interpretation
const INTERPRET_PROMPT: &str = r#"You interpret the result of a SQL probe as evidence for or against a hypothesis about a data anomaly.

## Rules
1. Decide supports_hypothesis honestly: true, false, or null when the result is genuinely ambiguous. Refuting a hypothesis is as valuable as confirming one.
2. causal_chain must explain the mechanism step by step, from cause to observed symptom, with timing when the data shows it.
3. key_findings must cite concrete numbers from the result.
4. confidence reflects how strongly THIS result bears on THIS hypothesis, not how plausible the hypothesis sounds.

## Output format

```json
{
  "interpretation": "What the result means for the hypothesis",
  "causal_chain": ["cause", "intermediate step", "observed symptom"],
  "confidence": 0.8,
  "key_findings": ["count=500 on 2024-01-15, half the expected 1000"],
  "supports_hypothesis": true
}
```"#;

pub fn interpret_system_prompt() -> String {
    INTERPRET_PROMPT.to_string()
}

pub fn interpret_user_prompt(
    alert: &AnomalyAlert,
    hypothesis: &Hypothesis,
    query: &str,
    result: &QueryResult,
) -> String {
    format!(
        "ANOMALY:\n{}\n\nHYPOTHESIS ({}): {}\n\nQUERY RUN:\n{}\n\nRESULT:\n{}",
        alert.summary(),
        hypothesis.category.as_str(),
        hypothesis.title,
        query,
        result.to_summary(5)
    )
}

/// System prompt for synthesis
const SYNTHESIZE_PROMPT: &str = r#"You synthesize the evidence from a completed anomaly investigation into a single root-cause finding.

## Rules
1. root_cause names the specific mechanism, not a category. Null if the evidence does not support a conclusion.
2. confidence reflects the strength and consistency of the evidence; conflicting evidence lowers it.
3. causal_chain runs from root cause to the observed anomaly.
4. estimated_onset is when the problem started, if the evidence shows it.
5. recommendations are concrete actions an engineer can execute, most valuable first.
6. supporting_evidence lists the ids of the evidence entries the conclusion rests on.

## Output format

```json
{
  "root_cause": "The stg_users load job failed, so half the orders lost their user join",
  "confidence": 0.85,
  "causal_chain": ["ETL failure", "missing user rows", "orders dropped by join"],
  "estimated_onset": "2024-01-15T03:00:00Z",
  "affected_scope": "public.orders rows for 2024-01-15",
  "supporting_evidence": ["h001-e000"],
  "recommendations": ["Re-run the stg_users load for 2024-01-15", "Add a row-count check on stg_users"]
}
```"#;

pub fn synthesize_system_prompt() -> String {
    SYNTHESIZE_PROMPT.to_string()
}

pub fn synthesize_user_prompt(
    alert: &AnomalyAlert,
    context: &InvestigationContext,
    evidence: &[Evidence],
    critique: Option<&str>,
) -> String {
    let mut sections = vec![format!("ANOMALY:\n{}", alert.summary())];

    if evidence.is_empty() {
        sections.push("EVIDENCE: none was accepted; say so honestly.".to_string());
    } else {
        let mut lines = vec!["EVIDENCE:".to_string()];
        for (index, item) in evidence.iter().enumerate() {
            lines.push(format!(
                "[{}] hypothesis={} supports={:?} confidence={:.2}\n  query: {}\n  interpretation: {}\n  findings: {}",
                item.evidence_id(index),
                item.hypothesis_id,
                item.supports_hypothesis,
                item.confidence,
                item.query,
                item.interpretation,
                item.key_findings.join("; "),
            ));
        }
        sections.push(lines.join("\n"));
    }

    sections.push(format!(
        "LINEAGE AND CONTEXT SUMMARY:\n{}",
        context
            .lineage
            .as_ref()
            .map(|l| l.to_prompt_string(3))
            .unwrap_or_else(|| "(no lineage available)".to_string())
    ));

    if let Some(critique) = critique {
        sections.push(format!(
            "CRITIQUE OF THE PREVIOUS SYNTHESIS (address this directly):\n{critique}"
        ));
    }

    sections.join("\n\n")
}
