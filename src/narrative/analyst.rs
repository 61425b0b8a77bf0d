//! Narrative analysis of the feedback collection.
//!
//! Records are reduced to their text-relevant fields, sent with an
//! instruction and a response schema, and the reply is parsed into an
//! [`AiAnalysis`]. Any failure degrades to [`AiAnalysis::fallback`].

use super::ollama::TextGenerator;
use super::AnalysisError;
use crate::models::{
    AiAnalysis, Department, InjectionSite, NeedleSize, PatientAgeGroup, Rating, SurveyRecord,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The part of a record the analysis sees. No ids, no timestamps.
#[derive(Debug, Serialize)]
pub struct AnalysisContext<'a> {
    pub dept: Department,
    pub exp: u32,
    pub patient: PatientAgeGroup,
    pub site: InjectionSite,
    pub needle: NeedleSize,
    pub conf: Rating,
    pub challenges: &'a [String],
    pub text: &'a str,
}

impl<'a> From<&'a SurveyRecord> for AnalysisContext<'a> {
    fn from(record: &'a SurveyRecord) -> Self {
        Self {
            dept: record.department,
            exp: record.experience_years,
            patient: record.patient_age_group,
            site: record.injection_site,
            needle: record.needle_size,
            conf: record.confidence_level,
            challenges: &record.top_challenges,
            text: &record.feedback_text,
        }
    }
}

/// JSON schema requested from the service.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "keyIssues": { "type": "array", "items": { "type": "string" } },
            "recommendations": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["summary", "keyIssues", "recommendations"]
    })
}

/// Build the instruction plus the JSON-encoded reduced record set.
pub fn build_prompt(records: &[SurveyRecord]) -> Result<String, AnalysisError> {
    let context: Vec<AnalysisContext<'_>> = records.iter().map(AnalysisContext::from).collect();
    let data = serde_json::to_string(&context)?;

    let mut prompt = String::new();
    prompt.push_str("你是一位資深的臨床護理品質管理專家，同時負責護理教育。\n");
    prompt.push_str("以下是護理人員執行靜脈注射 (IV) 後填寫的回饋資料，請進行分析：\n\n");
    prompt.push_str("1. 歸納目前臨床人員最常遇到的困難。\n");
    prompt.push_str("2. 指出特定病患族群（例如高齡者）或特定單位（例如急診）是否有系統性問題。\n");
    prompt.push_str("3. 依據國際靜脈輸液護理標準 (INS Standards)，提出技術、設備或教育訓練的具體改善建議。\n\n");
    prompt.push_str("回饋資料（JSON）：\n");
    prompt.push_str(&data);
    prompt.push_str("\n\n請只回傳 JSON 物件，欄位如下：\n");
    prompt.push_str("- summary: 一段精簡的現況綜述。\n");
    prompt.push_str("- keyIssues: 3 到 5 個關鍵瓶頸（字串陣列）。\n");
    prompt.push_str("- recommendations: 3 到 5 個具體改進行動（字串陣列）。\n");

    Ok(prompt)
}

/// Parse the service reply. Tolerates a markdown code fence or stray text
/// around the JSON object.
pub fn parse_analysis(reply: &str) -> Result<AiAnalysis, AnalysisError> {
    let start = reply.find('{');
    let end = reply.rfind('}');

    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => {
            return Err(AnalysisError::ResponseParse(
                "no JSON object in reply".to_string(),
            ))
        }
    };

    let value: Value =
        serde_json::from_str(body).map_err(|e| AnalysisError::ResponseParse(e.to_string()))?;
    let analysis: AiAnalysis =
        serde_json::from_value(value).map_err(|e| AnalysisError::Schema(e.to_string()))?;

    if !(3..=5).contains(&analysis.key_issues.len())
        || !(3..=5).contains(&analysis.recommendations.len())
    {
        debug!(
            "Reply has {} issues and {} recommendations (3-5 expected)",
            analysis.key_issues.len(),
            analysis.recommendations.len()
        );
    }

    Ok(analysis)
}

/// Result of one analysis attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(AiAnalysis),
    /// The call failed; `analysis` is the fixed fallback.
    Fallback { analysis: AiAnalysis, reason: String },
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> &AiAnalysis {
        match self {
            AnalysisOutcome::Completed(analysis) => analysis,
            AnalysisOutcome::Fallback { analysis, .. } => analysis,
        }
    }

    #[cfg(test)]
    pub fn is_fallback(&self) -> bool {
        matches!(self, AnalysisOutcome::Fallback { .. })
    }
}

/// Runs narrative analysis through a [`TextGenerator`] with a deadline.
pub struct NarrativeAnalyst<G> {
    generator: G,
    timeout: Duration,
}

impl<G: TextGenerator> NarrativeAnalyst<G> {
    pub fn new(generator: G, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Single best-effort attempt; errors are returned, not recovered.
    pub async fn try_analyze(&self, records: &[SurveyRecord]) -> Result<AiAnalysis, AnalysisError> {
        let prompt = build_prompt(records)?;
        let schema = response_schema();

        info!("Requesting narrative analysis of {} records", records.len());

        let reply = tokio::time::timeout(self.timeout, self.generator.generate(&prompt, &schema))
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout))??;

        parse_analysis(&reply)
    }

    /// Analyze, substituting the fallback analysis on any failure.
    pub async fn analyze(&self, records: &[SurveyRecord]) -> AnalysisOutcome {
        match self.try_analyze(records).await {
            Ok(analysis) => AnalysisOutcome::Completed(analysis),
            Err(e) => {
                warn!("Narrative analysis failed: {}", e);
                AnalysisOutcome::Fallback {
                    analysis: AiAnalysis::fallback(),
                    reason: e.to_string(),
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::seed_records;

    #[test]
    fn test_context_drops_identifiers() {
        let records = seed_records();
        let context = AnalysisContext::from(&records[0]);
        let value = serde_json::to_value(&context).unwrap();

        assert_eq!(value["dept"], "急診室");
        assert_eq!(value["exp"], 5);
        assert_eq!(value["site"], "前臂");
        assert_eq!(value["conf"], 4);
        assert!(value.get("id").is_none());
        assert!(value.get("timestamp").is_none());
        assert!(value.get("recommender").is_none());
    }

    #[test]
    fn test_prompt_embeds_reduced_records() {
        let prompt = build_prompt(&seed_records()).unwrap();
        assert!(prompt.contains("INS Standards"));
        assert!(prompt.contains("\"dept\":\"加護病房\""));
        assert!(prompt.contains("keyIssues"));
        assert!(!prompt.contains("\"timestamp\""));
    }

    #[test]
    fn test_schema_requires_three_fields() {
        let schema = response_schema();
        assert_eq!(
            schema["required"],
            json!(["summary", "keyIssues", "recommendations"])
        );
    }

    #[test]
    fn test_parse_analysis_accepts_fenced_reply() {
        let reply = format!("```json\n{}\n```", GOOD_REPLY);
        let analysis = parse_analysis(&reply).unwrap();
        assert_eq!(analysis.summary, "整體表現穩定");
        assert_eq!(analysis.key_issues.len(), 3);
    }

    #[test]
    fn test_parse_analysis_errors() {
        assert!(matches!(
            parse_analysis("no json here"),
            Err(AnalysisError::ResponseParse(_))
        ));
        assert!(matches!(
            parse_analysis("{\"summary\": }"),
            Err(AnalysisError::ResponseParse(_))
        ));
        assert!(matches!(
            parse_analysis(r#"{"summary":"s","keyIssues":"not a list"}"#),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let analyst = NarrativeAnalyst::new(StubGenerator::ok(GOOD_REPLY), Duration::from_secs(5));
        let outcome = analyst.analyze(&seed_records()).await;

        assert!(!outcome.is_fallback());
        assert_eq!(outcome.analysis().recommendations[0], "改善照明");
    }

    #[tokio::test]
    async fn test_transport_failure_yields_fallback() {
        let analyst = NarrativeAnalyst::new(StubGenerator::failing(), Duration::from_secs(5));
        let outcome = analyst.analyze(&seed_records()).await;

        assert!(outcome.is_fallback());
        assert_eq!(outcome.analysis(), &AiAnalysis::fallback());
    }

    #[tokio::test]
    async fn test_schema_mismatch_yields_fallback() {
        let analyst = NarrativeAnalyst::new(
            StubGenerator::ok(r#"{"verdict": "fine"}"#),
            Duration::from_secs(5),
        );
        let outcome = analyst.analyze(&seed_records()).await;
        assert_eq!(outcome.analysis(), &AiAnalysis::fallback());
    }

    #[test]
    fn test_timeout_yields_fallback() {
        tokio_test::block_on(async {
            let analyst = NarrativeAnalyst::new(
                StubGenerator::slow(GOOD_REPLY, Duration::from_secs(30)),
                Duration::from_millis(20),
            );

            let err = analyst.try_analyze(&seed_records()).await.unwrap_err();
            assert!(matches!(err, AnalysisError::Timeout(_)));

            let outcome = analyst.analyze(&seed_records()).await;
            match outcome {
                AnalysisOutcome::Fallback { analysis, reason } => {
                    assert_eq!(analysis, AiAnalysis::fallback());
                    assert!(reason.contains("timed out"));
                }
                other => panic!("expected fallback, got {:?}", other),
            }
        });
    }
}
