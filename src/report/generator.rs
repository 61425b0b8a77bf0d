//! Markdown and JSON dashboard generation.
//!
//! This module renders the summary statistics, the records table and an
//! optional narrative analysis into a dashboard document.

use crate::analysis::{records_at_site, top_challenges};
use crate::models::{AiAnalysis, SummaryView, SurveyRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata about the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// When the dashboard was generated.
    pub generated_at: DateTime<Utc>,
    /// Where the records were read from.
    pub store_location: String,
    /// Number of records summarized.
    pub record_count: usize,
    /// Model that produced the narrative analysis, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

/// The complete dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub metadata: ReportMetadata,
    /// `None` when there are no records.
    pub summary: Option<SummaryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AiAnalysis>,
}

/// Rendering options.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// How many challenges to list.
    pub max_challenges: usize,
    /// Append the full records table.
    pub include_records: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_challenges: 10,
            include_records: false,
        }
    }
}

/// Generate the Markdown dashboard.
pub fn generate_markdown_report(
    report: &DashboardReport,
    records: &[SurveyRecord],
    options: &RenderOptions,
) -> String {
    let mut output = String::new();

    output.push_str("# IV-Care Feedback Dashboard\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));

    match &report.summary {
        Some(summary) => {
            output.push_str(&generate_headline_section(summary));
            output.push_str(&generate_department_section(summary));
            output.push_str(&generate_profile_section(summary));
            output.push_str(&generate_site_section(summary, records));
            output.push_str(&generate_challenge_section(summary, options.max_challenges));
        }
        None => {
            output.push_str("## Summary\n\n");
            output.push_str("No feedback has been recorded yet.\n\n");
        }
    }

    if let Some(analysis) = &report.analysis {
        output.push_str(&generate_analysis_section(analysis));
    }

    if options.include_records && !records.is_empty() {
        output.push_str("## Records\n\n");
        output.push_str(&generate_records_table(records));
        output.push('\n');
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Store:** `{}`\n", metadata.store_location));
    section.push_str(&format!("- **Records:** {}\n", metadata.record_count));
    if let Some(model) = &metadata.model_used {
        section.push_str(&format!("- **Model Used:** `{}`\n", model));
    }
    section.push('\n');

    section
}

/// Total responses and average confidence, one decimal place.
pub fn generate_headline_section(summary: &SummaryView) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Responses | Average Confidence |\n");
    section.push_str("|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {:.1} / 5 |\n\n",
        summary.total, summary.avg_confidence
    ));

    section
}

fn generate_department_section(summary: &SummaryView) -> String {
    let mut section = String::new();

    section.push_str("### Responses by Department\n\n");
    section.push_str("| Department | Responses | Share |\n");
    section.push_str("|:---|:---:|:---:|\n");

    let mut departments: Vec<_> = summary.department_counts.iter().collect();
    departments.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

    for (department, count) in departments {
        let share = *count as f64 / summary.total as f64 * 100.0;
        section.push_str(&format!("| {} | {} | {:.0}% |\n", department, count, share));
    }
    section.push('\n');

    section
}

fn generate_profile_section(summary: &SummaryView) -> String {
    let mut section = String::new();

    section.push_str("### Performance Profile\n\n");
    section.push_str("| Axis | Mean | |\n");
    section.push_str("|:---|:---:|:---|\n");

    for score in &summary.performance_profile {
        section.push_str(&format!(
            "| {} | {:.1} / {} | {} |\n",
            score.axis.label(),
            score.mean,
            score.full_mark,
            bar(score.mean, score.full_mark)
        ));
    }
    section.push('\n');

    section
}

fn generate_site_section(summary: &SummaryView, records: &[SurveyRecord]) -> String {
    let mut section = String::new();

    section.push_str("### Technique Rating by Site\n\n");
    section.push_str("| Site | Average | Responses |\n");
    section.push_str("|:---|:---:|:---:|\n");

    for (site, average) in &summary.site_averages {
        section.push_str(&format!(
            "| {} | {:.1} | {} |\n",
            site,
            average,
            records_at_site(records, *site).count()
        ));
    }
    section.push('\n');

    section
}

fn generate_challenge_section(summary: &SummaryView, max: usize) -> String {
    let mut section = String::new();

    section.push_str("### Most Reported Challenges\n\n");

    let challenges = top_challenges(summary, max);
    if challenges.is_empty() {
        section.push_str("No challenges reported.\n\n");
        return section;
    }

    section.push_str("| # | Challenge | Reports |\n");
    section.push_str("|:---:|:---|:---:|\n");
    for (i, challenge) in challenges.iter().enumerate() {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            i + 1,
            escape_cell(&challenge.label),
            challenge.count
        ));
    }
    section.push('\n');

    section
}

/// Generate the narrative analysis section.
pub fn generate_analysis_section(analysis: &AiAnalysis) -> String {
    let mut section = String::new();

    section.push_str("## Narrative Analysis\n\n");
    section.push_str(&analysis.summary);
    section.push_str("\n\n");

    if !analysis.key_issues.is_empty() {
        section.push_str("### Key Issues\n\n");
        for issue in &analysis.key_issues {
            section.push_str(&format!("- {}\n", issue));
        }
        section.push('\n');
    }

    if !analysis.recommendations.is_empty() {
        section.push_str("### Recommendations\n\n");
        for (i, rec) in analysis.recommendations.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", i + 1, rec));
        }
        section.push('\n');
    }

    section
}

/// Newest-first records table.
pub fn generate_records_table(records: &[SurveyRecord]) -> String {
    let mut table = String::new();

    table.push_str(
        "| Time | Department | Years | Recommender | Patient | Site | Needle | Confidence | Challenges | Feedback |\n",
    );
    table.push_str("|:---|:---|:---:|:---|:---|:---|:---|:---:|:---|:---|\n");

    for record in records {
        let recommender = match record.recommenders().as_slice() {
            [] => "無".to_string(),
            names => names.join(", "),
        };
        let feedback = if record.feedback_text.trim().is_empty() {
            "無"
        } else {
            record.feedback_text.as_str()
        };

        table.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} {} | {} | {} |\n",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.department,
            record.experience_years,
            escape_cell(&recommender),
            record.patient_age_group,
            record.injection_site,
            record.needle_size,
            record.confidence_band().emoji(),
            record.confidence_level,
            escape_cell(&record.top_challenges.join(", ")),
            escape_cell(feedback),
        ));
    }

    table
}

fn bar(mean: f64, full_mark: u8) -> String {
    let filled = mean.round().clamp(0.0, f64::from(full_mark)) as usize;
    let empty = usize::from(full_mark) - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Generated by IV-Care 臨床回饋系統*\n".to_string()
}

/// Generate a JSON dashboard.
pub fn generate_json_report(report: &DashboardReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;
    use crate::models::seed_records;

    fn create_test_report(records: &[SurveyRecord], analysis: Option<AiAnalysis>) -> DashboardReport {
        DashboardReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                store_location: ".ivcare/iv_survey_responses.json".to_string(),
                record_count: records.len(),
                model_used: analysis.as_ref().map(|_| "test-model".to_string()),
            },
            summary: summarize(records),
            analysis,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let records = seed_records();
        let report = create_test_report(&records, None);
        let markdown = generate_markdown_report(&report, &records, &RenderOptions::default());

        assert!(markdown.contains("# IV-Care Feedback Dashboard"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("| 2 | 4.5 / 5 |"));
        assert!(markdown.contains("| 急診室 | 1 | 50% |"));
        assert!(markdown.contains("| 自信心 | 4.5 / 5 |"));
        assert!(markdown.contains("| 前臂 | 5.0 | 1 |"));
        assert!(markdown.contains("血管脆弱"));
        assert!(!markdown.contains("## Narrative Analysis"));
        assert!(!markdown.contains("## Records"));
    }

    #[test]
    fn test_empty_dashboard_shows_no_data() {
        let report = create_test_report(&[], None);
        let markdown = generate_markdown_report(&report, &[], &RenderOptions::default());

        assert!(markdown.contains("No feedback has been recorded yet."));
        assert!(!markdown.contains("Performance Profile"));
        assert!(!markdown.contains("NaN"));
    }

    #[test]
    fn test_analysis_section() {
        let records = seed_records();
        let report = create_test_report(&records, Some(AiAnalysis::fallback()));
        let markdown = generate_markdown_report(&report, &records, &RenderOptions::default());

        assert!(markdown.contains("## Narrative Analysis"));
        assert!(markdown.contains("- 數據分析中斷"));
        assert!(markdown.contains("1. 建議手動檢視臨床回饋內容"));
        assert!(markdown.contains("`test-model`"));
    }

    #[test]
    fn test_records_table() {
        let records = seed_records();
        let table = generate_records_table(&records);

        assert!(table.contains("林曉華, 陳大明"));
        assert!(table.contains("🟢 4"));
        assert!(table.contains("血管脆弱, 光線不足"));
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell("a|b\nc"), "a\\|b c");
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(4.4, 5), "████░");
        assert_eq!(bar(5.0, 5), "█████");
    }

    #[test]
    fn test_generate_json_report() {
        let records = seed_records();
        let report = create_test_report(&records, None);
        let json = generate_json_report(&report).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["summary"]["departmentCounts"]["加護病房"], 1);
        assert_eq!(value["summary"]["performanceProfile"][0]["axis"], "confidence");
        assert_eq!(value["summary"]["siteAverages"]["手背"], 5.0);
        assert!(value.get("analysis").is_none());

        let empty = generate_json_report(&create_test_report(&[], None)).unwrap();
        assert!(empty.contains("\"summary\": null"));
    }
}
