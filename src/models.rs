//! Data models for the clinical feedback tool.
//!
//! This module contains the survey record, the closed clinical vocabularies
//! it is built from, and the derived summary structures consumed by the
//! dashboard and the narrative analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a label does not name any variant of a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}' (expected one of: {expected})")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
    /// Accepted labels, comma separated.
    pub expected: String,
}

/// Declares a closed clinical vocabulary whose serialized form is the
/// persisted label. Aliases are ASCII spellings accepted on the command line.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $label:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The persisted label.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseLabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s.trim();
                $(
                    if value == $label $(|| value.eq_ignore_ascii_case($alias))* {
                        return Ok($name::$variant);
                    }
                )+
                Err(ParseLabelError {
                    kind: $kind,
                    value: value.to_string(),
                    expected: $name::ALL
                        .iter()
                        .map($name::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            }
        }
    };
}

labelled_enum! {
    /// Clinical unit the respondent works in.
    Department, "department" {
        Er => "急診室" | "er",
        Icu => "加護病房" | "icu",
        #[default]
        General => "一般病房" | "general",
        Or => "手術室" | "or",
        Outpatient => "門診" | "outpatient",
    }
}

labelled_enum! {
    /// Age group of the patient receiving the injection.
    PatientAgeGroup, "patient age group" {
        Neonate => "新生兒" | "neonate",
        Child => "兒童" | "child",
        #[default]
        Adult => "成人" | "adult",
        Elderly => "高齡者" | "elderly",
    }
}

labelled_enum! {
    /// Anatomical site of the venipuncture.
    InjectionSite, "injection site" {
        Dorsum => "手背" | "dorsum",
        #[default]
        Forearm => "前臂" | "forearm",
        Acf => "肘窩 (ACF)" | "acf",
        Foot => "足部" | "foot",
        Other => "其他" | "other",
    }
}

labelled_enum! {
    /// Catheter gauge used.
    NeedleSize, "needle size" {
        G18 => "18G" | "18",
        G20 => "20G" | "20",
        #[default]
        G22 => "22G" | "22",
        G24 => "24G" | "24",
        Safety => "Safety Needle" | "safety",
    }
}

/// Error returned for a rating outside the 1-5 Likert range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rating {0} is outside the 1-5 range")]
pub struct RatingError(pub u8);

/// A single 1-5 Likert answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Returns `None` when `value` is outside 1-5.
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// The form preselects the midpoint.
impl Default for Rating {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<u8> for Rating {
    type Error = RatingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(RatingError(value))
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse banding of the confidence answer used by the records table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Good,
    Fair,
    Poor,
}

impl From<Rating> for ConfidenceBand {
    fn from(rating: Rating) -> Self {
        match rating.get() {
            n if n >= 4 => ConfidenceBand::Good,
            3 => ConfidenceBand::Fair,
            _ => ConfidenceBand::Poor,
        }
    }
}

impl ConfidenceBand {
    /// Returns an emoji representation of the band.
    pub fn emoji(&self) -> &'static str {
        match self {
            ConfidenceBand::Good => "🟢",
            ConfidenceBand::Fair => "🟡",
            ConfidenceBand::Poor => "🔴",
        }
    }
}

/// Challenge labels offered by the submission form. The vocabulary is open;
/// records may carry labels outside this list.
pub const KNOWN_CHALLENGES: [&str; 8] = [
    "血管脆弱/過細",
    "患者極度不配合",
    "光線不足",
    "設備短缺/品質不良",
    "時間壓力緊迫",
    "水腫導致定位困難",
    "反覆置管困難",
    "穿刺點選擇受限",
];

/// One clinical feedback submission.
///
/// Field names and enum labels match the persisted JSON layout so existing
/// stores stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub department: Department,
    pub experience_years: u32,
    /// Up to two names; older stores persist an empty string for "none".
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub recommender: Option<String>,
    pub patient_age_group: PatientAgeGroup,
    pub injection_site: InjectionSite,
    pub needle_size: NeedleSize,
    pub confidence_level: Rating,
    pub technique_rating: Rating,
    pub equipment_quality: Rating,
    pub patient_cooperation: Rating,
    pub pain_management: Rating,
    pub environment_stress: Rating,
    pub top_challenges: Vec<String>,
    pub feedback_text: String,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

impl SurveyRecord {
    /// Individual recommender names (split on the ideographic or ASCII comma).
    pub fn recommenders(&self) -> Vec<&str> {
        self.recommender
            .as_deref()
            .map(|names| {
                names
                    .split(['、', ',', '，'])
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn confidence_band(&self) -> ConfidenceBand {
        ConfidenceBand::from(self.confidence_level)
    }
}

/// The five axes of the performance profile, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileAxis {
    Confidence,
    Equipment,
    Technique,
    PainManagement,
    Cooperation,
}

impl ProfileAxis {
    /// Axis position is meaningful to the radar rendering.
    pub const ORDER: [ProfileAxis; 5] = [
        ProfileAxis::Confidence,
        ProfileAxis::Equipment,
        ProfileAxis::Technique,
        ProfileAxis::PainManagement,
        ProfileAxis::Cooperation,
    ];

    /// Dashboard label.
    pub fn label(&self) -> &'static str {
        match self {
            ProfileAxis::Confidence => "自信心",
            ProfileAxis::Equipment => "器材滿意",
            ProfileAxis::Technique => "成功率",
            ProfileAxis::PainManagement => "痛控",
            ProfileAxis::Cooperation => "配合度",
        }
    }

    /// The record field this axis reads.
    pub fn rating_of(&self, record: &SurveyRecord) -> Rating {
        match self {
            ProfileAxis::Confidence => record.confidence_level,
            ProfileAxis::Equipment => record.equipment_quality,
            ProfileAxis::Technique => record.technique_rating,
            ProfileAxis::PainManagement => record.pain_management,
            ProfileAxis::Cooperation => record.patient_cooperation,
        }
    }
}

/// Mean of one profile axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisScore {
    pub axis: ProfileAxis,
    pub mean: f64,
    pub full_mark: u8,
}

/// Occurrences of one challenge label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeCount {
    pub label: String,
    pub count: usize,
}

/// Dashboard-ready statistics derived from a non-empty record list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub total: usize,
    pub department_counts: BTreeMap<Department, usize>,
    pub performance_profile: Vec<AxisScore>,
    pub site_averages: BTreeMap<InjectionSite, f64>,
    pub challenge_frequency: Vec<ChallengeCount>,
    pub avg_confidence: f64,
}

#[cfg(test)]
impl SummaryView {
    /// Profile mean for a single axis.
    pub fn axis_mean(&self, axis: ProfileAxis) -> Option<f64> {
        self.performance_profile
            .iter()
            .find(|score| score.axis == axis)
            .map(|score| score.mean)
    }
}

/// Narrative analysis returned by the text-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    pub summary: String,
    pub key_issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl AiAnalysis {
    /// Substituted whenever the analysis call fails in any way.
    pub fn fallback() -> Self {
        Self {
            summary: "目前無法進行 AI 深度分析，請檢查網路連線或稍後再試。".to_string(),
            key_issues: vec!["數據分析中斷".to_string()],
            recommendations: vec!["建議手動檢視臨床回饋內容".to_string()],
        }
    }
}

/// The two example records shown before anything has been submitted.
pub fn seed_records() -> Vec<SurveyRecord> {
    let now = Utc::now();
    vec![
        SurveyRecord {
            id: "1".to_string(),
            timestamp: now,
            department: Department::Er,
            experience_years: 5,
            recommender: Some("林曉華、陳大明".to_string()),
            patient_age_group: PatientAgeGroup::Adult,
            injection_site: InjectionSite::Forearm,
            needle_size: NeedleSize::G22,
            confidence_level: Rating(4),
            technique_rating: Rating(5),
            equipment_quality: Rating(3),
            patient_cooperation: Rating(2),
            pain_management: Rating(4),
            environment_stress: Rating(5),
            top_challenges: vec!["血管脆弱".to_string(), "光線不足".to_string()],
            feedback_text: "急診室環境嘈雜，有時候很難跟患者進行有效溝通。".to_string(),
        },
        SurveyRecord {
            id: "2".to_string(),
            timestamp: now,
            department: Department::Icu,
            experience_years: 10,
            recommender: Some("王小美".to_string()),
            patient_age_group: PatientAgeGroup::Adult,
            injection_site: InjectionSite::Dorsum,
            needle_size: NeedleSize::G20,
            confidence_level: Rating(5),
            technique_rating: Rating(5),
            equipment_quality: Rating(4),
            patient_cooperation: Rating(5),
            pain_management: Rating(5),
            environment_stress: Rating(2),
            top_challenges: vec!["患者水腫".to_string()],
            feedback_text: "重症患者的血管通常非常具挑戰性。".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_labels_serialize_as_persisted_literals() {
        assert_eq!(serde_json::to_string(&Department::Er).unwrap(), "\"急診室\"");
        assert_eq!(
            serde_json::to_string(&InjectionSite::Acf).unwrap(),
            "\"肘窩 (ACF)\""
        );
        assert_eq!(
            serde_json::to_string(&NeedleSize::Safety).unwrap(),
            "\"Safety Needle\""
        );
        let group: PatientAgeGroup = serde_json::from_str("\"高齡者\"").unwrap();
        assert_eq!(group, PatientAgeGroup::Elderly);
    }

    #[test]
    fn test_enum_from_str_accepts_label_and_alias() {
        assert_eq!("加護病房".parse::<Department>(), Ok(Department::Icu));
        assert_eq!("ICU".parse::<Department>(), Ok(Department::Icu));
        assert_eq!(" forearm ".parse::<InjectionSite>(), Ok(InjectionSite::Forearm));
        assert_eq!("safety".parse::<NeedleSize>(), Ok(NeedleSize::Safety));

        let err = "pharmacy".parse::<Department>().unwrap_err();
        assert_eq!(err.kind, "department");
        assert_eq!(err.value, "pharmacy");
        assert_eq!(err.expected, "急診室, 加護病房, 一般病房, 手術室, 門診");
        assert!(err.to_string().contains("expected one of: 急診室"));
    }

    #[test]
    fn test_enum_defaults_match_form() {
        assert_eq!(Department::default(), Department::General);
        assert_eq!(PatientAgeGroup::default(), PatientAgeGroup::Adult);
        assert_eq!(InjectionSite::default(), InjectionSite::Forearm);
        assert_eq!(NeedleSize::default(), NeedleSize::G22);
        assert_eq!(Department::ALL.len(), 5);
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_none());
        assert!(Rating::new(6).is_none());
        assert_eq!(Rating::new(5).map(Rating::get), Some(5));
        assert_eq!(Rating::try_from(9u8), Err(RatingError(9)));
        assert!(serde_json::from_str::<Rating>("7").is_err());
        assert_eq!(Rating::default().get(), 3);
    }

    #[test]
    fn test_confidence_band() {
        assert_eq!(ConfidenceBand::from(Rating(5)), ConfidenceBand::Good);
        assert_eq!(ConfidenceBand::from(Rating(4)), ConfidenceBand::Good);
        assert_eq!(ConfidenceBand::from(Rating(3)), ConfidenceBand::Fair);
        assert_eq!(ConfidenceBand::from(Rating(1)), ConfidenceBand::Poor);
        assert_eq!(ConfidenceBand::Poor.emoji(), "🔴");
    }

    #[test]
    fn test_record_reads_legacy_json() {
        let json = r#"{
            "id": "1718000000000",
            "timestamp": "2024-06-10T08:30:00.000Z",
            "department": "門診",
            "experienceYears": 3,
            "recommender": "",
            "patientAgeGroup": "兒童",
            "injectionSite": "足部",
            "needleSize": "24G",
            "confidenceLevel": 2,
            "techniqueRating": 3,
            "equipmentQuality": 4,
            "patientCooperation": 1,
            "painManagement": 3,
            "environmentStress": 4,
            "topChallenges": ["光線不足"],
            "feedbackText": ""
        }"#;

        let record: SurveyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.department, Department::Outpatient);
        assert_eq!(record.patient_age_group, PatientAgeGroup::Child);
        assert_eq!(record.injection_site, InjectionSite::Foot);
        assert_eq!(record.needle_size, NeedleSize::G24);
        assert_eq!(record.recommender, None);
        assert_eq!(record.confidence_band(), ConfidenceBand::Poor);

        let back = serde_json::to_value(&record).unwrap();
        assert!(back.get("recommender").is_none());
        assert_eq!(back["experienceYears"], 3);
        assert_eq!(back["department"], "門診");
    }

    #[test]
    fn test_record_rejects_out_of_range_rating() {
        let mut value = serde_json::to_value(&seed_records()[0]).unwrap();
        value["techniqueRating"] = serde_json::json!(0);
        assert!(serde_json::from_value::<SurveyRecord>(value).is_err());
    }

    #[test]
    fn test_recommenders_split() {
        let records = seed_records();
        assert_eq!(records[0].recommenders(), vec!["林曉華", "陳大明"]);
        assert_eq!(records[1].recommenders(), vec!["王小美"]);
    }

    #[test]
    fn test_seed_records() {
        let records = seed_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[1].department, Department::Icu);
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn test_profile_axis_order_and_labels() {
        let labels: Vec<_> = ProfileAxis::ORDER.iter().map(|a| a.label()).collect();
        assert_eq!(labels, vec!["自信心", "器材滿意", "成功率", "痛控", "配合度"]);

        let record = &seed_records()[0];
        assert_eq!(ProfileAxis::Equipment.rating_of(record).get(), 3);
        assert_eq!(ProfileAxis::Cooperation.rating_of(record).get(), 2);
    }

    #[test]
    fn test_ai_analysis_camel_case() {
        let analysis: AiAnalysis = serde_json::from_str(
            r#"{"summary":"s","keyIssues":["a"],"recommendations":["b","c"]}"#,
        )
        .unwrap();
        assert_eq!(analysis.key_issues, vec!["a"]);
        assert_eq!(analysis.recommendations.len(), 2);

        let fallback = AiAnalysis::fallback();
        assert_eq!(fallback.key_issues, vec!["數據分析中斷"]);
        assert_eq!(fallback.recommendations, vec!["建議手動檢視臨床回饋內容"]);
    }
}
