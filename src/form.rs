//! Submission form state and record construction.
//!
//! Numeric answers are parsed permissively: unparseable input falls back to
//! a default instead of rejecting the submission.

use crate::models::{
    Department, InjectionSite, NeedleSize, PatientAgeGroup, Rating, SurveyRecord,
    KNOWN_CHALLENGES,
};
use chrono::Utc;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of a permissive parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parsed<T> {
    pub value: T,
    /// True when the input could not be parsed and the default was used.
    pub defaulted: bool,
}

/// Parse `raw`, falling back to `T::default()` on failure.
pub fn parse_or_default<T>(raw: &str) -> Parsed<T>
where
    T: FromStr + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) => Parsed {
            value,
            defaulted: false,
        },
        Err(_) => Parsed {
            value: T::default(),
            defaulted: true,
        },
    }
}

/// Parse the run of ASCII digits at the start of `raw`, ignoring whatever
/// follows it, so "5.5" reads as 5 and "7年" as 7. Input without leading
/// digits, or too large for a `u32`, gives 0.
pub fn parse_leading_digits(raw: &str) -> Parsed<u32> {
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());

    parse_or_default(&unsigned[..end])
}

/// Which rating question an answer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingField {
    Confidence,
    Technique,
    Equipment,
    PatientCooperation,
    PainManagement,
    EnvironmentStress,
}

impl RatingField {
    pub fn question(&self) -> &'static str {
        match self {
            RatingField::Confidence => "操作自信心",
            RatingField::Technique => "置管成功率",
            RatingField::Equipment => "耗材品質滿意",
            RatingField::PatientCooperation => "病患配合度",
            RatingField::PainManagement => "疼痛管理成效",
            RatingField::EnvironmentStress => "環境壓力影響",
        }
    }
}

/// In-progress submission, initialised with the form defaults.
#[derive(Debug, Clone, Default)]
pub struct SurveyForm {
    pub department: Department,
    pub experience_years: u32,
    pub recommender: String,
    pub patient_age_group: PatientAgeGroup,
    pub injection_site: InjectionSite,
    pub needle_size: NeedleSize,
    pub confidence_level: Rating,
    pub technique_rating: Rating,
    pub equipment_quality: Rating,
    pub patient_cooperation: Rating,
    pub pain_management: Rating,
    pub environment_stress: Rating,
    top_challenges: Vec<String>,
    pub feedback_text: String,
}

impl SurveyForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the experience field from free text. Only the leading number is
    /// read; input that does not start with one becomes 0.
    pub fn set_experience_years(&mut self, raw: &str) -> bool {
        let parsed = parse_leading_digits(raw);
        if parsed.defaulted {
            debug!("Experience '{}' not a number, using 0", raw);
        }
        self.experience_years = parsed.value;
        !parsed.defaulted
    }

    /// Set a rating from free text. Anything outside 1-5 keeps the current
    /// answer. Returns whether the input was accepted.
    pub fn set_rating(&mut self, field: RatingField, raw: &str) -> bool {
        let parsed = raw.trim().parse::<u8>().ok().and_then(Rating::new);
        let slot = self.rating_mut(field);

        match parsed {
            Some(rating) => {
                *slot = rating;
                true
            }
            None => {
                warn!(
                    "Ignoring {} answer '{}', keeping {}",
                    field.question(),
                    raw,
                    slot
                );
                false
            }
        }
    }

    fn rating_mut(&mut self, field: RatingField) -> &mut Rating {
        match field {
            RatingField::Confidence => &mut self.confidence_level,
            RatingField::Technique => &mut self.technique_rating,
            RatingField::Equipment => &mut self.equipment_quality,
            RatingField::PatientCooperation => &mut self.patient_cooperation,
            RatingField::PainManagement => &mut self.pain_management,
            RatingField::EnvironmentStress => &mut self.environment_stress,
        }
    }

    /// Add the label if absent, remove it if present.
    pub fn toggle_challenge(&mut self, label: &str) {
        let label = label.trim();
        if label.is_empty() {
            return;
        }

        if let Some(pos) = self.top_challenges.iter().position(|c| c == label) {
            self.top_challenges.remove(pos);
        } else {
            if !KNOWN_CHALLENGES.contains(&label) {
                debug!("Custom challenge label: {}", label);
            }
            self.top_challenges.push(label.to_string());
        }
    }

    pub fn challenges(&self) -> &[String] {
        &self.top_challenges
    }

    /// Finalise the form into an immutable record with a fresh id and the
    /// current instant.
    pub fn submit(self) -> SurveyRecord {
        let recommender = self.recommender.trim();

        SurveyRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            department: self.department,
            experience_years: self.experience_years,
            recommender: (!recommender.is_empty()).then(|| recommender.to_string()),
            patient_age_group: self.patient_age_group,
            injection_site: self.injection_site,
            needle_size: self.needle_size,
            confidence_level: self.confidence_level,
            technique_rating: self.technique_rating,
            equipment_quality: self.equipment_quality,
            patient_cooperation: self.patient_cooperation,
            pain_management: self.pain_management,
            environment_stress: self.environment_stress,
            top_challenges: self.top_challenges,
            feedback_text: self.feedback_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default() {
        assert_eq!(
            parse_or_default::<u32>(" 12 "),
            Parsed {
                value: 12,
                defaulted: false
            }
        );
        assert_eq!(
            parse_or_default::<u32>("twelve"),
            Parsed {
                value: 0,
                defaulted: true
            }
        );
        assert!(parse_or_default::<u32>("-3").defaulted);
        assert!(parse_or_default::<u32>("").defaulted);
    }

    #[test]
    fn test_parse_leading_digits() {
        let value = |raw: &str| parse_leading_digits(raw).value;
        assert_eq!(value("5.5"), 5);
        assert_eq!(value("7年"), 7);
        assert_eq!(value("  12 years"), 12);
        assert_eq!(value("+3"), 3);
        assert_eq!(value("007"), 7);

        assert!(!parse_leading_digits("10").defaulted);
        assert!(parse_leading_digits("abc").defaulted);
        assert!(parse_leading_digits("-3").defaulted);
        assert!(parse_leading_digits("").defaulted);
        assert!(parse_leading_digits("99999999999").defaulted);
        assert_eq!(value("年7"), 0);
    }

    #[test]
    fn test_form_defaults() {
        let form = SurveyForm::new();
        assert_eq!(form.department, Department::General);
        assert_eq!(form.experience_years, 0);
        assert_eq!(form.injection_site, InjectionSite::Forearm);
        assert_eq!(form.needle_size, NeedleSize::G22);
        assert_eq!(form.confidence_level.get(), 3);
        assert_eq!(form.environment_stress.get(), 3);
        assert!(form.challenges().is_empty());
    }

    #[test]
    fn test_experience_defaults_to_zero() {
        let mut form = SurveyForm::new();
        assert!(form.set_experience_years("7"));
        assert_eq!(form.experience_years, 7);

        assert!(form.set_experience_years("5.5"));
        assert_eq!(form.experience_years, 5);

        assert!(form.set_experience_years("12年"));
        assert_eq!(form.experience_years, 12);

        assert!(!form.set_experience_years("seven"));
        assert_eq!(form.experience_years, 0);
    }

    #[test]
    fn test_set_rating_rejects_out_of_range() {
        let mut form = SurveyForm::new();
        assert!(form.set_rating(RatingField::Technique, "5"));
        assert_eq!(form.technique_rating.get(), 5);

        assert!(!form.set_rating(RatingField::Technique, "0"));
        assert!(!form.set_rating(RatingField::Technique, "abc"));
        assert_eq!(form.technique_rating.get(), 5);

        assert!(!form.set_rating(RatingField::PainManagement, "9"));
        assert_eq!(form.pain_management.get(), 3);
    }

    #[test]
    fn test_toggle_challenge_preserves_order() {
        let mut form = SurveyForm::new();
        form.toggle_challenge("光線不足");
        form.toggle_challenge("時間壓力緊迫");
        form.toggle_challenge("反覆置管困難");
        form.toggle_challenge("時間壓力緊迫");
        form.toggle_challenge("  ");

        assert_eq!(form.challenges(), &["光線不足", "反覆置管困難"]);
    }

    #[test]
    fn test_submit_stamps_id_and_time() {
        let mut form = SurveyForm::new();
        form.department = Department::Or;
        form.recommender = "  ".to_string();
        form.toggle_challenge("光線不足");

        let before = Utc::now();
        let first = form.clone().submit();
        let second = form.submit();

        assert_ne!(first.id, second.id);
        assert!(first.timestamp >= before);
        assert_eq!(first.department, Department::Or);
        assert_eq!(first.recommender, None);
        assert_eq!(first.top_challenges, vec!["光線不足"]);
    }
}
