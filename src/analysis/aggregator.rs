//! Record aggregation and statistics.
//!
//! This module turns the raw record list into the summary structures the
//! dashboard renders. Every function here is pure.

use crate::models::{
    AxisScore, ChallengeCount, Department, InjectionSite, ProfileAxis, Rating, SummaryView,
    SurveyRecord,
};
use std::collections::{BTreeMap, HashMap};

/// Compute the dashboard summary.
///
/// Returns `None` for an empty record list: a mean over zero records is
/// undefined, and callers render a "no data" state instead.
pub fn summarize(records: &[SurveyRecord]) -> Option<SummaryView> {
    if records.is_empty() {
        return None;
    }

    Some(SummaryView {
        total: records.len(),
        department_counts: department_counts(records),
        performance_profile: performance_profile(records)?,
        site_averages: site_averages(records),
        challenge_frequency: challenge_frequency(records),
        avg_confidence: mean_of(records, |r| r.confidence_level)?,
    })
}

/// Arithmetic mean of one rating field, `None` for no records.
pub fn mean_of<'a, I, F>(records: I, field: F) -> Option<f64>
where
    I: IntoIterator<Item = &'a SurveyRecord>,
    F: Fn(&SurveyRecord) -> Rating,
{
    let (sum, count) = records
        .into_iter()
        .fold((0u64, 0usize), |(sum, count), r| {
            (sum + u64::from(field(r).get()), count + 1)
        });

    (count > 0).then(|| sum as f64 / count as f64)
}

/// Count records per department. Only departments that occur are present.
pub fn department_counts(records: &[SurveyRecord]) -> BTreeMap<Department, usize> {
    let mut counts: BTreeMap<Department, usize> = BTreeMap::new();

    for record in records {
        *counts.entry(record.department).or_default() += 1;
    }

    counts
}

/// Mean of each profile axis, in [`ProfileAxis::ORDER`].
pub fn performance_profile(records: &[SurveyRecord]) -> Option<Vec<AxisScore>> {
    ProfileAxis::ORDER
        .iter()
        .map(|axis| {
            mean_of(records, |r| axis.rating_of(r)).map(|mean| AxisScore {
                axis: *axis,
                mean,
                full_mark: Rating::MAX,
            })
        })
        .collect()
}

/// Mean technique rating per injection site, over the records at that site.
pub fn site_averages(records: &[SurveyRecord]) -> BTreeMap<InjectionSite, f64> {
    let mut totals: BTreeMap<InjectionSite, (u64, usize)> = BTreeMap::new();

    for record in records {
        let entry = totals.entry(record.injection_site).or_insert((0, 0));
        entry.0 += u64::from(record.technique_rating.get());
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(site, (sum, count))| (site, sum as f64 / count as f64))
        .collect()
}

/// Occurrences of each challenge label across all records, most frequent
/// first. Equal counts keep the order in which labels were first seen.
pub fn challenge_frequency(records: &[SurveyRecord]) -> Vec<ChallengeCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<ChallengeCount> = Vec::new();

    for label in records.iter().flat_map(|r| &r.top_challenges) {
        match index.get(label.as_str()).copied() {
            Some(i) => counts[i].count += 1,
            None => {
                index.insert(label.as_str(), counts.len());
                counts.push(ChallengeCount {
                    label: label.clone(),
                    count: 1,
                });
            }
        }
    }

    counts.sort_by_key(|c| std::cmp::Reverse(c.count));
    counts
}

/// Records at a single site.
pub fn records_at_site(
    records: &[SurveyRecord],
    site: InjectionSite,
) -> impl Iterator<Item = &SurveyRecord> {
    records.iter().filter(move |r| r.injection_site == site)
}

/// The `n` most frequent challenges.
pub fn top_challenges(summary: &SummaryView, n: usize) -> &[ChallengeCount] {
    let end = n.min(summary.challenge_frequency.len());
    &summary.challenge_frequency[..end]
}
