//! # Percentile / Recommendation Engine
//!
//! Orders a candidate set by similarity to a synthetic "virtual point".
//!
//! 1. A [`PercentileProfile`] collects, per feature column, the sorted values of
//!    the analysed candidates. Only the candidate set contributes, so the same
//!    group id gives different anchors inside a playlist and across the whole
//!    library.
//! 2. The requested group resolves through a [`RecommendationTable`] to an
//!    [`Anchor`]: a target percentile (linear interpolation between the two
//!    nearest ranks) or the per-feature mean.
//! 3. Candidates are ranked by Euclidean distance to the anchor over min-max
//!    normalised features. The sort is stable, so storage order (explicit sort
//!    keys, then primary key) breaks exact ties.
//!
//! ```text
//! rank(P)  = P * (n - 1)
//! value(P) = v[floor] + (v[ceil] - v[floor]) * (rank - floor)
//! norm(x)  = (x - min) / (max - min)      0 when max == min
//! ```

use crate::db::Candidate;
use log::{debug, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const FEATURE_COUNT: usize = 8;

/// Values in [`Feature::ALL`] order.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Precomputed audio feature stored in `media_analysis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Rms,
    Zcr,
    Energy,
    SpectralCentroid,
    SpectralFlatness,
    SpectralSlope,
    SpectralRolloff,
    SpectralSpread,
}

impl Feature {
    pub const ALL: [Self; FEATURE_COUNT] = [
        Self::Rms,
        Self::Zcr,
        Self::Energy,
        Self::SpectralCentroid,
        Self::SpectralFlatness,
        Self::SpectralSlope,
        Self::SpectralRolloff,
        Self::SpectralSpread,
    ];

    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Rms => "rms",
            Self::Zcr => "zcr",
            Self::Energy => "energy",
            Self::SpectralCentroid => "spectral_centroid",
            Self::SpectralFlatness => "spectral_flatness",
            Self::SpectralSlope => "spectral_slope",
            Self::SpectralRolloff => "spectral_rolloff",
            Self::SpectralSpread => "spectral_spread",
        }
    }

    /// Position in a [`FeatureVector`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Where a group places its virtual point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Anchor {
    /// Target percentile in `[0, 1]`.
    Percentile(f64),
    /// Per-feature mean of the candidate set.
    Centroid,
}

/// Configuration of one recommendation group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationGroup {
    pub anchor: Anchor,
    #[serde(default = "all_features")]
    pub features: Vec<Feature>,
}

fn all_features() -> Vec<Feature> {
    Feature::ALL.to_vec()
}

impl RecommendationGroup {
    #[must_use]
    pub fn percentile(percentile: f64) -> Self {
        Self {
            anchor: Anchor::Percentile(percentile),
            features: all_features(),
        }
    }

    #[must_use]
    pub fn centroid() -> Self {
        Self {
            anchor: Anchor::Centroid,
            features: all_features(),
        }
    }
}

/// Group id to anchor/feature mapping. New groups are configuration, not code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationTable {
    groups: BTreeMap<i32, RecommendationGroup>,
}

/// Number of preset percentile groups.
const PRESET_GROUPS: i32 = 10;

impl Default for RecommendationTable {
    /// Groups `0..=9` spread evenly over the distribution:
    /// `P = (group + 1) / 11`.
    fn default() -> Self {
        let groups = (0..PRESET_GROUPS)
            .map(|group| {
                let percentile = f64::from(group + 1) / f64::from(PRESET_GROUPS + 1);
                (group, RecommendationGroup::percentile(percentile))
            })
            .collect();
        Self { groups }
    }
}

/// Outcome of looking up a group id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGroup {
    pub group: RecommendationGroup,
    /// `true` when the id was not configured and the centroid stood in.
    pub fallback: bool,
}

impl RecommendationTable {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, group_id: i32, group: RecommendationGroup) {
        self.groups.insert(group_id, group);
    }

    #[must_use]
    pub fn get(&self, group_id: i32) -> Option<&RecommendationGroup> {
        self.groups.get(&group_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &RecommendationGroup)> {
        self.groups.iter().map(|(id, group)| (*id, group))
    }

    /// Negative ids always mean the centroid. Unconfigured ids fall back to
    /// it as well, flagged so callers can report the substitution.
    #[must_use]
    pub fn resolve(&self, group_id: i32) -> ResolvedGroup {
        if let Some(group) = self.groups.get(&group_id) {
            return ResolvedGroup {
                group: group.clone(),
                fallback: false,
            };
        }

        let fallback = group_id >= 0;
        if fallback {
            warn!("Recommendation group {group_id} is not configured, using the centroid");
        }
        ResolvedGroup {
            group: RecommendationGroup::centroid(),
            fallback,
        }
    }
}

/// Sorted per-feature values of the analysed members of a candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileProfile {
    columns: Vec<Vec<f64>>,
}

impl PercentileProfile {
    #[must_use]
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let columns = Feature::ALL
            .par_iter()
            .map(|feature| {
                let mut values: Vec<f64> = candidates
                    .iter()
                    .filter_map(|candidate| candidate.features.as_ref())
                    .map(|features| features[feature.index()])
                    .filter(|value| value.is_finite())
                    .collect();
                values.sort_by(f64::total_cmp);
                values
            })
            .collect();

        Self { columns }
    }

    #[must_use]
    pub fn values(&self, feature: Feature) -> &[f64] {
        &self.columns[feature.index()]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(Vec::is_empty)
    }

    #[must_use]
    pub fn percentile(&self, feature: Feature, percentile: f64) -> Option<f64> {
        interpolate_percentile(self.values(feature), percentile)
    }

    #[must_use]
    pub fn mean(&self, feature: Feature) -> Option<f64> {
        let values = self.values(feature);
        if values.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = values.len() as f64;
        Some(values.iter().sum::<f64>() / count)
    }

    /// `(min, max)` of a feature over the profile.
    #[must_use]
    pub fn range(&self, feature: Feature) -> Option<(f64, f64)> {
        let values = self.values(feature);
        Some((*values.first()?, *values.last()?))
    }
}

/// Value at `percentile` of an ascending slice, interpolating linearly between
/// the two nearest ranks. `percentile` is clamped to `[0, 1]`.
///
/// # Examples
///
/// ```
/// use mixquery::recommend::interpolate_percentile;
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(interpolate_percentile(&values, 0.5), Some(3.0));
/// assert_eq!(interpolate_percentile(&values, 0.125), Some(1.5));
/// assert_eq!(interpolate_percentile(&[], 0.5), None);
/// ```
#[must_use]
pub fn interpolate_percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let percentile = if percentile.is_nan() {
        0.5
    } else {
        percentile.clamp(0.0, 1.0)
    };

    #[allow(clippy::cast_precision_loss)]
    let rank = percentile * last as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(last);
    #[allow(clippy::cast_precision_loss)]
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Synthetic anchor point, one coordinate per feature of its group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualPoint {
    pub coordinates: Vec<(Feature, f64)>,
}

impl VirtualPoint {
    /// Build the anchor for `group` from `profile`. `None` when no candidate
    /// has analysis data.
    #[must_use]
    pub fn from_profile(profile: &PercentileProfile, group: &RecommendationGroup) -> Option<Self> {
        let coordinates: Vec<(Feature, f64)> = group
            .features
            .iter()
            .filter_map(|&feature| {
                let value = match group.anchor {
                    Anchor::Percentile(p) => profile.percentile(feature, p),
                    Anchor::Centroid => profile.mean(feature),
                };
                value.map(|v| (feature, v))
            })
            .collect();

        if coordinates.is_empty() {
            None
        } else {
            Some(Self { coordinates })
        }
    }

    #[must_use]
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.coordinates
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, value)| *value)
    }
}

/// Min-max scaling derived from a profile.
#[derive(Debug, Clone)]
struct Normalizer {
    ranges: Vec<Option<(f64, f64)>>,
}

impl Normalizer {
    fn new(profile: &PercentileProfile) -> Self {
        Self {
            ranges: Feature::ALL.iter().map(|&f| profile.range(f)).collect(),
        }
    }

    fn normalize(&self, feature: Feature, value: f64) -> f64 {
        match self.ranges[feature.index()] {
            Some((min, max)) if max > min => (value - min) / (max - min),
            _ => 0.0,
        }
    }
}

fn distance(features: &FeatureVector, point: &VirtualPoint, normalizer: &Normalizer) -> f64 {
    point
        .coordinates
        .iter()
        .map(|&(feature, anchor)| {
            let value = features[feature.index()];
            let delta =
                normalizer.normalize(feature, value) - normalizer.normalize(feature, anchor);
            delta * delta
        })
        .sum::<f64>()
        .sqrt()
}

/// Candidates in recommendation order, plus the anchor that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub ordered: Vec<Candidate>,
    pub virtual_point: Option<VirtualPoint>,
}

/// Rank `candidates` (already in storage order) by distance to the group's
/// virtual point.
///
/// Candidates without analysis data follow all analysed ones, keeping storage
/// order. With no analysed candidate at all there is no virtual point and the
/// storage order is returned unchanged.
#[must_use]
pub fn recommend(candidates: Vec<Candidate>, group: &RecommendationGroup) -> Recommendation {
    let profile = PercentileProfile::from_candidates(&candidates);

    let Some(point) = VirtualPoint::from_profile(&profile, group) else {
        debug!(
            "No analysed candidates among {}, keeping storage order",
            candidates.len()
        );
        return Recommendation {
            ordered: candidates,
            virtual_point: None,
        };
    };
    debug!("Virtual point: {:?}", point.coordinates);

    let normalizer = Normalizer::new(&profile);
    let distances: Vec<f64> = candidates
        .par_iter()
        .map(|candidate| match &candidate.features {
            Some(features) => distance(features, &point, &normalizer),
            None => f64::INFINITY,
        })
        .collect();

    let mut ranked: Vec<(f64, Candidate)> = distances.into_iter().zip(candidates).collect();
    // Stable: equal distances keep storage order.
    ranked.par_sort_by(|(a, _), (b, _)| a.total_cmp(b));

    for (distance, candidate) in ranked.iter().take(10) {
        trace!("Candidate {} at distance {distance:.4}", candidate.file.id);
    }

    Recommendation {
        ordered: ranked.into_iter().map(|(_, candidate)| candidate).collect(),
        virtual_point: Some(point),
    }
}
