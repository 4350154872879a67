use serde::{Deserialize, Serialize};

pub type ClaimId = i64;
pub type PremiseId = String;

/// Dense embedding of a single claim or premise.
pub type Representation = Vec<f32>;

/// Premise IDs ordered by decreasing predicted relevance.
pub type Ranking = Vec<PremiseId>;

/// One row of a ground-truth assignment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub claim_id: ClaimId,
    pub premise_id: PremiseId,
    pub relevance: f64,
    /// Ground-truth cluster label; absent for premises nobody clustered.
    #[serde(default, deserialize_with = "deserialize_cluster_label")]
    pub premise_cluster: Option<i64>,
}

/// Accepts `3`, `3.0`, an empty field, `NaN` or null.
/// Spreadsheet exports write integer labels as floats once a column has gaps.
fn deserialize_cluster_label<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let raw: Option<f64> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(x) if x.is_nan() => Ok(None),
        Some(x) if x.fract() == 0.0 => Ok(Some(x as i64)),
        Some(x) => Err(D::Error::custom(format!(
            "cluster label must be integral, got {x}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepresentativeMode {
    ClosestToCenter,
    ClosestToClaim,
}

impl RepresentativeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClosestToCenter => "closest-to-center",
            Self::ClosestToClaim => "closest-to-claim",
        }
    }
}

impl std::str::FromStr for RepresentativeMode {
    type Err = crate::error::ArclusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closest-to-center" => Ok(Self::ClosestToCenter),
            "closest-to-claim" => Ok(Self::ClosestToClaim),
            other => Err(crate::error::ArclusError::invalid(format!(
                "unsupported cluster representative mode: {other}"
            ))),
        }
    }
}
