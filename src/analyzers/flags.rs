use std::collections::BTreeSet;
use std::fmt;
use serde::{Deserialize, Serialize};

/// Evidence attached to a record. Serialized names are the report symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Flag {
    OutlierFuerte,
    OutlierSuave,
    MuyCorto,
    DuracionCorta,
    AudioDominante,
    AudioRevisar,
    Vfr,
    Hdr,
    BitrateContainerFaltante,
    EstimacionBitrate,
    BucketPequeno,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::OutlierFuerte => "OUTLIER_FUERTE",
            Flag::OutlierSuave => "OUTLIER_SUAVE",
            Flag::MuyCorto => "MUY_CORTO",
            Flag::DuracionCorta => "DURACION_CORTA",
            Flag::AudioDominante => "AUDIO_DOMINANTE",
            Flag::AudioRevisar => "AUDIO_REVISAR",
            Flag::Vfr => "VFR",
            Flag::Hdr => "HDR",
            Flag::BitrateContainerFaltante => "BITRATE_CONTAINER_FALTANTE",
            Flag::EstimacionBitrate => "ESTIMACION_BITRATE",
            Flag::BucketPequeno => "BUCKET_PEQUENO",
        }
    }

    pub fn is_outlier(&self) -> bool {
        matches!(self, Flag::OutlierFuerte | Flag::OutlierSuave)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unordered, duplicate-free set of flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeSet<Flag>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: Flag) {
        self.0.insert(flag);
    }

    pub fn insert_if(&mut self, condition: bool, flag: Flag) {
        if condition {
            self.insert(flag);
        }
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0.contains(&flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_outlier(&self) -> bool {
        self.iter().any(|f| f.is_outlier())
    }

    pub fn union(&self, other: &FlagSet) -> FlagSet {
        self.0.union(&other.0).copied().collect()
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(|flag| flag.as_str()).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Final flag set of a record: per-file evidence plus per-bucket evidence.
/// Purely additive, nothing is ever removed.
pub fn aggregate(file_flags: &FlagSet, bucket_flags: &FlagSet) -> FlagSet {
    file_flags.union(bucket_flags)
}
