use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier of one required field, declared in asking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldId {
    #[serde(rename = "age")]
    Age,
    #[serde(rename = "gender")]
    Gender,
    #[serde(rename = "height")]
    Height,
    #[serde(rename = "weight")]
    Weight,
    #[serde(rename = "familyHistory")]
    FamilyHistory,
    #[serde(rename = "smoking.status")]
    SmokingStatus,
    #[serde(rename = "smoking.details")]
    SmokingDetails,
    #[serde(rename = "alcohol.frequency")]
    AlcoholFrequency,
}

impl FieldId {
    /// The fixed required-field sequence.
    pub const REQUIRED: [FieldId; 8] = [
        FieldId::Age,
        FieldId::Gender,
        FieldId::Height,
        FieldId::Weight,
        FieldId::FamilyHistory,
        FieldId::SmokingStatus,
        FieldId::SmokingDetails,
        FieldId::AlcoholFrequency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldId::Age => "age",
            FieldId::Gender => "gender",
            FieldId::Height => "height",
            FieldId::Weight => "weight",
            FieldId::FamilyHistory => "familyHistory",
            FieldId::SmokingStatus => "smoking.status",
            FieldId::SmokingDetails => "smoking.details",
            FieldId::AlcoholFrequency => "alcohol.frequency",
        }
    }

    /// Only `smoking.details` depends on another field's value.
    pub fn is_conditional(&self) -> bool {
        matches!(self, FieldId::SmokingDetails)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => f.write_str("male"),
            Gender::Female => f.write_str("female"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmokingStatus {
    Never,
    Former,
    Current,
}

impl fmt::Display for SmokingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmokingStatus::Never => f.write_str("never"),
            SmokingStatus::Former => f.write_str("former"),
            SmokingStatus::Current => f.write_str("current"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlcoholFrequency {
    Never,
    Daily,
    Weekly,
    Monthly,
    Occasionally,
}

impl fmt::Display for AlcoholFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlcoholFrequency::Never => f.write_str("never"),
            AlcoholFrequency::Daily => f.write_str("daily"),
            AlcoholFrequency::Weekly => f.write_str("weekly"),
            AlcoholFrequency::Monthly => f.write_str("monthly"),
            AlcoholFrequency::Occasionally => f.write_str("occasionally"),
        }
    }
}

/// Family history of cancer: whether any relative was affected, and which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyHistory {
    pub present: bool,
    pub relations: Vec<String>,
}

impl FamilyHistory {
    pub fn none() -> Self {
        Self {
            present: false,
            relations: Vec::new(),
        }
    }

    pub fn with_relations<I, S>(relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            present: true,
            relations: relations.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Smoking {
    pub status: Option<SmokingStatus>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alcohol {
    pub frequency: Option<AlcoholFrequency>,
}

/// A single extracted value, tagged with the field it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Age(u8),
    Gender(Gender),
    /// Raw matched substring, units kept as written.
    Height(String),
    /// Raw matched substring, units kept as written.
    Weight(String),
    FamilyHistory(FamilyHistory),
    SmokingStatus(SmokingStatus),
    SmokingDetails(String),
    AlcoholFrequency(AlcoholFrequency),
}

impl FieldValue {
    pub fn field(&self) -> FieldId {
        match self {
            FieldValue::Age(_) => FieldId::Age,
            FieldValue::Gender(_) => FieldId::Gender,
            FieldValue::Height(_) => FieldId::Height,
            FieldValue::Weight(_) => FieldId::Weight,
            FieldValue::FamilyHistory(_) => FieldId::FamilyHistory,
            FieldValue::SmokingStatus(_) => FieldId::SmokingStatus,
            FieldValue::SmokingDetails(_) => FieldId::SmokingDetails,
            FieldValue::AlcoholFrequency(_) => FieldId::AlcoholFrequency,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Age(age) => write!(f, "{age}"),
            FieldValue::Gender(gender) => write!(f, "{gender}"),
            FieldValue::Height(raw) | FieldValue::Weight(raw) | FieldValue::SmokingDetails(raw) => {
                f.write_str(raw)
            }
            FieldValue::FamilyHistory(history) if history.present => {
                write!(f, "cancer in {}", history.relations.join(", "))
            }
            FieldValue::FamilyHistory(_) => f.write_str("none"),
            FieldValue::SmokingStatus(status) => write!(f, "{status}"),
            FieldValue::AlcoholFrequency(frequency) => write!(f, "{frequency}"),
        }
    }
}

/// Values produced by one extraction pass, at most one per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    values: BTreeMap<FieldId, FieldValue>,
}

impl PartialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value unless its field is already present. First value wins.
    pub fn insert(&mut self, value: FieldValue) -> bool {
        let field = value.field();
        if self.values.contains_key(&field) {
            return false;
        }
        self.values.insert(field, value);
        true
    }

    pub fn get(&self, field: FieldId) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.values.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.values.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.values.values()
    }
}

impl IntoIterator for PartialRecord {
    type Item = FieldValue;
    type IntoIter = std::collections::btree_map::IntoValues<FieldId, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_values()
    }
}

/// The accumulating set of self-reported attributes for one session.
///
/// Fields follow a first-value-wins policy: once set, a field keeps its value
/// and later restatements are ignored. Each field remembers the index of the
/// conversation message that set it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    age: Option<u8>,
    gender: Option<Gender>,
    height: Option<String>,
    weight: Option<String>,
    family_history: Option<FamilyHistory>,
    smoking: Smoking,
    alcohol: Alcohol,
    #[serde(skip)]
    provenance: BTreeMap<FieldId, usize>,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, used to seed records without a source message.
    pub fn with(mut self, value: FieldValue) -> Self {
        self.store(value, None);
        self
    }

    pub fn age(&self) -> Option<u8> {
        self.age
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender
    }

    pub fn height(&self) -> Option<&str> {
        self.height.as_deref()
    }

    pub fn weight(&self) -> Option<&str> {
        self.weight.as_deref()
    }

    pub fn family_history(&self) -> Option<&FamilyHistory> {
        self.family_history.as_ref()
    }

    pub fn smoking(&self) -> &Smoking {
        &self.smoking
    }

    pub fn alcohol(&self) -> &Alcohol {
        &self.alcohol
    }

    pub fn has(&self, field: FieldId) -> bool {
        match field {
            FieldId::Age => self.age.is_some(),
            FieldId::Gender => self.gender.is_some(),
            FieldId::Height => self.height.is_some(),
            FieldId::Weight => self.weight.is_some(),
            FieldId::FamilyHistory => self.family_history.is_some(),
            FieldId::SmokingStatus => self.smoking.status.is_some(),
            FieldId::SmokingDetails => self.smoking.details.is_some(),
            FieldId::AlcoholFrequency => self.alcohol.frequency.is_some(),
        }
    }

    pub fn get(&self, field: FieldId) -> Option<FieldValue> {
        match field {
            FieldId::Age => self.age.map(FieldValue::Age),
            FieldId::Gender => self.gender.map(FieldValue::Gender),
            FieldId::Height => self.height.clone().map(FieldValue::Height),
            FieldId::Weight => self.weight.clone().map(FieldValue::Weight),
            FieldId::FamilyHistory => self.family_history.clone().map(FieldValue::FamilyHistory),
            FieldId::SmokingStatus => self.smoking.status.map(FieldValue::SmokingStatus),
            FieldId::SmokingDetails => self.smoking.details.clone().map(FieldValue::SmokingDetails),
            FieldId::AlcoholFrequency => self.alcohol.frequency.map(FieldValue::AlcoholFrequency),
        }
    }

    /// Index of the conversation message that set `field`, if known.
    pub fn source_of(&self, field: FieldId) -> Option<usize> {
        self.provenance.get(&field).copied()
    }

    /// Number of fields that currently hold a value.
    pub fn answered_count(&self) -> usize {
        FieldId::REQUIRED.iter().filter(|f| self.has(**f)).count()
    }

    /// Sets a field from message `source`. Returns false when the field was
    /// already set; the stored value is left untouched.
    pub fn set(&mut self, value: FieldValue, source: usize) -> bool {
        self.store(value, Some(source))
    }

    /// Applies every value of `partial`, returning the fields that were newly set.
    pub fn apply(&mut self, partial: PartialRecord, source: usize) -> Vec<FieldId> {
        partial
            .into_iter()
            .filter_map(|value| {
                let field = value.field();
                self.set(value, source).then_some(field)
            })
            .collect()
    }

    fn store(&mut self, value: FieldValue, source: Option<usize>) -> bool {
        let field = value.field();
        if self.has(field) {
            debug!(field = %field, "ignoring restated value for a field that is already set");
            return false;
        }
        match value {
            FieldValue::Age(age) => self.age = Some(age),
            FieldValue::Gender(gender) => self.gender = Some(gender),
            FieldValue::Height(raw) => self.height = Some(raw),
            FieldValue::Weight(raw) => self.weight = Some(raw),
            FieldValue::FamilyHistory(history) => self.family_history = Some(history),
            FieldValue::SmokingStatus(status) => self.smoking.status = Some(status),
            FieldValue::SmokingDetails(details) => self.smoking.details = Some(details),
            FieldValue::AlcoholFrequency(frequency) => self.alcohol.frequency = Some(frequency),
        }
        if let Some(source) = source {
            self.provenance.insert(field, source);
        }
        true
    }
}
