//! Keyword and pattern heuristics, one per field.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{ExtractionContext, FieldExtractor};
use crate::record::{AlcoholFrequency, FamilyHistory, FieldId, FieldValue, Gender, SmokingStatus};

pub const MIN_AGE: u8 = 1;
pub const MAX_AGE: u8 = 120;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("Invalid regex")
}

// Group 1 is a preposition that makes the age a past milestone ("at age 16").
static AGE_YEARS_OLD: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)(?:\b(at|since|from|until|by)\s+)?\b(\d+)\s*-?\s*(?:years?|yrs?)\s*-?\s*old\b")
});
static AGE_YO: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)(?:\b(at|since|from|until|by)\s+)?\b(\d+)\s*(?:y/o|yo)\b")
});
static AGE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)(?:\b(at|since|from|until|by)\s+)?\bage[d]?\s*(?:is|:|=|of)?\s*(\d+)\b")
});
static AGE_SELF: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r#"(?i)\bi(?:['’]?m|\s+am)\s+(?:now\s+|currently\s+|just\s+)?(\d+)\b(\s*(?:(?:kilograms?|kilos?|kgs?|lbs?|pounds?|centimet(?:er|re)s?|cm|meters?|metres?|m|feet|foot|ft|inch(?:es)?|in)\b|['’"]))?"#,
    )
});
static BARE_NUMBER: LazyLock<Regex> = LazyLock::new(|| regex(r"^\s*(\d+)\s*[.!]*\s*$"));

static GENDER: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)\b(female|woman|girl|lady|gal|male|man|boy|guy|gentleman|gent)\b")
});
static GENDER_LETTER: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)^\s*([mf])\s*[.!]*\s*$"));

static HEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r#"(?i)\b\d\s*(?:['’]|feet|foot|ft)\s*(?:\d{1,2}\s*(?:["”]|''|inches|inch|in\b)?)?|\b\d{2,3}(?:\.\d+)?\s*(?:centimet(?:er|re)s?|cm)\b|\b[12](?:[.,]\d{1,2})?\s*(?:meters?|metres?|m)\b"#,
    )
});
static WEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)\b\d{2,3}(?:\.\d+)?\s*(?:kilograms?|kilos?|kgs?|lbs?|pounds?)\b")
});

static FAMILY_NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:no|not\s+any|without)\s+(?:known\s+)?family\s+history\b|\b(?:no\s*one|nobody|none)\s+(?:in|of)\s+my\s+(?:family|relatives)\b|\bno\s+cancer\s+in\s+(?:my|the)\s+family\b|\b(?:doesn['’]?t|does\s+not)\s+run\s+in\s+(?:my|the)\s+family\b",
    )
});
static RELATION: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(grandmothers?|grandfathers?|grandparents?|grandmas?|grandpas?|mothers?|mom|mum|fathers?|dad|brothers?|sisters?|siblings?|parents?|aunts?|uncles?|cousins?|sons?|daughters?)\b",
    )
});
static CANCER: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)\bcancers?\b"));

static SMOKE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:smok\w*|cigarettes?|cigs?|cigars?|tobacco|vap(?:e|es|ed|ing)|e-?cig\w*|nicotine)\b",
    )
});
static SMOKE_NEVER: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:never|don['’]?t|do\s+not|doesn['’]?t|does\s+not|not)\b(?:[\s'’-]+\w+){0,2}?[\s'’-]*(?:smok|cigar|cig\b|tobacco|vap)|\bnon-?\s?smoker\b|\bno\s+(?:smoking|tobacco|cigarettes)\b",
    )
});
static SMOKE_FORMER: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:quit|quitted|stopped|gave\s+up|given\s+up|former|ex-?\s?smoker|used\s+to|no\s+longer|anymore|any\s+more)\b",
    )
});
static SMOKE_LAPSED: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)\b(?:anymore|any\s+more|no\s+longer)\b"));
static SMOKE_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:\d+|a|an|one|two|three|half\s+a|a\s+few|a\s+couple(?:\s+of)?)\s+(?:packs?|cigarettes?|cigs?|cigars?|pipes?|joints?)\s*(?:a|per|each|every)\s+(?:day|week|month)\b",
    )
});
static SMOKE_FREQUENCY: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:daily|every\s+day|socially|occasionally|on\s+weekends|at\s+parties|chain[-\s]?smok\w*)\b",
    )
});
static SMOKE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)\b(?:cigarettes|cigars?|pipe|vap(?:e|ing)|e-?cig(?:arette)?s?|hookah|roll-?ups?)\b")
});
static SMOKE_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\bfor\s+(?:about\s+|around\s+|over\s+)?(?:\d+|a\s+few|many|several)\s+(?:years?|months?)\b",
    )
});

static DRINK_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:drink\w*|drank|alcohol\w*|beers?|wine|liquor|spirits|booze|cocktails?|whiske?y|vodka|sober|teetotal\w*)\b",
    )
});
static ALCOHOL_NEVER: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:never|don['’]?t|do\s+not|doesn['’]?t|does\s+not|not)\b(?:[\s'’-]+\w+){0,2}?[\s'’-]*(?:drink|alcohol|booze)|\bno\s+alcohol\b|\bnon-?\s?drinker\b|\bteetotal\w*|\bsober\b|\babstain\w*",
    )
});
static ALCOHOL_DAILY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)\b(?:daily|nightly|every\s+(?:day|night|evening)|each\s+(?:day|night)|(?:a|per)\s+(?:day|night))\b")
});
static ALCOHOL_WEEKLY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)\b(?:weekly|weekends?|(?:a|per|each|every)\s+week)\b")
});
static ALCOHOL_MONTHLY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)\b(?:monthly|(?:a|per|each|every)\s+month)\b")
});
static ALCOHOL_OCCASIONALLY: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:occasionally|occasional|socially|sometimes|rarely|seldom|special\s+occasions?|now\s+and\s+then|once\s+in\s+a\s+while)\b",
    )
});

static BARE_NO: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)^\s*(?:no|nope|nah|none|never|no\s*one|nobody|not\s+really|not\s+at\s+all|not\s+that\s+i\s+know(?:\s+of)?)\s*[.!]*\s*$",
    )
});
static BARE_YES: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)^\s*(?:yes|yeah|yep|yup|i\s+do|sure|correct)\s*[.!]*\s*$"));
static CLAUSE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)[.;!?,]|\b(?:and|but|though|although|while)\b"));

/// Clauses of `message` that are not about `other` unless they are also
/// about `topic`, rejoined. Keeps "a pack a day" out of alcohol parsing.
fn clauses_about(message: &str, topic: &Regex, other: &Regex) -> String {
    CLAUSE_BREAK
        .split(message)
        .filter(|clause| topic.is_match(clause) || !other.is_match(clause))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// A free-text answer with every clause that belongs to another field
/// removed, or `None` if nothing is left.
fn free_text_reply(message: &str) -> Option<String> {
    let other_fields: [&Regex; 7] = [
        &*DRINK_MENTION,
        &*AGE_YEARS_OLD,
        &*AGE_SELF,
        &*GENDER,
        &*HEIGHT,
        &*WEIGHT,
        &*CANCER,
    ];
    let clauses: Vec<&str> = CLAUSE_BREAK
        .split(message)
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .collect();
    let kept: Vec<&str> = clauses
        .iter()
        .copied()
        .filter(|clause| !other_fields.iter().any(|pattern| pattern.is_match(clause)))
        .collect();

    if kept.is_empty() {
        None
    } else if kept.len() == clauses.len() {
        Some(message.trim().to_string())
    } else {
        Some(kept.join(", "))
    }
}

fn plausible_age(raw: &str) -> Option<u8> {
    let age = raw.parse::<u32>().ok()?;
    if (u32::from(MIN_AGE)..=u32::from(MAX_AGE)).contains(&age) {
        u8::try_from(age).ok()
    } else {
        debug!(age, "discarding implausible age");
        None
    }
}

fn canonical_relation(word: &str) -> &'static str {
    let lowered = word.to_lowercase();
    let singular = lowered.strip_suffix('s').unwrap_or(&lowered);
    match singular {
        "mother" | "mom" | "mum" => "mother",
        "father" | "dad" => "father",
        "grandmother" | "grandma" => "grandmother",
        "grandfather" | "grandpa" => "grandfather",
        "grandparent" => "grandparent",
        "brother" => "brother",
        "sister" => "sister",
        "sibling" => "sibling",
        "parent" => "parent",
        "aunt" => "aunt",
        "uncle" => "uncle",
        "cousin" => "cousin",
        "son" => "son",
        "daughter" => "daughter",
        _ => "relative",
    }
}

pub struct AgeHeuristic;

impl FieldExtractor for AgeHeuristic {
    fn field(&self) -> FieldId {
        FieldId::Age
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        let message = cx.message();
        let mut candidates = Vec::new();

        for pattern in [&*AGE_YEARS_OLD, &*AGE_YO, &*AGE_LABEL] {
            candidates.extend(
                pattern
                    .captures_iter(message)
                    .filter(|c| c.get(1).is_none())
                    .filter_map(|c| c.get(2)),
            );
        }
        // "I'm 70 kg" is a weight, not an age.
        candidates.extend(
            AGE_SELF
                .captures_iter(message)
                .filter(|c| c.get(2).is_none())
                .filter_map(|c| c.get(1)),
        );
        if cx.is_topic(FieldId::Age) {
            candidates.extend(BARE_NUMBER.captures(message).and_then(|c| c.get(1)));
        }

        candidates
            .into_iter()
            .find_map(|m| plausible_age(m.as_str()))
            .map(FieldValue::Age)
    }
}

pub struct GenderHeuristic;

impl FieldExtractor for GenderHeuristic {
    fn field(&self) -> FieldId {
        FieldId::Gender
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        let keyword = GENDER
            .captures(cx.message())
            .or_else(|| {
                cx.is_topic(FieldId::Gender)
                    .then(|| GENDER_LETTER.captures(cx.message()))
                    .flatten()
            })?
            .get(1)?
            .as_str()
            .to_lowercase();

        let gender = match keyword.as_str() {
            "female" | "woman" | "girl" | "lady" | "gal" | "f" => Gender::Female,
            _ => Gender::Male,
        };
        Some(FieldValue::Gender(gender))
    }
}

pub struct HeightHeuristic;

impl FieldExtractor for HeightHeuristic {
    fn field(&self) -> FieldId {
        FieldId::Height
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        HEIGHT
            .find(cx.message())
            .map(|m| FieldValue::Height(m.as_str().trim().to_string()))
    }
}

pub struct WeightHeuristic;

impl FieldExtractor for WeightHeuristic {
    fn field(&self) -> FieldId {
        FieldId::Weight
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        WEIGHT
            .find(cx.message())
            .map(|m| FieldValue::Weight(m.as_str().trim().to_string()))
    }
}

pub struct FamilyHistoryHeuristic;

impl FieldExtractor for FamilyHistoryHeuristic {
    fn field(&self) -> FieldId {
        FieldId::FamilyHistory
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        let message = cx.message();

        if FAMILY_NEGATIVE.is_match(message)
            || (cx.is_topic(FieldId::FamilyHistory) && BARE_NO.is_match(message))
        {
            return Some(FieldValue::FamilyHistory(FamilyHistory::none()));
        }

        if !CANCER.is_match(message) {
            return None;
        }

        let mut relations: Vec<&'static str> = Vec::new();
        for m in RELATION.find_iter(message) {
            let relation = canonical_relation(m.as_str());
            if !relations.contains(&relation) {
                relations.push(relation);
            }
        }

        (!relations.is_empty())
            .then(|| FieldValue::FamilyHistory(FamilyHistory::with_relations(relations)))
    }
}

pub struct SmokingStatusHeuristic;

impl FieldExtractor for SmokingStatusHeuristic {
    fn field(&self) -> FieldId {
        FieldId::SmokingStatus
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        let message = cx.message();
        let on_topic = cx.is_topic(FieldId::SmokingStatus);

        if on_topic && BARE_NO.is_match(message) {
            return Some(FieldValue::SmokingStatus(SmokingStatus::Never));
        }
        if on_topic && BARE_YES.is_match(message) {
            return Some(FieldValue::SmokingStatus(SmokingStatus::Current));
        }

        let text = clauses_about(message, &SMOKE_MENTION, &DRINK_MENTION);
        let mentioned = SMOKE_MENTION.is_match(&text);
        if !mentioned && !on_topic {
            return None;
        }

        // Negation wins first, unless it is a lapse ("don't smoke anymore").
        let status = if SMOKE_NEVER.is_match(&text) {
            if SMOKE_LAPSED.is_match(&text) {
                SmokingStatus::Former
            } else {
                SmokingStatus::Never
            }
        } else if SMOKE_FORMER.is_match(&text) {
            SmokingStatus::Former
        } else if mentioned {
            SmokingStatus::Current
        } else {
            return None;
        };

        Some(FieldValue::SmokingStatus(status))
    }
}

pub struct SmokingDetailsHeuristic;

impl FieldExtractor for SmokingDetailsHeuristic {
    fn field(&self) -> FieldId {
        FieldId::SmokingDetails
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        if cx.smoking_status() != Some(SmokingStatus::Current) {
            return None;
        }
        let message = cx.message();
        let on_topic = cx.is_topic(FieldId::SmokingDetails);

        let text = clauses_about(message, &SMOKE_MENTION, &DRINK_MENTION);
        if SMOKE_MENTION.is_match(&text) || on_topic {
            let mut fragments: Vec<String> = Vec::new();
            for pattern in [&*SMOKE_QUANTITY, &*SMOKE_FREQUENCY, &*SMOKE_TYPE, &*SMOKE_DURATION] {
                for m in pattern.find_iter(&text) {
                    let fragment = m.as_str().trim().to_lowercase();
                    if !fragments.iter().any(|f| f.contains(&fragment)) {
                        fragments.push(fragment);
                    }
                }
            }
            if !fragments.is_empty() {
                return Some(FieldValue::SmokingDetails(fragments.join(", ")));
            }
        }

        if !on_topic || BARE_YES.is_match(message) || BARE_NO.is_match(message) {
            return None;
        }
        free_text_reply(message).map(FieldValue::SmokingDetails)
    }
}

pub struct AlcoholHeuristic;

impl FieldExtractor for AlcoholHeuristic {
    fn field(&self) -> FieldId {
        FieldId::AlcoholFrequency
    }

    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue> {
        let message = cx.message();
        let on_topic = cx.is_topic(FieldId::AlcoholFrequency);

        if on_topic && BARE_NO.is_match(message) {
            return Some(FieldValue::AlcoholFrequency(AlcoholFrequency::Never));
        }

        let text = clauses_about(message, &DRINK_MENTION, &SMOKE_MENTION);
        if !on_topic && !DRINK_MENTION.is_match(&text) {
            return None;
        }

        // Fixed priority: the first bucket in this order wins.
        let buckets = [
            (&*ALCOHOL_NEVER, AlcoholFrequency::Never),
            (&*ALCOHOL_DAILY, AlcoholFrequency::Daily),
            (&*ALCOHOL_WEEKLY, AlcoholFrequency::Weekly),
            (&*ALCOHOL_MONTHLY, AlcoholFrequency::Monthly),
            (&*ALCOHOL_OCCASIONALLY, AlcoholFrequency::Occasionally),
        ];
        buckets
            .into_iter()
            .find(|(pattern, _)| pattern.is_match(&text))
            .map(|(_, frequency)| FieldValue::AlcoholFrequency(frequency))
    }
}
