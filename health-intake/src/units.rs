//! Parsing of the raw height and weight strings kept in the record.
//!
//! The record stores whatever the user wrote ("5'10\"", "172 cm",
//! "165 lbs"). Conversion to metric happens here, at read time, by the unit
//! found in the string itself; strings without a recognised unit yield `None`.

use std::sync::LazyLock;

use regex::Regex;

static FEET_INCHES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\d+)\s*(?:['’]|feet|foot|ft)\s*(?:(\d{1,2})\s*(?:["”]|''|inches|inch|in)?)?"#)
        .expect("Invalid regex")
});
static CENTIMETRES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:centimet(?:er|re)s?|cm)").expect("Invalid regex")
});
static METRES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:meters?|metres?|m)\b").expect("Invalid regex")
});
static KILOGRAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:kilograms?|kilos?|kgs?)").expect("Invalid regex")
});
static POUNDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:lbs?|pounds?)").expect("Invalid regex")
});

const METRES_PER_FOOT: f64 = 0.3048;
const METRES_PER_INCH: f64 = 0.0254;
const KG_PER_POUND: f64 = 0.453_592_37;

const HEIGHT_RANGE_M: std::ops::RangeInclusive<f64> = 0.5..=2.6;
const WEIGHT_RANGE_KG: std::ops::RangeInclusive<f64> = 20.0..=350.0;

fn number(caps: &regex::Captures<'_>, group: usize) -> Option<f64> {
    caps.get(group)?.as_str().replace(',', ".").parse().ok()
}

/// Height in metres, if `raw` carries a recognised unit and a plausible value.
pub fn height_meters(raw: &str) -> Option<f64> {
    let meters = if let Some(caps) = FEET_INCHES.captures(raw) {
        let feet = number(&caps, 1)?;
        let inches = number(&caps, 2).unwrap_or(0.0);
        feet * METRES_PER_FOOT + inches * METRES_PER_INCH
    } else if let Some(caps) = CENTIMETRES.captures(raw) {
        number(&caps, 1)? / 100.0
    } else {
        number(&METRES.captures(raw)?, 1)?
    };
    HEIGHT_RANGE_M.contains(&meters).then_some(meters)
}

/// Weight in kilograms, if `raw` carries a recognised unit and a plausible value.
pub fn weight_kg(raw: &str) -> Option<f64> {
    let kg = if let Some(caps) = KILOGRAMS.captures(raw) {
        number(&caps, 1)?
    } else {
        number(&POUNDS.captures(raw)?, 1)? * KG_PER_POUND
    };
    WEIGHT_RANGE_KG.contains(&kg).then_some(kg)
}

/// Body-mass index from raw height and weight strings.
pub fn bmi(height: &str, weight: &str) -> Option<f64> {
    let meters = height_meters(height)?;
    let kg = weight_kg(weight)?;
    Some(kg / (meters * meters))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_height_units() {
        assert!(close(height_meters("172 cm").unwrap(), 1.72));
        assert!(close(height_meters("1.80m").unwrap(), 1.80));
        assert!(close(height_meters("1,65 metres").unwrap(), 1.65));
        assert!(close(height_meters("5'10\"").unwrap(), 1.778));
        assert!(close(height_meters("6 ft").unwrap(), 1.8288));
        assert_eq!(height_meters("tall"), None);
        assert_eq!(height_meters("900 cm"), None);
    }

    #[test]
    fn test_weight_units() {
        assert!(close(weight_kg("70 kg").unwrap(), 70.0));
        assert!(close(weight_kg("165 lbs").unwrap(), 74.84));
        assert_eq!(weight_kg("heavy"), None);
    }

    #[test]
    fn test_bmi_mixes_units() {
        let metric = bmi("180 cm", "81 kg").unwrap();
        assert!(close(metric, 25.0));

        let imperial = bmi("5'10\"", "200 lbs").unwrap();
        assert!(imperial > 28.0 && imperial < 29.0);

        assert_eq!(bmi("180", "81 kg"), None);
    }
}
