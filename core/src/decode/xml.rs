//! XML profile extraction.
//!
//! Generic XML exports differ per vendor in everything but shape: a list of
//! per-sample elements holding a time, a depth and sometimes a temperature
//! and tank pressure. Fields are found through [`SYNONYMS`], matched
//! case-insensitively against attribute names and descendant tags.
//! UDDF has a fixed vocabulary and SI units and gets its own walker.

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::DecodeError;
use crate::models::RawSample;

/// Logical sample fields the extractor looks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleField {
    Time,
    Depth,
    Temperature,
    Pressure,
}

/// Tag and attribute names per field, highest priority first.
pub const SYNONYMS: &[(SampleField, &[&str])] = &[
    (
        SampleField::Time,
        &[
            "time",
            "elapsed",
            "elapsed_time",
            "elapsedtime",
            "divetime",
            "dive_time",
            "runtime",
            "seconds",
            "t",
        ],
    ),
    (
        SampleField::Depth,
        &["depth", "depth_m", "depthm", "currentdepth", "current_depth", "d"],
    ),
    (
        SampleField::Temperature,
        &[
            "temperature",
            "temp",
            "temperature_c",
            "watertemp",
            "water_temperature",
            "watertemperature",
        ],
    ),
    (
        SampleField::Pressure,
        &[
            "tankpressure",
            "tank_pressure",
            "pressure",
            "pressure_bar",
            "cylinderpressure",
            "cylinder_pressure",
        ],
    ),
];

/// Element names that denote one sample.
pub const SAMPLE_TAGS: &[&str] = &[
    "sample",
    "waypoint",
    "point",
    "record",
    "entry",
    "datapoint",
    "trackpoint",
];

const KELVIN_OFFSET: f64 = 273.15;
const PASCAL_PER_BAR: f64 = 100_000.0;
const METRES_PER_FOOT: f64 = 0.3048;
const BAR_PER_PSI: f64 = 0.068_947_6;

fn synonyms(field: SampleField) -> &'static [&'static str] {
    SYNONYMS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

fn parse_document(data: &[u8]) -> Result<Document<'_>, DecodeError> {
    let text = std::str::from_utf8(data).map_err(|e| DecodeError::MalformedXml(e.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options).map_err(|e| {
        tracing::warn!("XML parse failed: {}", e);
        DecodeError::MalformedXml(e.to_string())
    })
}

fn has_name(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name().eq_ignore_ascii_case(name)
}

fn attribute<'a>(node: &Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name().eq_ignore_ascii_case(name))
        .map(|a| a.value())
}

fn child_text<'a>(node: &Node<'a, '_>, name: &str, deep: bool) -> Option<&'a str> {
    let found = if deep {
        node.descendants().skip(1).find(|n| has_name(n, name))
    } else {
        node.children().find(|n| has_name(n, name))
    };
    found.and_then(|n| n.text()).map(str::trim).filter(|t| !t.is_empty())
}

/// Raw text of `field` on a sample element, first synonym wins.
fn field_text<'a>(node: &Node<'a, '_>, field: SampleField, deep: bool) -> Option<&'a str> {
    synonyms(field)
        .iter()
        .find_map(|name| attribute(node, name).or_else(|| child_text(node, name, deep)))
}

/// Split `"12.5 m"` into `(12.5, "m")`. A decimal comma is accepted.
fn split_quantity(text: &str) -> Option<(f64, String)> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            let sign = i == 0 && (c == '-' || c == '+');
            !(c.is_ascii_digit() || c == '.' || c == ',' || sign)
        })
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let value: f64 = text[..end].replace(',', ".").parse().ok()?;
    let unit = text[end..].trim().trim_start_matches('°').to_ascii_lowercase();
    value.is_finite().then_some((value, unit))
}

/// Seconds from `"95"`, `"95 s"`, `"1.5 min"`, `"01:35"` or `"0:01:35"`.
fn parse_time(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.contains(':') {
        return text.split(':').try_fold(0.0, |acc, part| {
            let part: f64 = part.trim().parse().ok()?;
            Some(acc * 60.0 + part)
        });
    }
    let (value, unit) = split_quantity(text)?;
    match unit.as_str() {
        "" | "s" | "sec" | "secs" | "seconds" => Some(value),
        "min" | "mins" | "minutes" => Some(value * 60.0),
        "h" | "hr" | "hours" => Some(value * 3600.0),
        _ => None,
    }
}

fn parse_depth(text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    match unit.as_str() {
        "" | "m" | "meters" | "metres" => Some(value),
        "ft" | "feet" => Some(value * METRES_PER_FOOT),
        "cm" => Some(value / 100.0),
        _ => None,
    }
}

fn parse_temperature(text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    match unit.as_str() {
        "" | "c" | "celsius" => Some(value),
        "f" | "fahrenheit" => Some((value - 32.0) * 5.0 / 9.0),
        "k" | "kelvin" => Some(value - KELVIN_OFFSET),
        _ => None,
    }
}

fn parse_pressure(text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    match unit.as_str() {
        "" | "bar" => Some(value),
        "mbar" => Some(value / 1000.0),
        "psi" => Some(value * BAR_PER_PSI),
        "pa" => Some(value / PASCAL_PER_BAR),
        "kpa" => Some(value / 100.0),
        _ => None,
    }
}

fn generic_sample(node: &Node, deep: bool) -> Option<RawSample> {
    let elapsed_seconds = field_text(node, SampleField::Time, deep).and_then(parse_time)?;
    let depth_m = field_text(node, SampleField::Depth, deep).and_then(parse_depth)?;
    Some(RawSample {
        elapsed_seconds,
        depth_m: Some(depth_m),
        temperature_c: field_text(node, SampleField::Temperature, deep).and_then(parse_temperature),
        tank_pressure_bar: field_text(node, SampleField::Pressure, deep).and_then(parse_pressure),
    })
}

/// Extract samples from XML of unknown dialect.
pub fn extract_generic(data: &[u8]) -> Result<Vec<RawSample>, DecodeError> {
    let doc = parse_document(data)?;

    let mut candidates: Vec<Node> = doc
        .descendants()
        .filter(|n| SAMPLE_TAGS.iter().any(|tag| has_name(n, tag)))
        .collect();
    let deep = !candidates.is_empty();
    if candidates.is_empty() {
        // no known sample tag: any element carrying both fields directly
        candidates = doc
            .descendants()
            .filter(|n| {
                n.is_element()
                    && field_text(n, SampleField::Time, false).is_some()
                    && field_text(n, SampleField::Depth, false).is_some()
            })
            .collect();
        tracing::debug!(
            "No sample tags found, {} elements carry time and depth",
            candidates.len()
        );
    }

    let total = candidates.len();
    let samples: Vec<RawSample> = candidates
        .iter()
        .filter_map(|n| generic_sample(n, deep))
        .collect();
    if samples.len() < total {
        tracing::debug!(
            "Dropped {} of {} XML samples lacking time or depth",
            total - samples.len(),
            total
        );
    }
    Ok(samples)
}

/// Extract samples from a UDDF document.
///
/// UDDF stores temperature in Kelvin and pressure in Pascal, but exporters
/// are known to write °C and bar into the same tags; values are converted
/// only when they fall in the SI range. Tank pressure falls back to a plain
/// `pressure` child when `tankpressure` is missing.
pub fn extract_uddf(data: &[u8]) -> Result<Vec<RawSample>, DecodeError> {
    let doc = parse_document(data)?;

    let number = |node: &Node, name: &str| -> Option<f64> {
        child_text(node, name, false)?.parse::<f64>().ok().filter(|v| v.is_finite())
    };

    let mut skipped = 0usize;
    let samples: Vec<RawSample> = doc
        .descendants()
        .filter(|n| has_name(n, "waypoint"))
        .filter_map(|wp| {
            let sample = number(&wp, "divetime").zip(number(&wp, "depth")).map(
                |(elapsed_seconds, depth_m)| RawSample {
                    elapsed_seconds,
                    depth_m: Some(depth_m),
                    temperature_c: number(&wp, "temperature").map(|t| {
                        if t > 200.0 {
                            t - KELVIN_OFFSET
                        } else {
                            t
                        }
                    }),
                    tank_pressure_bar: number(&wp, "tankpressure")
                        .or_else(|| number(&wp, "pressure"))
                        .map(|p| {
                        if p > 1000.0 {
                            p / PASCAL_PER_BAR
                        } else {
                            p
                        }
                    }),
                },
            );
            if sample.is_none() {
                skipped += 1;
            }
            sample
        })
        .collect();

    if skipped > 0 {
        tracing::debug!("Skipped {} UDDF waypoints without divetime or depth", skipped);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-6)
    }

    #[test]
    fn test_generic_child_tags() {
        let xml = br#"<?xml version="1.0"?>
<dive>
  <samples>
    <sample><time>0</time><depth>0.0</depth><temp>24</temp></sample>
    <sample><time>30</time><depth>6.5</depth><pressure>198</pressure></sample>
  </samples>
</dive>"#;
        let samples = extract_generic(xml).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(approx(samples[0].temperature_c, 24.0));
        assert!(approx(samples[1].depth_m, 6.5));
        assert!(approx(samples[1].tank_pressure_bar, 198.0));
    }

    #[test]
    fn test_generic_attributes_case_insensitive() {
        let xml = br#"<Log><Point Time="10" DEPTH="3.2" WaterTemp="21.5"/></Log>"#;
        let samples = extract_generic(xml).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].elapsed_seconds, 10.0);
        assert!(approx(samples[0].depth_m, 3.2));
        assert!(approx(samples[0].temperature_c, 21.5));
    }

    #[test]
    fn test_synonym_priority() {
        let xml = br#"<log><entry seconds="99" time="5" d="1.0" depth="2.0"/></log>"#;
        let samples = extract_generic(xml).unwrap();
        assert_eq!(samples[0].elapsed_seconds, 5.0);
        assert!(approx(samples[0].depth_m, 2.0));
    }

    #[test]
    fn test_units_and_clock_times() {
        let xml = br#"<log>
  <sample><time>01:30</time><depth>12.3 m</depth><pressure>200 bar</pressure></sample>
  <sample><time>2 min</time><depth>33 ft</depth><temperature>68 F</temperature></sample>
  <sample><time>0:03:00</time><depth>10,5</depth><pressure>2900 psi</pressure></sample>
</log>"#;
        let samples = extract_generic(xml).unwrap();
        assert_eq!(samples[0].elapsed_seconds, 90.0);
        assert!(approx(samples[0].depth_m, 12.3));
        assert!(approx(samples[0].tank_pressure_bar, 200.0));
        assert_eq!(samples[1].elapsed_seconds, 120.0);
        assert!(approx(samples[1].depth_m, 10.0584));
        assert!(approx(samples[1].temperature_c, 20.0));
        assert_eq!(samples[2].elapsed_seconds, 180.0);
        assert!(approx(samples[2].depth_m, 10.5));
        assert!((samples[2].tank_pressure_bar.unwrap() - 199.948).abs() < 0.01);
    }

    #[test]
    fn test_samples_without_time_or_depth_dropped() {
        let xml = br#"<log>
  <sample><time>0</time></sample>
  <sample><depth>4</depth></sample>
  <sample><time>20</time><depth>deep</depth></sample>
  <sample><time>40</time><depth>5</depth></sample>
</log>"#;
        let samples = extract_generic(xml).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].elapsed_seconds, 40.0);
    }

    #[test]
    fn test_fallback_without_sample_tags() {
        let xml = br#"<profile>
  <row><t>0</t><depth>0</depth></row>
  <row><t>10</t><depth>2</depth></row>
</profile>"#;
        let samples = extract_generic(xml).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(approx(samples[1].depth_m, 2.0));
    }

    #[test]
    fn test_unknown_unit_is_absent() {
        let xml = br#"<log><sample time="0" depth="3" temperature="12 parsecs"/></log>"#;
        let samples = extract_generic(xml).unwrap();
        assert_eq!(samples[0].temperature_c, None);
    }

    #[test]
    fn test_malformed_xml() {
        let err = extract_generic(b"<log><sample></log>").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedXml(_)));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = extract_generic(b"<log>\xff\xfe</log>").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedXml(_)));
    }

    #[test]
    fn test_uddf_si_units() {
        let xml = br#"<?xml version="1.0" encoding="utf-8"?>
<uddf version="3.2.0">
  <profiledata><repetitiongroup><dive><samples>
    <waypoint><divetime>0</divetime><depth>0</depth><temperature>295.15</temperature></waypoint>
    <waypoint><divetime>60</divetime><depth>8.4</depth><tankpressure>19800000</tankpressure></waypoint>
    <waypoint><divetime>120</divetime><depth>12.0</depth><tankpressure>195.5</tankpressure><temperature>19.0</temperature></waypoint>
  </samples></dive></repetitiongroup></profiledata>
</uddf>"#;
        let samples = extract_uddf(xml).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(approx(samples[0].temperature_c, 22.0));
        assert!(approx(samples[1].tank_pressure_bar, 198.0));
        assert!(approx(samples[2].tank_pressure_bar, 195.5));
        assert!(approx(samples[2].temperature_c, 19.0));
    }

    #[test]
    fn test_uddf_waypoint_without_depth_skipped() {
        let xml = br#"<uddf>
  <waypoint><divetime>0</divetime></waypoint>
  <waypoint><divetime>10</divetime><depth>1.5</depth></waypoint>
</uddf>"#;
        let samples = extract_uddf(xml).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].elapsed_seconds, 10.0);
    }

    #[test]
    fn test_uddf_plain_pressure_tag() {
        let xml = br#"<uddf>
  <waypoint><divetime>0</divetime><depth>0</depth><pressure>20000000</pressure></waypoint>
  <waypoint><divetime>60</divetime><depth>9</depth><pressure>190</pressure><tankpressure>185</tankpressure></waypoint>
</uddf>"#;
        let samples = extract_uddf(xml).unwrap();
        assert!(
            approx(samples[0].tank_pressure_bar, 200.0),
            "<pressure> must stand in for a missing <tankpressure>"
        );
        assert!(
            approx(samples[1].tank_pressure_bar, 185.0),
            "<tankpressure> wins when both are present"
        );
    }

    #[test]
    fn test_uddf_namespaced() {
        let xml = br#"<uddf xmlns="http://www.streit.cc/uddf/3.2/">
  <waypoint><divetime>5</divetime><depth>1</depth></waypoint>
</uddf>"#;
        assert_eq!(extract_uddf(xml).unwrap().len(), 1);
    }
}
