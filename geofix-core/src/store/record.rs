//! Textual record codec for the file store
//!
//! One fix per line, fixed fields first, comma-separated:
//!
//! ```text
//! time,lat,lon,alt,acc,sourceKind,status[,[key:value]]...
//! 1717000000000,39.904200,116.407400,,5.0,gnss,valid,[satellites:11]
//! ```
//!
//! Field order is stable. An absent altitude serializes as an empty
//! field. Source kind and status are written as their lowercase names.
//! Extras follow as `,[key:value]` groups in attribute-map order; the
//! parser tolerates unknown extras (they land back in the attribute
//! map) and rejects lines with malformed fixed fields.

use crate::errors::StoreError;
use crate::fix::{Fix, FixStatus, SourceKind};

/// Serialize a fix to one record line (no trailing newline).
pub fn encode(fix: &Fix) -> String {
    let altitude = fix
        .altitude
        .map(|a| format!("{a:.2}"))
        .unwrap_or_default();

    let mut line = format!(
        "{},{:.7},{:.7},{},{:.2},{},{}",
        fix.time,
        fix.latitude,
        fix.longitude,
        altitude,
        fix.accuracy,
        fix.source.name(),
        fix.status.name(),
    );

    for (key, value) in &fix.attributes {
        line.push_str(&format!(",[{key}:{value}]"));
    }

    line
}

/// Parse one record line back into a fix.
pub fn decode(line: &str) -> Result<Fix, StoreError> {
    let mut fields = line.split(',');

    let time = fields
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(StoreError::MalformedRecord { field: "time" })?;
    let latitude = parse_f64(fields.next(), "lat")?;
    let longitude = parse_f64(fields.next(), "lon")?;

    let altitude = match fields.next() {
        Some("") => None,
        Some(raw) => Some(
            raw.parse::<f64>()
                .map_err(|_| StoreError::MalformedRecord { field: "alt" })?,
        ),
        None => return Err(StoreError::MalformedRecord { field: "alt" }),
    };

    let accuracy = parse_f64(fields.next(), "acc")?;
    let source = fields
        .next()
        .and_then(SourceKind::from_name)
        .ok_or(StoreError::MalformedRecord { field: "sourceKind" })?;
    let status = fields
        .next()
        .and_then(FixStatus::from_name)
        .ok_or(StoreError::MalformedRecord { field: "status" })?;

    let mut fix = Fix {
        latitude,
        longitude,
        altitude,
        accuracy,
        speed: None,
        bearing: None,
        time,
        source,
        source_id: String::new(),
        status,
        attributes: Default::default(),
    };

    // Extras: tolerate anything bracketed, skip anything else
    for extra in fields {
        if let Some(kv) = extra.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some((key, value)) = kv.split_once(':') {
                fix.attributes.insert(key.to_string(), value.to_string());
            }
        }
    }

    Ok(fix)
}

fn parse_f64(raw: Option<&str>, field: &'static str) -> Result<f64, StoreError> {
    raw.and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or(StoreError::MalformedRecord { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::FixBuilder;

    fn sample() -> Fix {
        FixBuilder::new(SourceKind::Gnss, 1_717_000_000_000)
            .position(39.9042, 116.4074)
            .accuracy(5.0)
            .altitude(43.5)
            .attribute("satellites", "11")
            .attribute("signal", "-120")
            .build()
    }

    #[test]
    fn round_trip_preserves_fixed_fields_and_extras() {
        let fix = sample();
        let parsed = decode(&encode(&fix)).unwrap();

        assert_eq!(parsed.time, fix.time);
        assert!((parsed.latitude - fix.latitude).abs() < 1e-7);
        assert!((parsed.longitude - fix.longitude).abs() < 1e-7);
        assert_eq!(parsed.altitude, Some(43.5));
        assert_eq!(parsed.accuracy, 5.0);
        assert_eq!(parsed.source, SourceKind::Gnss);
        assert_eq!(parsed.status, FixStatus::Valid);
        assert_eq!(parsed.attribute("satellites"), Some("11"));
        assert_eq!(parsed.attribute("signal"), Some("-120"));
    }

    #[test]
    fn absent_altitude_round_trips_as_none() {
        let fix = FixBuilder::new(SourceKind::Wifi, 1_000)
            .position(39.9, 116.4)
            .accuracy(20.0)
            .build();
        let line = encode(&fix);
        assert!(line.contains(",,"), "empty altitude field expected: {line}");
        assert_eq!(decode(&line).unwrap().altitude, None);
    }

    #[test]
    fn field_order_is_stable() {
        let line = encode(&sample());
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields[0], "1717000000000");
        assert_eq!(fields[5], "gnss");
        assert_eq!(fields[6], "valid");
        assert!(fields[7].starts_with('['));
    }

    #[test]
    fn unknown_extras_tolerated() {
        let line = "1000,39.9042000,116.4074000,,5.00,gnss,valid,[futureField:whatever]";
        let fix = decode(line).unwrap();
        assert_eq!(fix.attribute("futureField"), Some("whatever"));
    }

    #[test]
    fn malformed_fixed_fields_rejected() {
        for line in [
            "",
            "notatime,39.9,116.4,,5.0,gnss,valid",
            "1000,91.x,116.4,,5.0,gnss,valid",
            "1000,39.9,116.4,,5.0,teleporter,valid",
            "1000,39.9,116.4,,5.0,gnss,sorta-ok",
            "1000,39.9,116.4,abc,5.0,gnss,valid",
            "1000,39.9",
        ] {
            assert!(decode(line).is_err(), "should reject: {line}");
        }
    }

    #[test]
    fn anomaly_status_round_trips() {
        let mut fix = sample();
        fix.status = FixStatus::Anomaly;
        assert_eq!(decode(&encode(&fix)).unwrap().status, FixStatus::Anomaly);
    }
}
