//! GeoJSON FeatureCollection and GeoJSON text sequence readers.
//!
//! Expects the layout written by `osmium export -a id,type`: OSM type and id
//! in the `@type` / `@id` properties, tags as plain properties.

use anyhow::{bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Map, Value};
use std::io::{BufRead, Read};
use tracing::{debug, info, warn};

use crate::models::{BoundaryFeature, FeatureKind};

const TYPE_KEYS: [&str; 3] = ["@type", "type", "osm_type"];
const ID_KEYS: [&str; 3] = ["@id", "osm_id", "id"];
const ISO_KEYS: [&str; 4] = [
    "ISO3166-1:alpha2",
    "ISO3166-1",
    "iso2",
    "is_in:country_code",
];

/// Read a whole FeatureCollection (a single Feature is accepted too).
pub fn read_collection<R: Read>(reader: R) -> Result<Vec<BoundaryFeature>> {
    let value: Value = serde_json::from_reader(reader).context("Failed to parse GeoJSON")?;

    let features = match value["type"].as_str() {
        Some("FeatureCollection") => value["features"]
            .as_array()
            .context("FeatureCollection without a features array")?
            .iter()
            .map(parse_feature)
            .collect(),
        Some("Feature") => vec![parse_feature(&value)],
        other => bail!("Expected a GeoJSON FeatureCollection, got {:?}", other),
    };

    info!("Read {} features", features.len());
    Ok(features)
}

/// Read one feature per line; blank and unparsable lines are skipped.
pub fn read_sequence<R: BufRead>(reader: R) -> Result<Vec<BoundaryFeature>> {
    let mut features = Vec::new();
    let mut bad_lines = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read feature line")?;
        // RFC 8142 record separator
        let text = line.trim_start_matches('\u{1e}').trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => features.push(parse_feature(&value)),
            Err(e) => {
                bad_lines += 1;
                debug!("Skipping line {}: {}", line_no + 1, e);
            }
        }
    }

    if bad_lines > 0 {
        warn!("Skipped {} unparsable lines", bad_lines);
    }
    info!("Read {} features", features.len());
    Ok(features)
}

/// Convert one GeoJSON feature. Missing parts become `None` so the
/// dissolver can decide what is fatal.
pub fn parse_feature(feature: &Value) -> BoundaryFeature {
    let empty = Map::new();
    let props = feature["properties"].as_object().unwrap_or(&empty);

    let declared = first_present(props, &TYPE_KEYS)
        .and_then(Value::as_str)
        .map(FeatureKind::parse);

    let reference = first_present(props, &ID_KEYS)
        .or_else(|| feature.get("id").filter(|v| !v.is_null()))
        .and_then(parse_osm_ref);

    // `r123` style ids carry the type when no type property exists
    let kind = match (declared, reference) {
        (Some(kind), _) if kind != FeatureKind::Other => kind,
        (_, Some((Some(kind), _))) => kind,
        (declared, _) => declared.unwrap_or(FeatureKind::Other),
    };

    let mut boundary = BoundaryFeature::new(kind);
    boundary.osm_id = reference.map(|(_, id)| id);
    boundary.admin_level = props.get("admin_level").and_then(parse_level);
    boundary.geometry = parse_geometry(&feature["geometry"]);

    for (key, value) in props {
        let Some(text) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        if key == "name" {
            boundary.names.insert("default".to_string(), text.to_string());
        } else if let Some(lang) = key.strip_prefix("name:") {
            boundary.names.insert(lang.to_string(), text.to_string());
        }
    }

    boundary.iso2 = ISO_KEYS
        .iter()
        .filter_map(|key| props.get(*key).and_then(Value::as_str))
        .map(|code| code.trim().to_ascii_uppercase())
        .find(|code| !code.is_empty());

    boundary
}

fn first_present<'a>(props: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| props.get(*key))
        .find(|value| !value.is_null())
}

/// Parse `123`, `"123"`, `"r123"` or `"relation/123"`.
fn parse_osm_ref(value: &Value) -> Option<(Option<FeatureKind>, i64)> {
    if let Some(id) = value.as_i64() {
        return Some((None, id));
    }
    if let Some(id) = value.as_f64().filter(|f| f.fract() == 0.0) {
        return Some((None, id as i64));
    }

    let text = value.as_str()?.trim();
    if let Ok(id) = text.parse::<i64>() {
        return Some((None, id));
    }

    let (prefix, digits) = match text.split_once('/') {
        Some((prefix, digits)) => (prefix, digits),
        None => {
            let split = text.find(|c: char| c.is_ascii_digit() || c == '-')?;
            text.split_at(split)
        }
    };
    let id = digits.parse::<i64>().ok()?;
    let kind = FeatureKind::parse(prefix);
    Some(((kind != FeatureKind::Other).then_some(kind), id))
}

fn parse_level(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|l| u8::try_from(l).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Polygon and MultiPolygon geometries; everything else is `None`.
fn parse_geometry(geometry: &Value) -> Option<MultiPolygon<f64>> {
    let coords = geometry["coordinates"].as_array()?;
    match geometry["type"].as_str()? {
        "Polygon" => parse_polygon(coords).map(|p| MultiPolygon::new(vec![p])),
        "MultiPolygon" => {
            let polygons: Vec<Polygon<f64>> = coords
                .iter()
                .filter_map(|p| p.as_array().and_then(|rings| parse_polygon(rings)))
                .collect();
            Some(MultiPolygon::new(polygons))
        }
        _ => None,
    }
}

/// `[exterior, hole, hole, ...]`
fn parse_polygon(rings: &[Value]) -> Option<Polygon<f64>> {
    let mut parsed = rings
        .iter()
        .filter_map(|ring| ring.as_array().and_then(|points| parse_ring(points)));
    let exterior = parsed.next()?;
    Some(Polygon::new(exterior, parsed.collect()))
}

fn parse_ring(points: &[Value]) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = points
        .iter()
        .filter_map(|point| {
            let pair = point.as_array()?;
            Some(Coord {
                x: pair.first()?.as_f64()?,
                y: pair.get(1)?.as_f64()?,
            })
        })
        .collect();

    if coords.len() < 3 {
        return None;
    }
    if coords.first() != coords.last() {
        coords.push(coords[0]);
    }
    Some(LineString::new(coords))
}
