//! Boundary feature input.
//!
//! The reader is picked from the file name: `.geojson`/`.json`,
//! `.geojsonseq`/`.ndjson`/`.jsonl` (each optionally gzipped) or `.pbf`.

pub mod geojson;
pub mod pbf;
mod rings;

pub use rings::assemble_rings;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

use crate::models::BoundaryFeature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Collection,
    Sequence,
    Pbf,
}

/// Input format and gzip flag from the file name
pub fn detect_format(path: &Path) -> Result<(InputFormat, bool)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase())
        .with_context(|| format!("Invalid input path {}", path.display()))?;

    let (stem, gzipped) = match name.strip_suffix(".gz") {
        Some(stem) => (stem, true),
        None => (name.as_str(), false),
    };

    let format = match stem.rsplit_once('.').map(|(_, ext)| ext) {
        Some("geojson") | Some("json") => InputFormat::Collection,
        Some("geojsonseq") | Some("ndjson") | Some("jsonl") => InputFormat::Sequence,
        Some("pbf") => InputFormat::Pbf,
        _ => bail!("Unsupported input format: {}", path.display()),
    };

    if format == InputFormat::Pbf && gzipped {
        bail!("PBF input cannot be gzipped: {}", path.display());
    }
    Ok((format, gzipped))
}

/// Load all boundary features of a file.
pub fn load_features(path: &Path) -> Result<Vec<BoundaryFeature>> {
    let (format, gzipped) = detect_format(path)?;
    info!("Loading {:?} input from {}", format, path.display());

    if format == InputFormat::Pbf {
        return pbf::read_boundaries(path);
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let reader = BufReader::new(reader);

    match format {
        InputFormat::Sequence => geojson::read_sequence(reader),
        _ => geojson::read_collection(reader),
    }
    .with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureKind;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    const LINE: &str = r#"{"type":"Feature","properties":{"@type":"relation","@id":7,"admin_level":"8"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}"#;

    #[test]
    fn test_detect_format() {
        let cases = [
            ("a.geojson", InputFormat::Collection, false),
            ("a.JSON", InputFormat::Collection, false),
            ("a.geojsonseq.gz", InputFormat::Sequence, true),
            ("fi.ndjson", InputFormat::Sequence, false),
            ("finland-latest.osm.pbf", InputFormat::Pbf, false),
        ];
        for (name, format, gzipped) in cases {
            assert_eq!(
                detect_format(Path::new(name)).expect(name),
                (format, gzipped)
            );
        }
        assert!(detect_format(Path::new("a.csv")).is_err());
        assert!(detect_format(Path::new("a.osm.pbf.gz")).is_err());
    }

    #[test]
    fn test_load_gzipped_sequence() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("admins.ndjson.gz");

        let mut encoder = GzEncoder::new(File::create(&path).expect("create"), Compression::default());
        writeln!(encoder, "{}", LINE).expect("write");
        writeln!(encoder, "{}", LINE.replace("\"@id\":7", "\"@id\":8")).expect("write");
        encoder.finish().expect("finish");

        let features = load_features(&path).expect("load");
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].kind, FeatureKind::Relation);
        assert_eq!(features[1].osm_id, Some(8));
    }

    #[test]
    fn test_load_collection() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("admins.geojson");
        let text = format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, LINE);
        std::fs::write(&path, text).expect("write");

        let features = load_features(&path).expect("load");
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].admin_level, Some(8));
    }
}
