//! Build artifacts on disk.
//!
//! Every artifact is written to a sibling temp file and renamed into place, so
//! a failed write never leaves a half-written index behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use super::partition::CommunityIndex;
use super::triple::{triples_from_value, Triple};
use super::vectors::{str_to_vec, vec_to_str};
use crate::{Error, Result};

/// Column headers of the entity-embedding table.
pub const ENTITY_TABLE_HEADER: [&str; 2] = ["entity_name", "text_emb"];
const TRIPLES_CSV_HEADER: [&str; 3] = ["subject", "predicate", "object"];

fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_artifact(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::MissingIndex(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

pub fn save_triples(path: &Path, triples: &[Triple]) -> Result<()> {
    let json = serde_json::to_vec_pretty(triples)?;
    replace_file(path, &json)?;
    info!("Saved {} triples to {}", triples.len(), path.display());
    Ok(())
}

/// Load a triple array, dropping elements that fail validation.
pub fn load_triples(path: &Path) -> Result<Vec<Triple>> {
    let value: Value = serde_json::from_str(&read_artifact(path)?)?;
    if !value.is_array() {
        return Err(Error::InvalidArgument(format!(
            "{} does not contain a JSON array",
            path.display()
        )));
    }
    let (triples, invalid) = triples_from_value(&value);
    if invalid > 0 {
        warn!(
            "Dropped {} invalid triples while loading {}",
            invalid,
            path.display()
        );
    }
    Ok(triples)
}

/// Add a batch to the raw corpus at `path`, creating it when absent.
///
/// Exact repeats of stored triples are skipped. Returns the corpus size.
pub fn append_triples(path: &Path, batch: &[Triple]) -> Result<usize> {
    let mut corpus = if path.exists() {
        load_triples(path)?
    } else {
        Vec::new()
    };
    let before = corpus.len();
    for triple in batch {
        if !corpus.contains(triple) {
            corpus.push(triple.clone());
        }
    }
    save_triples(path, &corpus)?;
    info!(
        "Appended {} of {} triples to {}",
        corpus.len() - before,
        batch.len(),
        path.display()
    );
    Ok(corpus.len())
}

/// Write `subject,predicate,object` rows; rows with a blank field are skipped.
pub fn export_triples_csv(path: &Path, triples: &[Triple]) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TRIPLES_CSV_HEADER)?;

    let mut written = 0;
    for t in triples {
        let fields = [t.subject.trim(), t.predicate.trim(), t.object.trim()];
        if fields.iter().any(|f| f.is_empty()) {
            continue;
        }
        writer.write_record(fields)?;
        written += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::SerializationError(e.to_string()))?;
    replace_file(path, &bytes)?;
    info!("Exported {} triples to {}", written, path.display());
    Ok(written)
}

pub fn save_community_index(path: &Path, index: &CommunityIndex) -> Result<()> {
    let json = serde_json::to_vec_pretty(index)?;
    replace_file(path, &json)
}

pub fn load_community_index(path: &Path) -> Result<CommunityIndex> {
    Ok(serde_json::from_str(&read_artifact(path)?)?)
}

pub fn save_entity_table(path: &Path, table: &BTreeMap<String, Vec<f32>>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ENTITY_TABLE_HEADER)?;
    for (name, vec) in table {
        writer.write_record([name.as_str(), vec_to_str(vec).as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::SerializationError(e.to_string()))?;
    replace_file(path, &bytes)
}

/// Load `entity_name,text_emb` rows; rows with an unparsable vector are skipped.
pub fn load_entity_table(path: &Path) -> Result<BTreeMap<String, Vec<f32>>> {
    let content = read_artifact(path)?;
    let mut reader = csv::Reader::from_reader(content.as_bytes());

    let mut table = BTreeMap::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = record?;
        let name = record.get(0).map(str::trim).unwrap_or_default();
        let vector = record.get(1).and_then(str_to_vec);
        match vector {
            Some(vec) if !name.is_empty() && !vec.is_empty() => {
                table.insert(name.to_string(), vec);
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(
            "Skipped {} malformed rows in {}",
            skipped,
            path.display()
        );
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphrag::partition::CommunityInfo;

    #[test]
    fn triples_json_drops_invalid_elements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kg.json");
        fs::write(
            &path,
            r#"[{"subject":"A","predicate":"p","object":"B","inferred":true},{"subject":"A"}]"#,
        )
        .unwrap();

        let triples = load_triples(&path).unwrap();
        assert_eq!(triples, vec![Triple::inferred("A", "p", "B")]);
    }

    #[test]
    fn saved_triples_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kg.json");
        let triples = vec![
            Triple::new("A", "p", "B").with_source("qa:0"),
            Triple::inferred("A", "indirectly p", "C"),
        ];
        save_triples(&path, &triples).unwrap();
        assert_eq!(load_triples(&path).unwrap(), triples);
        assert!(!dir.path().join("nested").join("kg.json.tmp").exists());
    }

    #[test]
    fn append_extends_existing_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw").join("kg.json");

        let first = vec![Triple::new("A", "knows", "B")];
        assert_eq!(append_triples(&path, &first).unwrap(), 1);

        let second = vec![Triple::new("B", "knows", "C"), Triple::new("A", "knows", "B")];
        assert_eq!(append_triples(&path, &second).unwrap(), 2);

        assert_eq!(
            load_triples(&path).unwrap(),
            vec![Triple::new("A", "knows", "B"), Triple::new("B", "knows", "C")]
        );
    }

    #[test]
    fn missing_artifact_is_reported() {
        let err = load_community_index(Path::new("/nonexistent/community_info.json")).unwrap_err();
        assert!(matches!(err, Error::MissingIndex(_)));
    }

    #[test]
    fn csv_export_skips_blank_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kg.csv");
        let triples = vec![
            Triple::new("Paris", "capital of", "France"),
            Triple::new("  ", "p", "x"),
            Triple::new("Bank, Ltd", "in", "London"),
        ];
        assert_eq!(export_triples_csv(&path, &triples).unwrap(), 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "subject,predicate,object");
        assert_eq!(lines[1], "Paris,capital of,France");
        assert_eq!(lines[2], "\"Bank, Ltd\",in,London");
    }

    #[test]
    fn entity_table_uses_fixed_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entity.csv");
        let mut table = BTreeMap::new();
        table.insert("Paris".to_string(), vec![0.6, 0.8]);
        save_entity_table(&path, &table).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("entity_name,text_emb\n"));
        assert!(content.contains("Paris,\"0.60000002,0.80000001\""));

        fs::write(&path, format!("{}Broken,\"x,1\"\n", content)).unwrap();
        let loaded = load_entity_table(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!((loaded["Paris"][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn community_index_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("community_info.json");
        let mut index = CommunityIndex::default();
        index.communities.insert(
            0,
            CommunityInfo {
                summary: "Transit".to_string(),
                embedding: vec![1.0, 0.0],
                nodes: vec!["Line 3".to_string()],
            },
        );
        index.isolated_nodes.push("Lonely".to_string());

        save_community_index(&path, &index).unwrap();
        assert_eq!(load_community_index(&path).unwrap(), index);
    }
}
