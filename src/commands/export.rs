//! `graphrag export-csv`: triples as `subject,predicate,object` rows.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::graphrag::persist::{export_triples_csv, load_triples};

pub fn run(config: &Config, output: &Path) -> Result<usize> {
    let triples = load_triples(&config.paths.graph)?;
    let rows = export_triples_csv(output, &triples)?;
    println!("Exported {} rows -> {}", rows, output.display());
    Ok(rows)
}
