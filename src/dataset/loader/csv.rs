//! CSV edge-list reader.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use super::EdgeListConfig;
use crate::core::error::{GcnError, Result};
use crate::core::types::{Scalar, VertexId};
use crate::partition::Edge;

/// Parse `src,dst[,weight]` rows from `path`.
pub fn read_edges(path: &Path, config: &EdgeListConfig) -> Result<Vec<Edge>> {
    let file = File::open(path).map_err(|e| {
        GcnError::dataset(format!("Failed to open edge list {}: {}", path.display(), e))
    })?;

    let reader = ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .has_headers(config.has_header)
        .comment(config.comment_char.map(|c| c as u8))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut edges = Vec::new();
    for (line_num, result) in reader.into_records().enumerate() {
        let record = result?;
        let line = line_num + 1 + usize::from(config.has_header);
        edges.push(parse_record(&record, line)?);
    }

    if edges.is_empty() {
        return Err(GcnError::dataset(format!(
            "edge list {} contains no edges",
            path.display()
        )));
    }

    log::info!("Read {} edges from {}", edges.len(), path.display());
    Ok(edges)
}

fn parse_record(record: &StringRecord, line: usize) -> Result<Edge> {
    if record.len() < 2 || record.len() > 3 {
        return Err(GcnError::dataset(format!(
            "line {}: expected src,dst[,weight], got {} fields",
            line,
            record.len()
        )));
    }

    let vertex = |k: usize| -> Result<VertexId> {
        record[k].parse::<VertexId>().map_err(|e| {
            GcnError::dataset(format!("line {}: bad vertex id '{}': {}", line, &record[k], e))
        })
    };
    let weight = match record.get(2) {
        Some(field) => field.parse::<Scalar>().map_err(|e| {
            GcnError::dataset(format!("line {}: bad weight '{}': {}", line, field, e))
        })?,
        None => 1.0,
    };

    Ok(Edge::weighted(vertex(0)?, vertex(1)?, weight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_weighted_and_unweighted_rows() {
        let file = write("# comment\n0,1\n1, 2, 0.5\n2,0\n");
        let edges = read_edges(file.path(), &EdgeListConfig::default()).unwrap();
        assert_eq!(
            edges,
            vec![Edge::new(0, 1), Edge::weighted(1, 2, 0.5), Edge::new(2, 0)]
        );
    }

    #[test]
    fn test_header_is_skipped_when_configured() {
        let file = write("src,dst\n3,4\n");
        let config = EdgeListConfig {
            has_header: true,
            ..EdgeListConfig::default()
        };
        assert_eq!(read_edges(file.path(), &config).unwrap(), vec![Edge::new(3, 4)]);
        assert!(read_edges(file.path(), &EdgeListConfig::default()).is_err());
    }

    #[test]
    fn test_malformed_rows_report_line() {
        let file = write("0,1\n1,x\n");
        let err = read_edges(file.path(), &EdgeListConfig::default()).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let empty = write("# nothing\n");
        assert!(read_edges(empty.path(), &EdgeListConfig::default()).is_err());
    }
}
