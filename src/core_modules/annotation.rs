// THEORY:
// The `annotation` module is the entry layer of the pipeline. It turns a directory
// tree of ground-truth CSV files into an ordered list of `Annotation`s, each naming
// one image file, the rectangle that holds the sign, and the sign's class id.
//
// The CSVs follow the German traffic-sign benchmark layout: `;`-separated, a header
// row, and one row per image:
//
//   Filename;Width;Height;Roi.X1;Roi.Y1;Roi.X2;Roi.Y2;ClassId
//
// Image paths in a CSV are relative to the directory holding that CSV. Discovery is
// sorted so that two runs over the same tree always produce the same sample order.

use crate::error::{PrepError, PrepResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Rectangle around the sign, in source-image pixels. `x2` and `y2` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    /// Image width as recorded in the annotation row.
    pub image_width: u32,
    /// Image height as recorded in the annotation row.
    pub image_height: u32,
}

impl Roi {
    /// Clamps the rectangle to a decoded image of `width` x `height` and returns
    /// `(x, y, w, h)`, or `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.min(width);
        let y1 = self.y1.min(height);
        let x2 = self.x2.min(width);
        let y2 = self.y2.min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// One labelled sign: the image holding it, where it is, and what it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub image_path: PathBuf,
    pub roi: Roi,
    pub class_id: u32,
}

#[derive(Debug, Deserialize)]
struct GroundTruthRow {
    #[serde(rename = "Filename")]
    filename: String,
    #[serde(rename = "Width")]
    width: u32,
    #[serde(rename = "Height")]
    height: u32,
    #[serde(rename = "Roi.X1")]
    x1: u32,
    #[serde(rename = "Roi.Y1")]
    y1: u32,
    #[serde(rename = "Roi.X2")]
    x2: u32,
    #[serde(rename = "Roi.Y2")]
    y2: u32,
    #[serde(rename = "ClassId")]
    class_id: u32,
}

/// Recursively lists every `.csv` file under `root`, sorted by path.
pub fn discover_annotation_files(root: &Path) -> PrepResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| PrepError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_csv = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            found.push(entry.into_path());
        }
    }
    found.sort();
    debug!(root = %root.display(), files = found.len(), "discovered annotation files");
    Ok(found)
}

/// Parses one ground-truth CSV, preserving row order. Rows with a class id not
/// below `num_classes` are rejected.
pub fn read_annotations(csv_path: &Path, num_classes: u32) -> PrepResult<Vec<Annotation>> {
    let base_dir = csv_path.parent().unwrap_or_else(|| Path::new(""));
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .map_err(|source| PrepError::Csv {
            path: csv_path.to_path_buf(),
            source,
        })?;

    let mut annotations = Vec::new();
    for (index, record) in reader.deserialize::<GroundTruthRow>().enumerate() {
        // Header is line 1; data rows start at 2.
        let row = index + 2;
        let record = record.map_err(|source| PrepError::Csv {
            path: csv_path.to_path_buf(),
            source,
        })?;
        if record.x1 >= record.x2 || record.y1 >= record.y2 {
            return Err(PrepError::Annotation {
                path: csv_path.to_path_buf(),
                row,
                msg: format!(
                    "degenerate roi ({}, {}) -> ({}, {})",
                    record.x1, record.y1, record.x2, record.y2
                ),
            });
        }
        if record.filename.is_empty() {
            return Err(PrepError::Annotation {
                path: csv_path.to_path_buf(),
                row,
                msg: "missing Filename".to_string(),
            });
        }
        if record.class_id >= num_classes {
            return Err(PrepError::Annotation {
                path: csv_path.to_path_buf(),
                row,
                msg: format!(
                    "class id {} out of range for {num_classes} classes",
                    record.class_id
                ),
            });
        }
        annotations.push(Annotation {
            image_path: base_dir.join(&record.filename),
            roi: Roi {
                x1: record.x1,
                y1: record.y1,
                x2: record.x2,
                y2: record.y2,
                image_width: record.width,
                image_height: record.height,
            },
            class_id: record.class_id,
        });
    }
    debug!(path = %csv_path.display(), rows = annotations.len(), "parsed annotations");
    Ok(annotations)
}

/// Parses several CSVs and concatenates their rows in the given order.
pub fn read_all(csv_paths: &[PathBuf], num_classes: u32) -> PrepResult<Vec<Annotation>> {
    let mut all = Vec::new();
    for path in csv_paths {
        all.extend(read_annotations(path, num_classes)?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str = "Filename;Width;Height;Roi.X1;Roi.Y1;Roi.X2;Roi.Y2;ClassId\n";

    #[test]
    fn parses_rows_relative_to_csv_directory() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("GT-00012.csv");
        fs::write(
            &csv_path,
            format!("{HEADER}00000_00000.ppm;29;30;5;6;24;25;12\n00000_00001.ppm;30;30;5;5;25;25;12\n"),
        )
        .unwrap();

        let rows = read_annotations(&csv_path, 43).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].image_path, dir.path().join("00000_00000.ppm"));
        assert_eq!(
            rows[0].roi,
            Roi {
                x1: 5,
                y1: 6,
                x2: 24,
                y2: 25,
                image_width: 29,
                image_height: 30
            }
        );
        assert_eq!(rows[1].class_id, 12);
    }

    #[test]
    fn ignores_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("gt.csv");
        fs::write(
            &csv_path,
            "Filename;Width;Height;Roi.X1;Roi.Y1;Roi.X2;Roi.Y2;ClassId;Note\na.ppm;10;10;1;1;9;9;3;x\n",
        )
        .unwrap();
        let rows = read_annotations(&csv_path, 43).unwrap();
        assert_eq!(rows[0].class_id, 3);
    }

    #[test]
    fn rejects_degenerate_roi_with_row_number() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("gt.csv");
        fs::write(&csv_path, format!("{HEADER}a.ppm;10;10;1;1;9;9;0\nb.ppm;10;10;5;1;5;9;0\n")).unwrap();
        match read_annotations(&csv_path, 43) {
            Err(PrepError::Annotation { row, .. }) => assert_eq!(row, 3),
            other => panic!("expected annotation error, got {other:?}"),
        }
    }

    #[test]
    fn discovery_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("00001")).unwrap();
        fs::create_dir_all(dir.path().join("00000")).unwrap();
        fs::write(dir.path().join("00001/GT-00001.csv"), HEADER).unwrap();
        fs::write(dir.path().join("00000/GT-00000.CSV"), HEADER).unwrap();
        fs::write(dir.path().join("00000/readme.txt"), "x").unwrap();

        let files = discover_annotation_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("00000/GT-00000.CSV"),
                dir.path().join("00001/GT-00001.csv"),
            ]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_annotation_files(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn roi_clamps_to_decoded_bounds() {
        let roi = Roi {
            x1: 5,
            y1: 5,
            x2: 40,
            y2: 12,
            image_width: 40,
            image_height: 40,
        };
        assert_eq!(roi.clamp_to(20, 20), Some((5, 5, 15, 7)));
        assert_eq!(roi.clamp_to(4, 20), None);
    }

    #[test]
    fn class_out_of_range_names_file_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("gt.csv");
        fs::write(&csv_path, format!("{HEADER}a.ppm;10;10;1;1;9;9;42\nb.ppm;10;10;1;1;9;9;43\n")).unwrap();

        assert_eq!(read_annotations(&csv_path, 44).unwrap().len(), 2);
        match read_annotations(&csv_path, 43) {
            Err(PrepError::Annotation { path, row, msg }) => {
                assert_eq!(path, csv_path);
                assert_eq!(row, 3);
                assert!(msg.contains("class id 43"));
            }
            other => panic!("expected annotation error, got {other:?}"),
        }
    }
}
