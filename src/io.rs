//! csv in / csv out for the record tables and reports

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    if !path.exists() {
        return Err(Error::ArtifactMissing { path: path.to_path_buf() });
    }
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// strict read - the first bad row fails the whole table
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = open_reader(path)?;
    let table = table_name(path);

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize().enumerate() {
        // header is line 1, so data row i sits on line i + 2
        let row: T = record.map_err(|e| Error::invalid_record(&table, index + 2, e.to_string()))?;
        rows.push(row);
    }

    debug!(table = %table, rows = rows.len(), "loaded table");
    Ok(rows)
}

/// lenient read for raw extracts - bad rows are logged + counted, not fatal
pub fn read_table_lenient<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize)> {
    let mut reader = open_reader(path)?;
    let table = table_name(path);

    let mut rows = Vec::new();
    let mut dropped = 0;
    for (index, record) in reader.deserialize().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!(table = %table, line = index + 2, error = %e, "dropping unreadable row");
                dropped += 1;
            }
        }
    }

    Ok((rows, dropped))
}

pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Patient, Stage};

    const PATIENTS: &str = "\
patient_id,age,sex,cancer_type,stage,treatment,diagnosis_date,days_survived,last_followup_date,event_status
P0001,52,Male,Lung,III,Chemo,2019-02-01,400,2020-03-07,1
P0002,61,Female,Breast,ii,Surgery,2019-05-10 00:00:00,200,2019-11-26,0
";

    #[test]
    fn test_read_patients() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ehr.csv");
        fs::write(&path, PATIENTS).unwrap();

        let patients: Vec<Patient> = read_table(&path).unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].stage, Stage::III);
        assert!(patients[0].event_observed);
        assert_eq!(patients[1].stage, Stage::II);
        assert!(!patients[1].event_observed);
        assert!(!patients[1].survival_mismatch());
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table::<Patient>(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
        assert!(err.to_string().ends_with("not available, run the pipeline"));
    }

    #[test]
    fn test_bad_row_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ehr.csv");
        let body = PATIENTS.replace("P0002,61,Female,Breast,ii", "P0002,61,Female,Breast,VII");
        fs::write(&path, body).unwrap();

        match read_table::<Patient>(&path) {
            Err(Error::InvalidRecord { row, .. }) => assert_eq!(row, 3),
            other => panic!("expected invalid record, got {other:?}"),
        }

        let (rows, dropped) = read_table_lenient::<Patient>(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ehr.csv");
        fs::write(dir.path().join("src.csv"), PATIENTS).unwrap();

        let patients: Vec<Patient> = read_table(&dir.path().join("src.csv")).unwrap();
        write_table(&path, &patients).unwrap();
        let again: Vec<Patient> = read_table(&path).unwrap();
        assert_eq!(patients, again);
    }
}
