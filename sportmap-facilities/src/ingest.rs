use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use sportmap_shared::errors::AppError;

use crate::models::{Coordinates, NewFacility};
use crate::store::FacilityStore;

pub const BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Refuse to load into a non-empty store.
    Guarded,
    /// Load on top of whatever is already there.
    Force,
    /// Empty the store once the CSV file is open, then load.
    Clear,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub rows_seen: usize,
    pub inserted: usize,
    pub errored: usize,
    pub store_total: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("store already holds {existing} facilities; use --force to merge or --clear to reload")]
    ExistingData { existing: i64 },

    #[error("CSV file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to read CSV: {0}")]
    Io(#[from] io::Error),

    #[error("malformed CSV stream: {0}")]
    Csv(#[from] csv::Error),

    #[error("facility store error: {0}")]
    Store(#[from] AppError),
}

/// One line of the public equipment catalog export. Unknown columns are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    inst_numero: Option<String>,
    equip_coordonnees: Option<String>,
    inst_nom: Option<String>,
    equip_type_name: Option<String>,
    equip_type_famille: Option<String>,
    aps_name: Option<String>,
    equip_acc_libre: Option<String>,
    equip_url: Option<String>,
    inst_adresse: Option<String>,
    new_code: Option<String>,
    equip_prop_nom: Option<String>,
    equip_gest_type: Option<String>,
    inst_acc_handi_bool: Option<String>,
}

impl CsvRow {
    fn into_new_facility(self) -> Option<NewFacility> {
        let point = self.equip_coordonnees.as_deref().and_then(parse_coordinates)?;

        Some(NewFacility {
            external_code: self.inst_numero.unwrap_or_default(),
            longitude: point.longitude,
            latitude: point.latitude,
            name: self.inst_nom.unwrap_or_default(),
            type_name: self.equip_type_name.unwrap_or_default(),
            type_family: self.equip_type_famille.unwrap_or_default(),
            sports: self.aps_name.unwrap_or_default(),
            free_access: self.equip_acc_libre.as_deref().is_some_and(parse_flag),
            url: self.equip_url.unwrap_or_default(),
            address: self.inst_adresse.unwrap_or_default(),
            postal_code: self.new_code.unwrap_or_default(),
            owner_name: self.equip_prop_nom.unwrap_or_default(),
            operator_type: self.equip_gest_type.unwrap_or_default(),
            accessible_to_disabled: self.inst_acc_handi_bool.as_deref().is_some_and(parse_flag),
        })
    }
}

/// Accepts a JSON object or a single-quoted mapping literal carrying
/// `lon`/`lat` as numbers or numeric strings.
pub fn parse_coordinates(raw: &str) -> Option<Coordinates> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let value: Value = serde_json::from_str(raw)
        .or_else(|_| serde_json::from_str(&raw.replace('\'', "\"")))
        .ok()?;

    let lon = number(value.get("lon")?)?;
    let lat = number(value.get("lat")?)?;
    Some(Coordinates::new(lon, lat))
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "oui"
    )
}

/// Bulk CSV loader with row-level error tolerance.
pub struct CsvLoader<'a> {
    store: &'a dyn FacilityStore,
    batch_size: usize,
}

impl<'a> CsvLoader<'a> {
    pub fn new(store: &'a dyn FacilityStore) -> Self {
        Self { store, batch_size: BATCH_SIZE }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Checked once, before the file is opened; a concurrent loader can still
    /// slip in between this check and the first insert.
    pub fn preflight(&self, mode: LoadMode) -> Result<i64, IngestError> {
        let existing = self.store.count()?;
        match mode {
            LoadMode::Guarded if existing > 0 => Err(IngestError::ExistingData { existing }),
            LoadMode::Force if existing > 0 => {
                tracing::info!(existing, "force mode: merging into existing facilities");
                Ok(existing)
            }
            _ => {
                tracing::info!(existing, ?mode, "store check passed");
                Ok(existing)
            }
        }
    }

    pub fn load_path(&self, path: &Path, mode: LoadMode) -> Result<IngestReport, IngestError> {
        self.preflight(mode)?;

        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => IngestError::FileNotFound(path.to_path_buf()),
            _ => IngestError::Io(e),
        })?;

        // Reports cascade with facilities, so nothing is deleted until the file is readable.
        if mode == LoadMode::Clear {
            let deleted = self.store.clear()?;
            tracing::info!(deleted, "facility table cleared");
        }

        tracing::info!(path = %path.display(), "loading facilities");
        self.load_reader(file)
    }

    pub fn load_reader<R: Read>(&self, reader: R) -> Result<IngestReport, IngestError> {
        let mut rows = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let mut report = IngestReport::default();
        let mut buffer: Vec<NewFacility> = Vec::with_capacity(self.batch_size);

        for record in rows.deserialize::<CsvRow>() {
            report.rows_seen += 1;
            let line = report.rows_seen;

            let row = match record {
                Ok(row) => row,
                Err(e) if e.is_io_error() => return Err(IngestError::Csv(e)),
                Err(e) => {
                    tracing::warn!(row = line, error = %e, "skipping unreadable row");
                    report.errored += 1;
                    continue;
                }
            };

            let code = row.inst_numero.clone().unwrap_or_else(|| "unknown".into());
            match row.into_new_facility() {
                Some(facility) => buffer.push(facility),
                None => {
                    tracing::warn!(row = line, inst_numero = %code, "skipping row with invalid coordinates");
                    report.errored += 1;
                    continue;
                }
            }

            if buffer.len() >= self.batch_size {
                report.inserted += self.flush(&mut buffer, false)?;
            }
        }

        if !buffer.is_empty() {
            report.inserted += self.flush(&mut buffer, true)?;
        }

        report.store_total = self.store.count()?;
        tracing::info!(
            rows_seen = report.rows_seen,
            inserted = report.inserted,
            errored = report.errored,
            store_total = report.store_total,
            "CSV import completed"
        );
        Ok(report)
    }

    fn flush(&self, buffer: &mut Vec<NewFacility>, last: bool) -> Result<usize, IngestError> {
        let inserted = self.store.insert_batch(buffer)?;
        if last {
            tracing::info!(inserted, "inserted final batch");
        } else {
            tracing::info!(inserted, "inserted batch");
        }
        buffer.clear();
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FacilityFilter;
    use crate::store::MemoryFacilityStore;

    const HEADER: &str = "inst_numero,equip_coordonnees,inst_nom,equip_type_name,aps_name,equip_acc_libre,inst_acc_handi_bool\n";

    fn csv_with(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn coordinates_accept_json_and_quoted_literals() {
        assert_eq!(parse_coordinates(r#"{"lon": 5.4, "lat": 43.3}"#), Some(Coordinates::new(5.4, 43.3)));
        assert_eq!(parse_coordinates("{'lon': 5.4, 'lat': 43.3}"), Some(Coordinates::new(5.4, 43.3)));
        assert_eq!(parse_coordinates(r#"{"lon": "5.4", "lat": "43.3"}"#), Some(Coordinates::new(5.4, 43.3)));
    }

    #[test]
    fn unusable_coordinates_are_rejected() {
        for raw in ["", "  ", "not a point", "{'lon': 5.4}", "[5.4, 43.3]", "{'lon': 'east', 'lat': 1}"] {
            assert_eq!(parse_coordinates(raw), None, "{raw}");
        }
    }

    #[test]
    fn flags_accept_french_and_english_truthy_words() {
        for raw in ["true", "TRUE", "1", "yes", "Oui", " oui "] {
            assert!(parse_flag(raw), "{raw}");
        }
        for raw in ["", "false", "0", "non", "y"] {
            assert!(!parse_flag(raw), "{raw}");
        }
    }

    #[test]
    fn bad_coordinate_row_is_counted_not_inserted() {
        let store = MemoryFacilityStore::new();
        let data = csv_with(&[
            r#"I1,"{'lon': 5.4, 'lat': 43.3}",Stade,Terrain de tennis,Tennis,oui,0"#,
            "I2,garbage,Piscine,Bassin,Natation,non,1",
        ]);

        let report = CsvLoader::new(&store).load_reader(data.as_bytes()).unwrap();

        assert_eq!(report.rows_seen, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.errored, 1);
        assert_eq!(report.store_total, 1);

        let facilities = store.list(&FacilityFilter::default()).unwrap();
        assert_eq!(facilities[0].external_code.as_deref(), Some("I1"));
        assert!(facilities[0].free_access);
        assert!(!facilities[0].accessible_to_disabled);
    }

    #[test]
    fn missing_columns_default_to_empty_text() {
        let store = MemoryFacilityStore::new();
        let data = "equip_coordonnees\n\"{\"\"lon\"\": 1, \"\"lat\"\": 2}\"\n";

        let report = CsvLoader::new(&store).load_reader(data.as_bytes()).unwrap();
        assert_eq!(report.inserted, 1);

        let facility = &store.list(&FacilityFilter::default()).unwrap()[0];
        assert_eq!(facility.name.as_deref(), Some(""));
        assert_eq!(facility.address.as_deref(), Some(""));
        assert!(!facility.free_access);
    }

    #[test]
    fn rows_are_flushed_in_fixed_size_batches() {
        let store = MemoryFacilityStore::new();
        let rows: Vec<String> = (0..7)
            .map(|i| format!(r#"I{i},"{{'lon': 1.{i}, 'lat': 2.0}}",N,T,S,0,0"#))
            .collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();

        let report = CsvLoader::new(&store)
            .with_batch_size(3)
            .load_reader(csv_with(&refs).as_bytes())
            .unwrap();

        assert_eq!(report.inserted, 7);
        assert_eq!(report.store_total, 7);
    }

    #[test]
    fn guard_trips_before_the_file_is_opened() {
        let store = MemoryFacilityStore::new();
        store.insert_batch(&[NewFacility::default()]).unwrap();

        let err = CsvLoader::new(&store)
            .load_path(Path::new("/nonexistent/facilities.csv"), LoadMode::Guarded)
            .unwrap_err();

        assert!(matches!(err, IngestError::ExistingData { existing: 1 }));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn force_passes_the_guard() {
        let store = MemoryFacilityStore::new();
        store.insert_batch(&[NewFacility::default()]).unwrap();
        let loader = CsvLoader::new(&store);

        assert_eq!(loader.preflight(LoadMode::Force).unwrap(), 1);
        assert_eq!(loader.preflight(LoadMode::Clear).unwrap(), 1);
    }

    #[test]
    fn clear_with_missing_file_keeps_existing_rows() {
        let store = MemoryFacilityStore::new();
        store.insert_batch(&[NewFacility::default()]).unwrap();

        let err = CsvLoader::new(&store)
            .load_path(Path::new("/nonexistent/facilities.csv"), LoadMode::Clear)
            .unwrap_err();

        assert!(matches!(err, IngestError::FileNotFound(_)));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn clear_replaces_rows_once_the_file_opens() {
        let store = MemoryFacilityStore::new();
        store.insert_batch(&[NewFacility::default(), NewFacility::default()]).unwrap();

        let path = std::env::temp_dir().join(format!("sportmap-clear-{}.csv", std::process::id()));
        std::fs::write(&path, csv_with(&[r#"I9,"{'lon': 5.4, 'lat': 43.3}",Stade,T,S,0,0"#])).unwrap();

        let report = CsvLoader::new(&store).load_path(&path, LoadMode::Clear);
        std::fs::remove_file(&path).unwrap();
        let report = report.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.store_total, 1);
        let facilities = store.list(&FacilityFilter::default()).unwrap();
        assert_eq!(facilities[0].external_code.as_deref(), Some("I9"));
    }

    #[test]
    fn missing_file_is_reported_distinctly() {
        let store = MemoryFacilityStore::new();
        let err = CsvLoader::new(&store)
            .load_path(Path::new("/nonexistent/facilities.csv"), LoadMode::Guarded)
            .unwrap_err();

        assert!(matches!(err, IngestError::FileNotFound(_)));
    }

    #[test]
    fn store_failure_aborts_the_run() {
        let store = MemoryFacilityStore::new();
        let data = csv_with(&[r#"I1,"{'lon': 5.4, 'lat': 43.3}",Stade,T,S,0,0"#]);
        let loader = CsvLoader::new(&store);
        store.set_unavailable(true);

        let err = loader.load_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }
}
