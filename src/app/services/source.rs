//! Record store boundary and local CSV implementation
//!
//! Core consumes weather and harvest rows through the [`RecordStore`]
//! trait. The shipped implementation reads semicolon-delimited local CSV
//! files; remote queryable stores (the production deployment reads a
//! managed database) implement the same trait behind their own connection
//! handling, so core never reads connection strings or environment
//! variables itself.
//!
//! Malformed rows follow the ParseWarning policy: unparseable dates or
//! numerics degrade to `None` or drop the row with a warning instead of
//! aborting the load.

use crate::app::models::{
    AnnualOutcomeRecord, HarvestRecord, WeatherRecord, parse_flexible_date,
    parse_grouped_number, parse_locale_number,
};
use crate::config::SourceSchema;
use crate::constants::{columns, metric_keywords};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Optional server-side filters for store queries.
///
/// Remote stores may pre-filter by region and start date; the inference
/// layer re-applies its own tiered region matching regardless, so
/// implementations are free to ignore these hints (the CSV store does).
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    pub region: Option<String>,
    pub start_date: Option<NaiveDate>,
}

/// Injectable source of raw records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Daily weather-event rows
    async fn weather_records(&self, query: &SourceQuery) -> Result<Vec<WeatherRecord>>;

    /// Annual harvest-yield rows
    async fn harvest_records(&self, query: &SourceQuery) -> Result<Vec<HarvestRecord>>;

    /// Annual "conclusion" variant rows; empty when the deployment has no
    /// such dataset
    async fn annual_outcomes(&self) -> Result<Vec<AnnualOutcomeRecord>>;
}

/// Distinct raw region names in a harvest load, sorted
/// case-insensitively
pub fn distinct_regions(records: &[HarvestRecord]) -> Vec<String> {
    let mut regions: Vec<String> = records.iter().map(|record| record.region.clone()).collect();
    regions.sort_by_key(|region| region.to_lowercase());
    regions.dedup();
    regions
}

/// Local semicolon-delimited CSV store for development and testing
pub struct CsvRecordStore {
    weather_path: Option<PathBuf>,
    harvest_path: Option<PathBuf>,
    annual_path: Option<PathBuf>,
    schema: SourceSchema,
}

impl CsvRecordStore {
    pub fn new(weather_path: PathBuf, harvest_path: PathBuf, schema: SourceSchema) -> Self {
        Self {
            weather_path: Some(weather_path),
            harvest_path: Some(harvest_path),
            annual_path: None,
            schema,
        }
    }

    /// Store backed only by the annual "conclusion" dataset
    pub fn annual_only(annual_path: PathBuf) -> Self {
        Self {
            weather_path: None,
            harvest_path: None,
            annual_path: Some(annual_path),
            schema: SourceSchema::default(),
        }
    }

    /// Store backed only by the harvest file (region listings)
    pub fn harvest_only(harvest_path: PathBuf, schema: SourceSchema) -> Self {
        Self {
            weather_path: None,
            harvest_path: Some(harvest_path),
            annual_path: None,
            schema,
        }
    }

    /// Attach the annual "conclusion" dataset file
    pub fn with_annual_path(mut self, path: PathBuf) -> Self {
        self.annual_path = Some(path);
        self
    }

    async fn read_file(path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(format!("Failed to read {}", path.display()), e))
    }
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    async fn weather_records(&self, _query: &SourceQuery) -> Result<Vec<WeatherRecord>> {
        let path = self.weather_path.as_ref().ok_or_else(|| {
            Error::configuration("No weather source is configured for this store".to_string())
        })?;
        let content = Self::read_file(path).await?;
        parse_weather_csv(&content, path, &self.schema)
    }

    async fn harvest_records(&self, _query: &SourceQuery) -> Result<Vec<HarvestRecord>> {
        let path = self.harvest_path.as_ref().ok_or_else(|| {
            Error::configuration("No harvest source is configured for this store".to_string())
        })?;
        let content = Self::read_file(path).await?;
        parse_harvest_csv(&content, path, &self.schema)
    }

    async fn annual_outcomes(&self) -> Result<Vec<AnnualOutcomeRecord>> {
        let Some(path) = &self.annual_path else {
            return Ok(Vec::new());
        };
        let content = Self::read_file(path).await?;
        parse_annual_csv(&content, path)
    }
}

/// Header-name to position mapping for one CSV file
struct HeaderMap {
    positions: BTreeMap<String, usize>,
    names: Vec<String>,
}

impl HeaderMap {
    fn from_reader(
        reader: &mut csv::Reader<&[u8]>,
        file: &Path,
    ) -> Result<Self> {
        let headers = reader.headers().map_err(|e| {
            Error::csv_parsing(
                file.display().to_string(),
                "Failed to read CSV headers",
                Some(e),
            )
        })?;

        let names: Vec<String> = headers.iter().map(|name| name.trim().to_string()).collect();
        let positions = names
            .iter()
            .enumerate()
            .map(|(position, name)| (name.clone(), position))
            .collect();
        Ok(Self { positions, names })
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    fn require(&self, column: &str, file: &Path) -> Result<usize> {
        self.position(column).ok_or_else(|| {
            Error::csv_parsing(
                file.display().to_string(),
                format!("Required column '{column}' not found"),
                None,
            )
        })
    }
}

fn csv_reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(content.as_bytes())
}

fn field<'a>(record: &'a csv::StringRecord, position: Option<usize>) -> Option<&'a str> {
    position
        .and_then(|position| record.get(position))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_weather_csv(
    content: &str,
    file: &Path,
    schema: &SourceSchema,
) -> Result<Vec<WeatherRecord>> {
    let mut reader = csv_reader(content);
    let headers = HeaderMap::from_reader(&mut reader, file)?;

    let region_position = headers.require(&schema.region_column, file)?;
    let date_position = headers.require(&schema.date_column, file)?;
    let event_position = headers.position(&schema.event_column);
    let impact_position = headers.position(&schema.impact_column);

    // Numeric metrics are located through the explicit mapping, with
    // keyword discovery as the logged fallback.
    let metric_positions: Vec<(String, usize)> = [
        ("temperature", metric_keywords::TEMPERATURE),
        ("humidity", metric_keywords::HUMIDITY),
        ("rainfall", metric_keywords::RAINFALL),
        ("wind", metric_keywords::WIND),
    ]
    .into_iter()
    .filter_map(|(metric, keywords)| {
        schema
            .discover_metric_column(&headers.names, metric, keywords)
            .and_then(|column| headers.position(&column))
            .map(|position| (metric.to_string(), position))
    })
    .collect();

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row.map_err(|e| {
            Error::csv_parsing(file.display().to_string(), "Malformed CSV row", Some(e))
        })?;

        let Some(region) = field(&row, Some(region_position)) else {
            dropped += 1;
            continue;
        };
        let date = field(&row, Some(date_position)).and_then(parse_flexible_date);
        let Some(date) = date else {
            warn!("Dropping weather row with unparseable date for region '{region}'");
            dropped += 1;
            continue;
        };

        let mut metrics = BTreeMap::new();
        for (metric, position) in &metric_positions {
            if let Some(value) = field(&row, Some(*position)).and_then(parse_locale_number) {
                metrics.insert(metric.clone(), value);
            }
        }

        records.push(WeatherRecord {
            region: region.to_string(),
            date,
            events: field(&row, event_position).map(str::to_string),
            impacts: field(&row, impact_position).map(str::to_string),
            metrics,
        });
    }

    info!(
        "Loaded {} weather rows from {} ({} dropped)",
        records.len(),
        file.display(),
        dropped
    );
    Ok(records)
}

fn parse_harvest_csv(
    content: &str,
    file: &Path,
    schema: &SourceSchema,
) -> Result<Vec<HarvestRecord>> {
    let mut reader = csv_reader(content);
    let headers = HeaderMap::from_reader(&mut reader, file)?;

    let region_position = headers.require(&schema.region_column, file)?;
    let year_position = headers.require(&schema.year_column, file)?;
    let productivity_position = headers.position(&schema.productivity_column);
    let area_position = headers.position(&schema.area_column);
    let production_position = headers.position(&schema.production_column);

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row.map_err(|e| {
            Error::csv_parsing(file.display().to_string(), "Malformed CSV row", Some(e))
        })?;

        let Some(region) = field(&row, Some(region_position)) else {
            dropped += 1;
            continue;
        };
        let Some(year) = field(&row, Some(year_position)).and_then(|raw| raw.parse::<i32>().ok())
        else {
            warn!("Dropping harvest row with unparseable year for region '{region}'");
            dropped += 1;
            continue;
        };

        let productivity = field(&row, productivity_position).and_then(parse_locale_number);
        let harvested_area = field(&row, area_position).and_then(parse_locale_number);
        if productivity.is_none() || harvested_area.is_none() {
            debug!(
                "Harvest row for '{region}' ({year}) has unparseable numerics; kept with gaps"
            );
        }

        records.push(HarvestRecord {
            region: region.to_string(),
            year,
            productivity,
            harvested_area,
            production: field(&row, production_position).and_then(parse_locale_number),
        });
    }

    info!(
        "Loaded {} harvest rows from {} ({} dropped)",
        records.len(),
        file.display(),
        dropped
    );
    Ok(records)
}

fn parse_annual_csv(content: &str, file: &Path) -> Result<Vec<AnnualOutcomeRecord>> {
    let mut reader = csv_reader(content);
    let headers = HeaderMap::from_reader(&mut reader, file)?;

    let region_position = headers.require(columns::ANNUAL_REGION, file)?;
    let year_position = headers.require(columns::ANNUAL_YEAR, file)?;
    let yield_position = headers.position(columns::ANNUAL_YIELD);
    let status_position = headers.require(columns::ANNUAL_STATUS, file)?;
    let info_position = headers.position(columns::ANNUAL_WEATHER_INFO);

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row.map_err(|e| {
            Error::csv_parsing(file.display().to_string(), "Malformed CSV row", Some(e))
        })?;

        let (Some(region), Some(year)) = (
            field(&row, Some(region_position)),
            field(&row, Some(year_position)).and_then(|raw| raw.parse::<i32>().ok()),
        ) else {
            dropped += 1;
            continue;
        };

        records.push(AnnualOutcomeRecord {
            region: region.to_string(),
            year,
            yield_tons: field(&row, yield_position)
                .and_then(parse_grouped_number)
                .unwrap_or(0.0),
            status_text: field(&row, Some(status_position))
                .unwrap_or_default()
                .to_string(),
            weather_info: field(&row, info_position).map(str::to_string),
        });
    }

    info!(
        "Loaded {} annual outcome rows from {} ({} dropped)",
        records.len(),
        file.display(),
        dropped
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn store(weather: &str, harvest: &str) -> (CsvRecordStore, Vec<tempfile::NamedTempFile>) {
        let weather_file = write_temp(weather);
        let harvest_file = write_temp(harvest);
        let store = CsvRecordStore::new(
            weather_file.path().to_path_buf(),
            harvest_file.path().to_path_buf(),
            SourceSchema::default(),
        );
        (store, vec![weather_file, harvest_file])
    }

    const WEATHER_CSV: &str = "\
Kabupaten/Kota;Tanggal;Cuaca Ekstrem;Dampak;Suhu (C)
Kab. Bandung;2023-01-02;Hujan Lebat, Petir;Banjir / Genangan;26,5
Kab. Bandung;bad-date;Petir;;27,0
Kota Bogor;2023-01-03;Angin Kencang;Pohon Tumbang;25,0
";

    const HARVEST_CSV: &str = "\
Kabupaten/Kota;Tahun;Produktivitas Tanaman Padi (ku/ha) (Ku/ha);Luas Panen Tanaman Padi (ha) (Ha);Rekap Produksi Padi (ton)
Kab. Bandung;2022;54 987,79;1 200,5;99 000
Kota Bogor;2022;not-a-number;800;1 000
";

    #[tokio::test]
    async fn weather_rows_parse_and_bad_dates_drop() {
        let (store, _files) = store(WEATHER_CSV, HARVEST_CSV);
        let records = store
            .weather_records(&SourceQuery::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].region, "Kab. Bandung");
        assert_eq!(records[0].events.as_deref(), Some("Hujan Lebat, Petir"));
        assert_eq!(records[0].impacts.as_deref(), Some("Banjir / Genangan"));
        // heuristic metric discovery found the temperature column
        assert_eq!(records[0].metrics.get("temperature"), Some(&26.5));
    }

    #[tokio::test]
    async fn harvest_numerics_use_locale_parsing() {
        let (store, _files) = store(WEATHER_CSV, HARVEST_CSV);
        let records = store
            .harvest_records(&SourceQuery::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].productivity, Some(54987.79));
        assert_eq!(records[0].harvested_area, Some(1200.5));
        assert_eq!(records[0].production, Some(99000.0));

        // unparseable productivity degrades to None instead of failing
        assert_eq!(records[1].productivity, None);
        assert!(!records[1].is_complete());
    }

    #[tokio::test]
    async fn missing_required_column_is_a_csv_error() {
        let (store, _files) = store("Wrong;Headers\n1;2\n", HARVEST_CSV);
        let error = store
            .weather_records(&SourceQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::CsvParsing { .. }));
    }

    #[tokio::test]
    async fn annual_outcomes_parse_grouped_yields() {
        let annual = write_temp(
            "kabupaten/kota;tahun;hasil_panen;status_panen;info_cuaca\n\
             Kab. Garut;2022;12.345,67;TURUN (5.2 TON);Hujan Lebat (3x) | Banjir\n",
        );
        let (store, _files) = store(WEATHER_CSV, HARVEST_CSV);
        let store = store.with_annual_path(annual.path().to_path_buf());

        let records = store.annual_outcomes().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].yield_tons, 12345.67);
        assert_eq!(records[0].status_text, "TURUN (5.2 TON)");
        assert_eq!(
            records[0].weather_info.as_deref(),
            Some("Hujan Lebat (3x) | Banjir")
        );
    }

    #[tokio::test]
    async fn store_without_annual_dataset_returns_empty() {
        let (store, _files) = store(WEATHER_CSV, HARVEST_CSV);
        assert!(store.annual_outcomes().await.unwrap().is_empty());
    }
}
