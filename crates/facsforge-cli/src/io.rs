//! イベント CSV・閾値 JSON・集計 CSV の入出力

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use facsforge_core::{EventTable, ThresholdTable};
use serde::Serialize;

/// 列名の並んだヘッダ行だけを読む
pub fn read_csv_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open event file: {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?;
    Ok(headers.iter().map(str::to_string).collect())
}

/// イベント CSV を読む
///
/// 1行目が列名、以降が数値。空欄は NaN として読む。
pub fn read_events_csv(path: &Path) -> Result<EventTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open event file: {}", path.display()))?;
    let names: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        bail!("{}: no columns in header", path.display());
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    for (i, record) in reader.records().enumerate() {
        // ヘッダが1行目なのでデータは2行目から
        let line = i + 2;
        let record = record.with_context(|| format!("{}: malformed line {line}", path.display()))?;
        for (c, field) in record.iter().enumerate() {
            let value = if field.is_empty() {
                f64::NAN
            } else {
                field.parse::<f64>().with_context(|| {
                    format!(
                        "{}: line {line}, column '{}': '{field}' is not a number",
                        path.display(),
                        names[c]
                    )
                })?
            };
            columns[c].push(value);
        }
    }

    let table = EventTable::from_columns(names, columns)
        .with_context(|| format!("Invalid event table in {}", path.display()))?;
    log::info!("Read {} events x {} channels from {}", table.len(), table.n_columns(), path.display());
    Ok(table)
}

/// テーブルを CSV に書く。`sample_id` があれば末尾列に付ける。
pub fn write_events_csv(path: &Path, table: &EventTable, sample_id: Option<&str>) -> Result<()> {
    let mut out = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header: Vec<&str> = table.columns().iter().map(String::as_str).collect();
    if sample_id.is_some() {
        header.push("sample_id");
    }
    out.write_record(&header)?;

    for row in table.iter_rows() {
        let mut record: Vec<String> = row.values().map(|v| v.to_string()).collect();
        if let Some(id) = sample_id {
            record.push(id.to_string());
        }
        out.write_record(&record)?;
    }
    out.flush().with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// 複数サンプルの同名集団を連結して書く
///
/// 列はサンプル間の和集合（初出順）。そのサンプルにない列は空欄。
pub fn write_merged_events_csv(path: &Path, parts: &[(String, EventTable)]) -> Result<()> {
    let mut header: Vec<&str> = Vec::new();
    for (_, table) in parts {
        for name in table.columns() {
            if !header.contains(&name.as_str()) {
                header.push(name);
            }
        }
    }

    let mut out = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut full_header = header.clone();
    full_header.push("sample_id");
    out.write_record(&full_header)?;

    for (sample_id, table) in parts {
        let positions: Vec<Option<usize>> = header.iter().map(|h| table.column_index(h)).collect();
        for row in table.iter_rows() {
            let mut record: Vec<String> = positions
                .iter()
                .map(|p| p.map(|c| row.get(c).to_string()).unwrap_or_default())
                .collect();
            record.push(sample_id.clone());
            out.write_record(&record)?;
        }
    }
    out.flush().with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// 閾値表を JSON で書く
pub fn write_thresholds_json(path: &Path, thresholds: &ThresholdTable) -> Result<()> {
    let json = thresholds.to_json_pretty()?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// summary.csv の1行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub population: String,
    pub parent: String,
    pub events: usize,
    pub percent_of_parent: f64,
    pub sample_id: String,
}

/// summary.csv の列名
const SUMMARY_HEADER: [&str; 5] = ["population", "parent", "events", "percent_of_parent", "sample_id"];

/// 集計 CSV を書く。行が無くてもヘッダは書く。
pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    out.write_record(SUMMARY_HEADER)?;
    for row in rows {
        out.serialize(row)?;
    }
    out.flush().with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// 集団名から出力ファイル名 `gated_<name>.csv` を作る
pub fn gated_file_name(population: &str) -> String {
    let safe: String = population
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("gated_{safe}.csv")
}
