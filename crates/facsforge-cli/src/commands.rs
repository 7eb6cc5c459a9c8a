//! サブコマンド本体

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use facsforge_core::{EventTable, Experiment, GatingReport, Populations, run_gating};

use crate::io::{
    SummaryRow, gated_file_name, read_csv_header, read_events_csv, write_events_csv,
    write_merged_events_csv, write_summary_csv, write_thresholds_json,
};

/// マージ出力のディレクトリ名
pub const MERGED_DIR: &str = "merged";

/// ファイル名の拡張子を除いた部分をサンプル ID にする
pub fn sample_id_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// 各ファイルのサンプル ID を求める
///
/// 複数サンプルの出力先は `outdir/<sample_id>/` なので、ID の重複はエラーにする。
pub fn unique_sample_ids(events: &[PathBuf]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    let mut ids = Vec::with_capacity(events.len());
    for path in events {
        let id = sample_id_of(path);
        if let Some(first) = seen.insert(id.clone(), path) {
            bail!(
                "duplicate sample id '{id}' ({} and {}); rename one of the event files",
                first.display(),
                path.display()
            );
        }
        ids.push(id);
    }
    Ok(ids)
}

/// 集団ごとの件数と親に対する割合
pub fn summarize(root: &EventTable, populations: &Populations, sample_id: &str) -> Vec<SummaryRow> {
    populations
        .iter()
        .map(|pop| {
            let parent_events = match pop.parent.as_deref() {
                Some(p) => populations.get(p).map_or(0, EventTable::len),
                None => root.len(),
            };
            let percent_of_parent = if parent_events == 0 {
                0.0
            } else {
                100.0 * pop.table.len() as f64 / parent_events as f64
            };
            SummaryRow {
                population: pop.name.clone(),
                parent: pop.parent.clone().unwrap_or_default(),
                events: pop.table.len(),
                percent_of_parent,
                sample_id: sample_id.to_string(),
            }
        })
        .collect()
}

/// 対象集団の CSV を書き出す
fn export_populations(
    outdir: &Path,
    populations: &Populations,
    experiment: &Experiment,
    sample_id: Option<&str>,
) -> Result<()> {
    for pop in populations.iter().filter(|p| experiment.is_of_interest(&p.name)) {
        let path = outdir.join(gated_file_name(&pop.name));
        write_events_csv(&path, &pop.table, sample_id)?;
        log::info!("Saved {} ({} events)", path.display(), pop.table.len());
    }
    Ok(())
}

/// 1サンプルを解析して `outdir` に書き出す
///
/// `tag_sample` なら出力 CSV に `sample_id` 列を付ける。
/// 致命的エラーの場合も、それまでに解決できた集団は書き出してからエラーを返す。
pub fn analyze_sample(
    events_path: &Path,
    experiment: &Experiment,
    outdir: &Path,
    tag_sample: bool,
) -> Result<(EventTable, GatingReport)> {
    fs::create_dir_all(outdir)
        .with_context(|| format!("Failed to create output directory {}", outdir.display()))?;
    let sample_id = sample_id_of(events_path);
    let events = read_events_csv(events_path)?;
    let tag = tag_sample.then_some(sample_id.as_str());

    let report = match run_gating(&events, experiment) {
        Ok(report) => report,
        Err(failure) => {
            log::warn!(
                "Exporting {} population(s) resolved before the failure",
                failure.partial.len()
            );
            export_populations(outdir, &failure.partial, experiment, tag)?;
            return Err(anyhow::Error::new(failure)
                .context(format!("Gating failed for sample '{sample_id}'")));
        }
    };

    for warning in &report.warnings {
        log::warn!("[{sample_id}] {warning}");
    }

    export_populations(outdir, &report.populations, experiment, tag)?;
    write_thresholds_json(&outdir.join("thresholds.json"), &report.thresholds)?;
    let summary = summarize(&events, &report.populations, &sample_id);
    write_summary_csv(&outdir.join("summary.csv"), &summary)?;
    log::info!("[{sample_id}] results written to {}", outdir.display());

    Ok((events, report))
}

/// `analyze` サブコマンド
///
/// 1サンプルなら `outdir` 直下、複数なら `outdir/<sample>/` とマージ結果 `outdir/merged/`。
pub fn analyze(events: &[PathBuf], config: &Path, outdir: &Path) -> Result<()> {
    if events.is_empty() {
        bail!("no event files given");
    }
    let experiment = Experiment::load(config)
        .with_context(|| format!("Failed to load experiment config {}", config.display()))?;

    if let [single] = events {
        analyze_sample(single, &experiment, outdir, false)?;
        return Ok(());
    }

    let sample_ids = unique_sample_ids(events)?;
    let mut merged: BTreeMap<String, Vec<(String, EventTable)>> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut summary = Vec::new();

    for (path, sample_id) in events.iter().zip(&sample_ids) {
        let (root, report) = analyze_sample(path, &experiment, &outdir.join(sample_id), true)?;
        summary.extend(summarize(&root, &report.populations, sample_id));
        for pop in report.populations.iter().filter(|p| experiment.is_of_interest(&p.name)) {
            if !merged.contains_key(&pop.name) {
                order.push(pop.name.clone());
            }
            merged
                .entry(pop.name.clone())
                .or_default()
                .push((sample_id.clone(), pop.table.clone()));
        }
    }

    let merged_dir = outdir.join(MERGED_DIR);
    fs::create_dir_all(&merged_dir)
        .with_context(|| format!("Failed to create output directory {}", merged_dir.display()))?;
    for name in &order {
        if let Some(parts) = merged.get(name) {
            let path = merged_dir.join(gated_file_name(name));
            write_merged_events_csv(&path, parts)?;
            log::info!("Saved merged {} ({} samples)", path.display(), parts.len());
        }
    }
    write_summary_csv(&merged_dir.join("summary.csv"), &summary)?;
    log::info!("Multi-sample run complete: {} samples", events.len());
    Ok(())
}

/// `generate-config` サブコマンド: 全チャネルを ignore にした雛形を書く
pub fn generate_config(events: &Path, output: &Path) -> Result<()> {
    let columns = read_csv_header(events)?;
    let skeleton = Experiment::skeleton(&sample_id_of(events), columns.as_slice());
    let yaml = skeleton.to_yaml()?;
    fs::write(output, yaml).with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Wrote config skeleton with {} channels to {}", columns.len(), output.display());
    Ok(())
}
