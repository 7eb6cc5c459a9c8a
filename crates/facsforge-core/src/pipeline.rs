//! マーカー除去 → 自動閾値 → 集団解決 を通しで行う

use crate::config::{CompensationSource, Experiment};
use crate::error::{GatingFailure, GatingWarning};
use crate::population::{Populations, resolve_populations};
use crate::table::EventTable;
use crate::threshold::{ThresholdEstimator, ThresholdTable};

/// 1サンプル分のゲーティング結果
#[derive(Debug, Clone, Default)]
pub struct GatingReport {
    pub populations: Populations,
    pub thresholds: ThresholdTable,
    pub warnings: Vec<GatingWarning>,
}

/// 既定の推定器で [`run_gating_with`] を呼ぶ
pub fn run_gating(events: &EventTable, experiment: &Experiment) -> Result<GatingReport, GatingFailure> {
    run_gating_with(events, experiment, &ThresholdEstimator::default())
}

/// 1サンプルをゲーティングする
///
/// 補正は行わない（`compensation.source` が `none` 以外なら記録だけ残す）。
pub fn run_gating_with(
    events: &EventTable,
    experiment: &Experiment,
    estimator: &ThresholdEstimator,
) -> Result<GatingReport, GatingFailure> {
    log::info!("Loaded {} events x {} channels", events.len(), events.n_columns());

    match experiment.compensation.source {
        CompensationSource::None => log::info!("No compensation applied (source: none)"),
        other => log::warn!(
            "Compensation source {other:?} requested; events are used as given (no matrix applied)"
        ),
    }

    let panel = experiment.effective_panel();
    let prepared = panel.drop_ignored(events);
    log::info!("Using {} channel(s) after marker drop", prepared.n_columns());

    let thresholds = estimator.compute(&prepared, &panel);
    log::info!("Computed {} auto-threshold(s)", thresholds.len());

    let definitions = experiment.population_defs().map_err(|error| GatingFailure {
        error,
        partial: Populations::new(),
        warnings: Vec::new(),
    })?;

    let outcome = resolve_populations(&prepared, &definitions, &thresholds)?;
    log::info!(
        "Gating finished: {} population(s), {} warning(s)",
        outcome.populations.len(),
        outcome.warnings.len()
    );

    Ok(GatingReport {
        populations: outcome.populations,
        thresholds,
        warnings: outcome.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
panel:
  FSC-A: {}
  SSC-A: {}
  CD3: {fluor: FITC}
  Time: {ignore: true}
celltypes:
  Lymphocytes:
    gate: {type: rectangle, channels: [FSC-A, SSC-A], vertices: [[0, 0], [100000, 100000]]}
  T cells:
    parent: Lymphocytes
    positive: [CD3]
  B cells:
    parent: Lymphocytes
    negative: [CD19]
"#;

    fn events() -> EventTable {
        // CD3 は 100 付近に 40 点、1000 付近に 10 点
        let mut rows = Vec::new();
        for i in 0..50 {
            let cd3 = if i < 40 { 100.0 + i as f64 } else { 1000.0 + i as f64 };
            let fsc = if i % 10 == 0 { 150_000.0 } else { 50_000.0 };
            rows.push(vec![fsc, 40_000.0, cd3, i as f64]);
        }
        EventTable::from_rows(
            vec!["FSC-A".into(), "SSC-A".into(), "CD3".into(), "Time".into()],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let exp = Experiment::from_yaml_str(CONFIG).unwrap();
        let report = run_gating(&events(), &exp).unwrap();

        // Time は除去、FSC/SSC は閾値対象外
        assert_eq!(report.thresholds.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["CD3"]);
        let lymph = report.populations.get("Lymphocytes").unwrap();
        assert_eq!(lymph.len(), 45);
        assert!(lymph.column_index("Time").is_none());

        let t = report.populations.get("T cells").unwrap();
        assert!(t.len() <= lymph.len());
        let cd3 = t.column_index("CD3").unwrap();
        let threshold = report.thresholds.get("CD3").unwrap();
        assert!(t.iter_rows().all(|r| r.get(cd3) > threshold));

        // CD19 は閾値がないので B cells は Lymphocytes と同じ
        assert_eq!(report.populations.get("B cells").unwrap().len(), 45);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let exp = Experiment::from_yaml_str(CONFIG).unwrap();
        let a = run_gating(&events(), &exp).unwrap();
        let b = run_gating(&events(), &exp).unwrap();
        assert_eq!(a.thresholds, b.thresholds);
        for (x, y) in a.populations.iter().zip(b.populations.iter()) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.table.row_ids(), y.table.row_ids());
        }
    }
}
