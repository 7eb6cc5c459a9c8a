//! 集団（celltype）の依存グラフ解決
//!
//! 各集団は親集団（なければルートのイベントテーブル）の行に対して、
//! ゲート → マーカー規則 の順に絞り込んだ結果になる。
//!
//! 解決は「未解決集合を繰り返し走査し、親が解決済みのものを解決する」固定点反復で行う。
//! 1パスで何も解決できなければ循環か存在しない親があるとみなして失敗する。
//! パス数は `集団数 + EXTRA_PASSES` で打ち切るので必ず停止する。

use std::collections::{HashMap, HashSet};

use crate::error::{GatingError, GatingFailure, GatingWarning};
use crate::gate::Gate;
use crate::markers::apply_marker_rules;
use crate::table::EventTable;
use crate::threshold::ThresholdTable;

/// 解決パス数の上限に足す余裕
pub const EXTRA_PASSES: usize = 4;

/// 集団の定義
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationDef {
    pub name: String,
    /// `None` ならルートのイベントテーブルが親
    pub parent: Option<String>,
    pub gate: Option<Gate>,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl PopulationDef {
    /// ルート直下の、ゲートも規則もない定義
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            gate: None,
            positive: Vec::new(),
            negative: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_positive<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positive.extend(markers.into_iter().map(Into::into));
        self
    }

    pub fn with_negative<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.negative.extend(markers.into_iter().map(Into::into));
        self
    }
}

/// 解決済みの1集団
#[derive(Debug, Clone)]
pub struct ResolvedPopulation {
    pub name: String,
    pub parent: Option<String>,
    pub table: EventTable,
}

/// 集団名 → 結果テーブル（解決順を保持）
#[derive(Debug, Clone, Default)]
pub struct Populations {
    entries: Vec<ResolvedPopulation>,
    index: HashMap<String, usize>,
}

impl Populations {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, entry: ResolvedPopulation) {
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str) -> Option<&EventTable> {
        self.index.get(name).map(|&i| &self.entries[i].table)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 解決順に列挙する
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPopulation> {
        self.entries.iter()
    }

    /// 解決順の名前
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

/// 解決に成功した実行の結果
#[derive(Debug, Clone, Default)]
pub struct GatingOutcome {
    pub populations: Populations,
    pub warnings: Vec<GatingWarning>,
}

/// 1集団分: 親テーブルにゲート、続いてマーカー規則
fn resolve_one(
    def: &PopulationDef,
    parent: &EventTable,
    thresholds: &ThresholdTable,
    warnings: &mut Vec<GatingWarning>,
) -> Result<EventTable, GatingError> {
    let gated = match &def.gate {
        Some(gate) => gate.apply(parent, &def.name)?,
        None => parent.clone(),
    };
    apply_marker_rules(&gated, &def.name, &def.positive, &def.negative, thresholds, warnings)
}

/// 全集団を解決する
///
/// 成功時は解決順の [`Populations`] と警告。致命的エラー時は [`GatingFailure`] に
/// それまでに解決できた集団を入れて返す。
pub fn resolve_populations(
    root: &EventTable,
    definitions: &[PopulationDef],
    thresholds: &ThresholdTable,
) -> Result<GatingOutcome, GatingFailure> {
    let mut populations = Populations::new();
    let mut warnings = Vec::new();

    let mut seen = HashSet::with_capacity(definitions.len());
    if let Some(dup) = definitions.iter().find(|d| !seen.insert(d.name.as_str())) {
        return Err(GatingFailure {
            error: GatingError::DuplicatePopulation(dup.name.clone()),
            partial: populations,
            warnings,
        });
    }

    let mut pending: Vec<&PopulationDef> = definitions.iter().collect();
    let max_passes = definitions.len() + EXTRA_PASSES;

    for pass in 0..max_passes {
        if pending.is_empty() {
            break;
        }
        let before = pending.len();
        let mut waiting = Vec::with_capacity(before);

        for def in pending {
            let parent_table = match def.parent.as_deref() {
                None => root.clone(),
                Some(parent) => match populations.get(parent) {
                    Some(t) => t.clone(),
                    None => {
                        waiting.push(def);
                        continue;
                    }
                },
            };

            match resolve_one(def, &parent_table, thresholds, &mut warnings) {
                Ok(table) => {
                    log::info!(
                        "Resolved population '{}' (parent: {}): {} -> {} events",
                        def.name,
                        def.parent.as_deref().unwrap_or("<root>"),
                        parent_table.len(),
                        table.len()
                    );
                    populations.push(ResolvedPopulation {
                        name: def.name.clone(),
                        parent: def.parent.clone(),
                        table,
                    });
                }
                Err(error) => {
                    log::error!("Population '{}' failed: {error}", def.name);
                    return Err(GatingFailure {
                        error,
                        partial: populations,
                        warnings,
                    });
                }
            }
        }

        pending = waiting;
        if pending.len() == before {
            log::debug!("pass {pass}: no progress with {} pending", pending.len());
            break;
        }
    }

    if !pending.is_empty() {
        let mut unresolved: Vec<String> = pending.iter().map(|d| d.name.clone()).collect();
        unresolved.sort();
        let error = GatingError::UnresolvedDependencyGraph { unresolved };
        log::error!("{error}");
        return Err(GatingFailure {
            error,
            partial: populations,
            warnings,
        });
    }

    Ok(GatingOutcome {
        populations,
        warnings,
    })
}
