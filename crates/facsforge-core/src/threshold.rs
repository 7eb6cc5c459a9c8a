//! マーカー陽性/陰性判定の自動閾値
//!
//! 方式は「最初の谷、なければ p95」:
//!
//! 1. 値の [min, max] を 200 等分したヒストグラムを作る
//! 2. ビン度数の 20 パーセンタイルを低密度の基準にする
//! 3. 値の小さい側から見て、度数が基準を下回る最初のビンの下端を閾値とする
//! 4. そのようなビンがなければ値そのものの 95 パーセンタイル
//!
//! 統計的な保証はないヒューリスティックだが、同じ入力とビン数に対して必ず同じ値を返す。
//! ルートのイベントテーブルから1回だけ計算し、全集団で共有する。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::channel;
use crate::panel::Panel;
use crate::table::EventTable;

/// 既定のビン数
pub const DEFAULT_BINS: usize = 200;
/// 低密度判定に使うビン度数のパーセンタイル
pub const DEFAULT_LOW_DENSITY_PERCENTILE: f64 = 20.0;
/// 谷が見つからないときに使う値のパーセンタイル
pub const DEFAULT_FALLBACK_PERCENTILE: f64 = 95.0;

// =============================================================================
// ヒストグラム・パーセンタイル
// =============================================================================

/// 等幅ヒストグラム
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// ビン境界（`counts.len() + 1` 個、昇順）
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// 有限値のみから `bins` 本のヒストグラムを作る。有限値がなければ `None`。
    ///
    /// 範囲は [min, max]。min == max のときは [min - 0.5, max + 0.5] に広げる。
    /// 最後のビンだけ右端を含む。
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        let bins = bins.max(1);
        let (mut lo, mut hi) = values
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })?;
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let step = (hi - lo) / bins as f64;
        let mut edges: Vec<f64> = (0..=bins).map(|i| lo + i as f64 * step).collect();
        edges[bins] = hi;

        let mut counts = vec![0u64; bins];
        let norm = bins as f64 / (hi - lo);
        for &v in values.iter().filter(|v| v.is_finite()) {
            let mut idx = (((v - lo) * norm).floor() as usize).min(bins - 1);
            // 浮動小数の丸めで隣のビンに入るのを境界値で補正する
            if v < edges[idx] && idx > 0 {
                idx -= 1;
            } else if idx + 1 < bins && v >= edges[idx + 1] {
                idx += 1;
            }
            counts[idx] += 1;
        }
        Some(Self { edges, counts })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// `i` 番目のビンの下端
    pub fn lower_edge(&self, i: usize) -> f64 {
        self.edges[i]
    }
}

/// 線形補間のパーセンタイル（`q` は 0〜100）。昇順ソート済みの入力を取る。
pub fn percentile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// 線形補間のパーセンタイル（未ソート入力、非有限値は除外）
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    percentile_sorted(&v, q)
}

// =============================================================================
// 閾値表
// =============================================================================

/// マーカー名 → 閾値
///
/// 実行開始時に1回だけ作り、その後は読み取り専用。名前順に列挙される。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    values: BTreeMap<String, f64>,
}

impl ThresholdTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, marker: impl Into<String>, threshold: f64) -> Option<f64> {
        self.values.insert(marker.into(), threshold)
    }

    /// 完全一致で引く
    pub fn get(&self, marker: &str) -> Option<f64> {
        self.values.get(marker).copied()
    }

    /// 完全一致で引き、なければチャネル名解決規則でキーに対応付けて引く
    ///
    /// 戻り値は (実際のキー, 閾値)。
    pub fn lookup(&self, marker: &str) -> Option<(&str, f64)> {
        if let Some((k, v)) = self.values.get_key_value(marker) {
            return Some((k.as_str(), *v));
        }
        let keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        let key = channel::find_channel(marker, &keys)?;
        self.values.get_key_value(key).map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 診断用の JSON
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl FromIterator<(String, f64)> for ThresholdTable {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// 推定器
// =============================================================================

/// 自動閾値の推定器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEstimator {
    pub bins: usize,
    pub low_density_percentile: f64,
    pub fallback_percentile: f64,
}

impl Default for ThresholdEstimator {
    fn default() -> Self {
        Self {
            bins: DEFAULT_BINS,
            low_density_percentile: DEFAULT_LOW_DENSITY_PERCENTILE,
            fallback_percentile: DEFAULT_FALLBACK_PERCENTILE,
        }
    }
}

impl ThresholdEstimator {
    /// 1チャネル分の値から閾値を求める。有限値がなければ `None`。
    pub fn estimate(&self, values: &[f64]) -> Option<f64> {
        let hist = Histogram::new(values, self.bins)?;

        let mut counts: Vec<f64> = hist.counts.iter().map(|&c| c as f64).collect();
        counts.sort_by(f64::total_cmp);
        let cutoff = percentile_sorted(&counts, self.low_density_percentile)?;

        match hist.counts.iter().position(|&c| (c as f64) < cutoff) {
            Some(i) => Some(hist.lower_edge(i)),
            None => percentile(values, self.fallback_percentile),
        }
    }

    /// テーブルの全対象チャネルについて閾値表を作る
    ///
    /// 対象はパネルにあり、ignore でなく、散乱光・時間でないチャネル。
    pub fn compute(&self, table: &EventTable, panel: &Panel) -> ThresholdTable {
        let mut out = ThresholdTable::new();
        for name in table.columns() {
            if !panel.is_threshold_eligible(name) {
                continue;
            }
            let values: Vec<f64> = match table.values(name) {
                Some(v) => v.collect(),
                None => continue,
            };
            match self.estimate(&values) {
                Some(t) => {
                    log::debug!("auto-threshold {name} = {t}");
                    out.insert(name.clone(), t);
                }
                None => log::warn!("Channel '{name}' has no finite values; no threshold computed"),
            }
        }
        out
    }
}
