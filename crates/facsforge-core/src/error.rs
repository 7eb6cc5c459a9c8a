//! ゲーティングエンジンのエラー型
//!
//! 致命的なものは [`GatingError`]、ルール単位で読み飛ばすものは [`GatingWarning`] に分ける。

use std::fmt;
use std::path::PathBuf;

use crate::population::Populations;

/// ゲーティング中の致命的エラー
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GatingError {
    /// 要求されたチャネルがどの解決規則でも見つからない
    #[error("channel not found: '{requested}' (available columns: [{}])", .available.join(", "))]
    ChannelNotFound { requested: String, available: Vec<String> },

    /// gate の `type` が既知の種類ではない
    #[error("unsupported gate type '{kind}' in population '{population}'")]
    UnsupportedGateType { population: String, kind: String },

    /// gate の形が不正（チャネル数・頂点数・範囲など）
    #[error("invalid gate in population '{population}': {reason}")]
    InvalidGate { population: String, reason: String },

    /// 解決パスを使い切っても未解決の集団が残った（循環・存在しない親）
    #[error("could not resolve gating tree; unresolved: {{{}}}", .unresolved.join(", "))]
    UnresolvedDependencyGraph { unresolved: Vec<String> },

    /// 同名の集団定義が2つある
    #[error("duplicate population definition: '{0}'")]
    DuplicatePopulation(String),

    /// イベントテーブルの構築に失敗
    #[error("invalid event table: {0}")]
    InvalidTable(String),
}

/// Result type for gating operations
pub type GatingResult<T> = Result<T, GatingError>;

/// マーカー規則の向き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 実行は続行するが記録しておく事象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatingWarning {
    /// 閾値表にないマーカーが positive / negative に指定された。規則は読み飛ばされる。
    MissingThreshold { population: String, marker: String, polarity: Polarity },
}

impl fmt::Display for GatingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatingWarning::MissingThreshold { population, marker, polarity } => write!(
                f,
                "population '{population}': marker '{marker}' ({polarity}) has no auto-threshold; skipping"
            ),
        }
    }
}

/// 致命的エラーで止まった実行。止まる前に解決できた集団を保持する。
#[derive(thiserror::Error, Debug)]
#[error("{error}")]
pub struct GatingFailure {
    #[source]
    pub error: GatingError,
    /// 失敗時点までに解決済みの集団（解決順）
    pub partial: Populations,
    pub warnings: Vec<GatingWarning>,
}

/// 実験設定ファイルの読み込み・検証エラー
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("celltype '{celltype}' specifies parent '{parent}', but no such parent exists in 'celltypes'")]
    UnknownParent { celltype: String, parent: String },

    #[error("duplicate fluorochrome detected: '{fluor}' is used by both '{first}' and '{second}'")]
    DuplicateFluorochrome { fluor: String, first: String, second: String },

    #[error("'celltypes' must define at least one population")]
    NoCelltypes,

    #[error("celltypes_of_interest names undefined celltype '{0}'")]
    UnknownCelltypeOfInterest(String),

    #[error(transparent)]
    Gate(#[from] GatingError),
}
