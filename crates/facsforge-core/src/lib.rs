//! # facsforge-core
//!
//! フローサイトメトリーの階層ゲーティングエンジン。
//!
//! ## モジュール構成
//!
//! - `table`: イベントテーブル（列ストレージ共有 + 行インデックス部分集合）
//! - `channel`: 要求チャネル名 → 実列名の解決
//! - `panel`: パネル定義（蛍光色素・ignore 指定）とマーカー除去
//! - `threshold`: ヒストグラムによる自動閾値
//! - `gate`: threshold / rectangle / polygon ゲート
//! - `markers`: positive / negative マーカー規則
//! - `population`: 集団の依存グラフ解決
//! - `config`: 実験設定 YAML
//! - `pipeline`: 1サンプル分の通し処理
//!

// 基本型
pub mod error;
pub mod table;

// 解決・推定
pub mod channel;
pub mod panel;
pub mod threshold;

// 評価
pub mod gate;
pub mod markers;
pub mod population;

// 設定と通し処理
pub mod config;
pub mod pipeline;

pub use config::Experiment;
pub use error::{ConfigError, GatingError, GatingFailure, GatingResult, GatingWarning, Polarity};
pub use gate::{Gate, GateDef};
pub use panel::Panel;
pub use pipeline::{GatingReport, run_gating};
pub use population::{GatingOutcome, PopulationDef, Populations, resolve_populations};
pub use table::EventTable;
pub use threshold::{ThresholdEstimator, ThresholdTable};
