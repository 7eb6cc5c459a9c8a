//! FACSForge ゲーティング CLI
//!
//! # 使用例
//!
//! ```bash
//! # 列名から設定の雛形を作る（全チャネル ignore: true）
//! facsforge generate-config sample01.csv experiment.yaml
//!
//! # 1サンプルを解析
//! facsforge analyze sample01.csv --config experiment.yaml -o analysis_out
//!
//! # 複数サンプル（サンプルごとの出力 + merged/）
//! facsforge analyze sample01.csv sample02.csv --config experiment.yaml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use facsforge_cli::commands;

#[derive(Parser)]
#[command(
    name = "facsforge",
    version,
    about = "Hierarchical gating for flow-cytometry event tables\n\nevents CSV + experiment YAML → gated populations"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// イベント CSV をゲーティングして集団ごとに書き出す
    Analyze {
        /// イベント CSV（複数可）
        #[arg(required = true)]
        events: Vec<PathBuf>,
        /// 実験設定 YAML
        #[arg(long)]
        config: PathBuf,
        /// 出力ディレクトリ
        #[arg(short, long, default_value = "analysis_out")]
        outdir: PathBuf,
    },
    /// イベント CSV の列名から設定ファイルの雛形を作る
    GenerateConfig {
        /// 列名を読むイベント CSV
        events: PathBuf,
        /// 出力 YAML パス
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Analyze {
            events,
            config,
            outdir,
        } => commands::analyze(&events, &config, &outdir),
        Cmd::GenerateConfig { events, output } => commands::generate_config(&events, &output),
    }
}
