//! facsforge コマンドの実装（CSV 入出力とサブコマンド）

pub mod commands;
pub mod io;
