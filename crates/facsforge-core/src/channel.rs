//! チャネル名の解決
//!
//! 設定ファイルに書かれたチャネル名と、実データの列名は一致しないことがある。
//! 取得ソフトが付ける `(unmixed)` のような接尾辞や、抗体名を前置したラベル
//! (`"CD3 PE-Cy7-A"` など) を、次の順で試して実列に対応付ける。
//!
//! 1. 完全一致
//! 2. 末尾の括弧書きを除去して完全一致
//! 3. 先頭の空白区切りトークンを1つずつ落として完全一致（1トークンになるまで）
//!
//! 各段は独立した関数として公開しており、個別にテストできる。

use crate::error::{GatingError, GatingResult};

/// 完全一致
pub fn exact_match<'a, S: AsRef<str>>(name: &str, available: &'a [S]) -> Option<&'a str> {
    available.iter().map(AsRef::as_ref).find(|c| *c == name)
}

/// 末尾の括弧書き `" (...)"` を除いた名前を返す。括弧書きがなければ `None`。
///
/// `"SSC (Violet)-A"` のように括弧の後ろに文字が続くものは接尾辞とみなさない。
pub fn strip_parenthetical_suffix(name: &str) -> Option<&str> {
    let trimmed = name.trim_end();
    if !trimmed.ends_with(')') {
        return None;
    }
    let open = trimmed.rfind('(')?;
    let stripped = trimmed[..open].trim_end();
    if stripped.is_empty() { None } else { Some(stripped) }
}

/// 先頭トークンを1つずつ落とした候補列
///
/// `"Antibody Target Dye 488-A"` → `"Target Dye 488-A"`, `"Dye 488-A"`, `"488-A"`
pub fn leading_token_drops(name: &str) -> impl Iterator<Item = &str> + '_ {
    let mut rest = name.trim();
    std::iter::from_fn(move || {
        let (_, tail) = rest.split_once(char::is_whitespace)?;
        rest = tail.trim_start();
        Some(rest)
    })
}

/// 要求名を実際の列名に解決する
///
/// どの規則でも一致しなければ、要求名と全列名を含む [`GatingError::ChannelNotFound`]。
pub fn resolve_channel<S: AsRef<str>>(requested: &str, available: &[S]) -> GatingResult<String> {
    find_channel(requested, available).map(str::to_string).ok_or_else(|| {
        GatingError::ChannelNotFound {
            requested: requested.to_string(),
            available: available.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    })
}

/// [`resolve_channel`] のエラーを作らない版
pub fn find_channel<'a, S: AsRef<str>>(requested: &str, available: &'a [S]) -> Option<&'a str> {
    if let Some(hit) = exact_match(requested, available) {
        return Some(hit);
    }

    let base = strip_parenthetical_suffix(requested).unwrap_or(requested);
    if base != requested
        && let Some(hit) = exact_match(base, available)
    {
        log::debug!("channel '{requested}' resolved to '{hit}' (suffix stripped)");
        return Some(hit);
    }

    let hit = leading_token_drops(base).find_map(|candidate| exact_match(candidate, available));
    if let Some(hit) = hit {
        log::debug!("channel '{requested}' resolved to '{hit}' (leading tokens dropped)");
    }
    hit
}
