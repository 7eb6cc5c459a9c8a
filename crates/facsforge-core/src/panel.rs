//! パネル（チャネル → 蛍光色素・役割・無視フラグ）

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::table::EventTable;

/// パネル上の1チャネルの情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub fluor: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub ignore: bool,
}

/// 散乱光・時間チャネルの接頭辞（大文字小文字は区別しない）
const NON_MARKER_PREFIXES: &[&str] = &["FSC", "SSC", "TIME"];

/// 散乱光 (FSC/SSC) または時間チャネルか
pub fn is_scatter_or_time(channel: &str) -> bool {
    let upper = channel.trim_start().to_ascii_uppercase();
    NON_MARKER_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// チャネル名 → [`ChannelInfo`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Panel {
    channels: BTreeMap<String, ChannelInfo>,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: impl Into<String>, info: ChannelInfo) -> Option<ChannelInfo> {
        self.channels.insert(channel.into(), info)
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelInfo> {
        self.channels.get(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelInfo)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// パネルで ignore 指定されているか（パネル外は false）
    pub fn is_ignored(&self, channel: &str) -> bool {
        self.channels.get(channel).is_some_and(|c| c.ignore)
    }

    /// 追加の ignore 指定を反映する。パネルにない名前はそのまま ignore 付きで登録する。
    pub fn mark_ignored<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.channels.entry(name.to_string()).or_default().ignore = true;
        }
    }

    /// 自動閾値の対象か: パネルにあり、ignore でなく、散乱光・時間でもない
    pub fn is_threshold_eligible(&self, channel: &str) -> bool {
        match self.channels.get(channel) {
            Some(info) => !info.ignore && !is_scatter_or_time(channel),
            None => false,
        }
    }

    /// 1つの蛍光色素が2つのチャネルに割り当てられていないかを検査する
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut used: BTreeMap<&str, &str> = BTreeMap::new();
        for (channel, info) in &self.channels {
            let Some(fluor) = info.fluor.as_deref() else {
                continue;
            };
            match used.entry(fluor) {
                Entry::Occupied(first) => {
                    return Err(ConfigError::DuplicateFluorochrome {
                        fluor: fluor.to_string(),
                        first: first.get().to_string(),
                        second: channel.clone(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(channel);
                }
            }
        }
        Ok(())
    }

    /// ignore 指定の列を落としたテーブルを返す。パネル外の列は残す。
    pub fn drop_ignored(&self, table: &EventTable) -> EventTable {
        let dropped: Vec<&str> =
            table.columns().iter().map(String::as_str).filter(|c| self.is_ignored(c)).collect();
        if dropped.is_empty() {
            return table.clone();
        }
        log::info!("Dropping {} ignored channel(s): {}", dropped.len(), dropped.join(", "));
        table.retain_columns(|c| !self.is_ignored(c))
    }
}

impl FromIterator<(String, ChannelInfo)> for Panel {
    fn from_iter<I: IntoIterator<Item = (String, ChannelInfo)>>(iter: I) -> Self {
        Self {
            channels: iter.into_iter().collect(),
        }
    }
}
