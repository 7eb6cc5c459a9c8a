//! 実験設定ファイル（YAML）
//!
//! ```yaml
//! metadata:
//!   experiment_name: pbmc_panel_a
//! panel:
//!   FSC-A: {}
//!   CD3: {fluor: FITC}
//!   Time: {ignore: true}
//! ignore_markers: [CD19]
//! compensation: {source: none}
//! celltypes:
//!   Lymphocytes:
//!     gate: {type: rectangle, channels: [FSC-A, SSC-A], vertices: [[0, 0], [100000, 100000]]}
//!   T cells:
//!     parent: Lymphocytes
//!     positive: [CD3]
//! celltypes_of_interest: [T cells]
//! ```
//!
//! 構文は serde で、意味的な検査（親の存在・蛍光色素の重複・ゲート形状）は
//! [`Experiment::validate`] で行う。

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigError, GatingResult};
use crate::gate::{Gate, GateDef};
use crate::panel::{ChannelInfo, Panel};
use crate::population::PopulationDef;

/// 実験のメタデータ（解析には使わない）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub experiment_name: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 補正行列の入手元
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompensationSource {
    #[default]
    None,
    Fcs,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compensation {
    #[serde(default)]
    pub source: CompensationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// 設定ファイル上の1集団
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CelltypeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positive: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub negative: Vec<String>,
}

/// 集団名 → 定義（ファイル上の記述順を保つ）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Celltypes(Vec<(String, CelltypeDef)>);

impl Celltypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, def: CelltypeDef) {
        self.0.push((name.into(), def));
    }

    pub fn get(&self, name: &str) -> Option<&CelltypeDef> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CelltypeDef)> {
        self.0.iter().map(|(n, d)| (n.as_str(), d))
    }
}

impl Serialize for Celltypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, def) in &self.0 {
            map.serialize_entry(name, def)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Celltypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CelltypesVisitor;

        impl<'de> Visitor<'de> for CelltypesVisitor {
            type Value = Celltypes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of cell type names to rules")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Celltypes, E> {
                Ok(Celltypes::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Celltypes, A::Error> {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, def)) = access.next_entry::<String, Option<CelltypeDef>>()? {
                    out.push((name, def.unwrap_or_default()));
                }
                Ok(Celltypes(out))
            }
        }

        deserializer.deserialize_any(CelltypesVisitor)
    }
}

/// 実験設定全体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub panel: Panel,
    #[serde(default)]
    pub ignore_markers: Vec<String>,
    #[serde(default)]
    pub compensation: Compensation,
    #[serde(default)]
    pub celltypes: Celltypes,
    #[serde(default)]
    pub celltypes_of_interest: Vec<String>,
}

impl Experiment {
    /// ファイルから読み込んで検証する
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let experiment = Self::from_yaml_str(&text)?;
        log::info!(
            "Loaded experiment '{}' from {} ({} channels, {} celltypes)",
            experiment.metadata.experiment_name,
            path.display(),
            experiment.panel.len(),
            experiment.celltypes.len()
        );
        Ok(experiment)
    }

    /// 文字列から読み込んで検証する
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let experiment: Experiment = serde_yaml::from_str(text)?;
        experiment.validate()?;
        Ok(experiment)
    }

    /// 意味的な検査
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.panel.validate()?;

        if self.celltypes.is_empty() {
            return Err(ConfigError::NoCelltypes);
        }
        for (name, def) in self.celltypes.iter() {
            if let Some(parent) = def.parent.as_deref()
                && !self.celltypes.contains(parent)
            {
                return Err(ConfigError::UnknownParent {
                    celltype: name.to_string(),
                    parent: parent.to_string(),
                });
            }
            if let Some(gate) = &def.gate {
                Gate::from_def(gate, name)?;
            }
        }
        if let Some(missing) =
            self.celltypes_of_interest.iter().find(|c| !self.celltypes.contains(c))
        {
            return Err(ConfigError::UnknownCelltypeOfInterest(missing.clone()));
        }
        Ok(())
    }

    /// パネルに `ignore_markers` を反映したもの
    pub fn effective_panel(&self) -> Panel {
        let mut panel = self.panel.clone();
        panel.mark_ignored(self.ignore_markers.iter().map(String::as_str));
        panel
    }

    /// エンジンに渡す集団定義（記述順）
    pub fn population_defs(&self) -> GatingResult<Vec<PopulationDef>> {
        self.celltypes
            .iter()
            .map(|(name, def)| {
                let gate = def.gate.as_ref().map(|g| Gate::from_def(g, name)).transpose()?;
                Ok(PopulationDef {
                    name: name.to_string(),
                    parent: def.parent.clone(),
                    gate,
                    positive: def.positive.clone(),
                    negative: def.negative.clone(),
                })
            })
            .collect()
    }

    /// 集団の出力対象。`celltypes_of_interest` が空なら全集団。
    pub fn is_of_interest(&self, name: &str) -> bool {
        self.celltypes_of_interest.is_empty() || self.celltypes_of_interest.iter().any(|c| c == name)
    }

    /// 列名一覧から雛形を作る。全チャネルを ignore にし、集団は空にする。
    pub fn skeleton<S: AsRef<str>>(experiment_name: &str, columns: &[S]) -> Self {
        let panel = columns
            .iter()
            .map(|c| {
                let info = ChannelInfo {
                    ignore: true,
                    ..ChannelInfo::default()
                };
                (c.as_ref().to_string(), info)
            })
            .collect();
        Self {
            metadata: Metadata {
                experiment_name: experiment_name.to_string(),
                ..Metadata::default()
            },
            panel,
            ..Self::default()
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
