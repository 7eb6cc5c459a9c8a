//! ゲート定義と評価
//!
//! 設定ファイル上のゲートは自由文字列の `type` を持つ [`GateDef`]。
//! これを検証して和型 [`Gate`] に変換し、評価は `match` で分岐する。
//! 境界上のイベントはすべてのゲートで「内側」として扱う。

use serde::{Deserialize, Serialize};

use crate::channel::resolve_channel;
use crate::error::{GatingError, GatingResult};
use crate::table::EventTable;

// =============================================================================
// 設定ファイル上の表現
// =============================================================================

/// 設定ファイルに書かれたままのゲート
///
/// ```yaml
/// gate:
///   type: polygon
///   channels: [FSC-A, SSC-A]
///   vertices: [[0, 0], [100000, 0], [50000, 80000]]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateDef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vertices: Vec<[f64; 2]>,
}

// =============================================================================
// 幾何
// =============================================================================

/// 2次元の点 (x, y)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Point { x, y }
    }
}

/// 軸平行な矩形（境界を含む）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rect {
    /// 頂点群の min/max から作る。頂点の順序・重複は結果に影響しない。
    pub fn bounding(vertices: &[Point]) -> Option<Rect> {
        let first = vertices.first()?;
        let init = Rect {
            x_min: first.x,
            x_max: first.x,
            y_min: first.y,
            y_max: first.y,
        };
        Some(vertices[1..].iter().fold(init, |r, p| Rect {
            x_min: r.x_min.min(p.x),
            x_max: r.x_max.max(p.x),
            y_min: r.y_min.min(p.y),
            y_max: r.y_max.max(p.y),
        }))
    }

    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x_min <= x && x <= self.x_max && self.y_min <= y && y <= self.y_max
    }
}

/// 単純多角形（頂点順に辺を結び、最後の頂点から最初に戻る）
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    /// 3頂点未満なら `None`
    pub fn new(vertices: Vec<Point>) -> Option<Self> {
        (vertices.len() >= 3).then_some(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[(i + n - 1) % n], self.vertices[i]))
    }

    /// 点が辺または頂点の上にあるか
    pub fn on_boundary(&self, x: f64, y: f64) -> bool {
        self.edges().any(|(a, b)| on_segment(a, b, x, y))
    }

    /// 内部（偶奇規則）または境界上なら true
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        if self.on_boundary(x, y) {
            return true;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > y) != (b.y > y) {
                let x_cross = (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x;
                if x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// 点 (x, y) が線分 ab 上にあるか
fn on_segment(a: Point, b: Point, x: f64, y: f64) -> bool {
    let within = a.x.min(b.x) <= x && x <= a.x.max(b.x) && a.y.min(b.y) <= y && y <= a.y.max(b.y);
    if !within {
        return false;
    }
    let cross = (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x);
    // 座標スケールに比例した許容誤差
    let scale = (b.x - a.x).abs().max((b.y - a.y).abs()).max(1.0);
    cross.abs() <= f64::EPSILON * 16.0 * scale * scale
}

// =============================================================================
// ゲート
// =============================================================================

/// 検証済みのゲート
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// 1チャネルの閉区間 [min, max]。省略側は無限大。
    Threshold {
        channel: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// 2チャネル (x, y) の軸平行矩形
    Rectangle { x: String, y: String, rect: Rect },
    /// 2チャネル (x, y) の多角形
    Polygon {
        x: String,
        y: String,
        polygon: Polygon,
    },
}

impl Gate {
    /// 設定上の定義を検証して変換する
    ///
    /// `type` が未知なら [`GatingError::UnsupportedGateType`]、
    /// 形が不正なら [`GatingError::InvalidGate`]。
    pub fn from_def(def: &GateDef, population: &str) -> GatingResult<Gate> {
        let invalid = |reason: String| GatingError::InvalidGate {
            population: population.to_string(),
            reason,
        };

        match def.kind.as_str() {
            "threshold" => {
                let channel = match (&def.channel, def.channels.as_slice()) {
                    (Some(ch), _) => ch.clone(),
                    (None, [ch]) => ch.clone(),
                    (None, _) => {
                        return Err(invalid("threshold gate requires exactly one channel".into()));
                    }
                };
                if def.min.is_some_and(f64::is_nan) || def.max.is_some_and(f64::is_nan) {
                    return Err(invalid("threshold bounds must not be NaN".into()));
                }
                if let (Some(lo), Some(hi)) = (def.min, def.max)
                    && lo > hi
                {
                    return Err(invalid(format!("min ({lo}) is greater than max ({hi})")));
                }
                Ok(Gate::Threshold {
                    channel,
                    min: def.min,
                    max: def.max,
                })
            }
            "rectangle" | "polygon" => {
                let [x, y] = def.channels.as_slice() else {
                    return Err(invalid(format!(
                        "{} gate requires two channels, got {}",
                        def.kind,
                        def.channels.len()
                    )));
                };
                if def.vertices.iter().flatten().any(|v| !v.is_finite()) {
                    return Err(invalid("gate vertices must be finite".into()));
                }
                let vertices: Vec<Point> = def.vertices.iter().copied().map(Point::from).collect();
                if def.kind == "rectangle" {
                    if vertices.len() < 2 {
                        return Err(invalid(format!(
                            "rectangle gate requires at least 2 vertices, got {}",
                            vertices.len()
                        )));
                    }
                    let rect = Rect::bounding(&vertices)
                        .ok_or_else(|| invalid("rectangle gate has no vertices".into()))?;
                    Ok(Gate::Rectangle {
                        x: x.clone(),
                        y: y.clone(),
                        rect,
                    })
                } else {
                    let n = vertices.len();
                    let polygon = Polygon::new(vertices).ok_or_else(|| {
                        invalid(format!("polygon gate requires at least 3 vertices, got {n}"))
                    })?;
                    Ok(Gate::Polygon {
                        x: x.clone(),
                        y: y.clone(),
                        polygon,
                    })
                }
            }
            other => Err(GatingError::UnsupportedGateType {
                population: population.to_string(),
                kind: other.to_string(),
            }),
        }
    }

    /// ゲートの種類名
    pub fn kind(&self) -> &'static str {
        match self {
            Gate::Threshold { .. } => "threshold",
            Gate::Rectangle { .. } => "rectangle",
            Gate::Polygon { .. } => "polygon",
        }
    }

    /// 参照するチャネル名（x, y の順）
    pub fn channels(&self) -> Vec<&str> {
        match self {
            Gate::Threshold { channel, .. } => vec![channel.as_str()],
            Gate::Rectangle { x, y, .. } | Gate::Polygon { x, y, .. } => vec![x.as_str(), y.as_str()],
        }
    }

    /// 親テーブルにゲートを適用し、通過した行だけのテーブルを返す
    ///
    /// チャネル名は [`resolve_channel`] で実列に解決する。非有限値の行は通過しない。
    pub fn apply(&self, table: &EventTable, population: &str) -> GatingResult<EventTable> {
        let column = |name: &str| -> GatingResult<usize> {
            let resolved = resolve_channel(name, table.columns())?;
            table
                .column_index(&resolved)
                .ok_or_else(|| GatingError::ChannelNotFound {
                    requested: name.to_string(),
                    available: table.columns().to_vec(),
                })
        };

        let out = match self {
            Gate::Threshold { channel, min, max } => {
                let c = column(channel)?;
                let lo = min.unwrap_or(f64::NEG_INFINITY);
                let hi = max.unwrap_or(f64::INFINITY);
                table.select(|row| {
                    let v = row.get(c);
                    v.is_finite() && lo <= v && v <= hi
                })
            }
            Gate::Rectangle { x, y, rect } => {
                let (cx, cy) = (column(x)?, column(y)?);
                table.select(|row| rect.contains(row.get(cx), row.get(cy)))
            }
            Gate::Polygon { x, y, polygon } => {
                let (cx, cy) = (column(x)?, column(y)?);
                table.select(|row| polygon.contains(row.get(cx), row.get(cy)))
            }
        };

        log::debug!(
            "[{population}] {} gate on [{}]: {} -> {} events",
            self.kind(),
            self.channels().join(", "),
            table.len(),
            out.len()
        );
        Ok(out)
    }
}
