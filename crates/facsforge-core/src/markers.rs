//! positive / negative マーカー規則

use crate::channel::resolve_channel;
use crate::error::{GatingError, GatingResult, GatingWarning, Polarity};
use crate::table::EventTable;
use crate::threshold::ThresholdTable;

/// マーカー規則を順に適用して絞り込む
///
/// - positive: 値 > 閾値 の行を残す
/// - negative: 値 <= 閾値 の行を残す
///
/// positive を宣言順に、続いて negative を宣言順に適用する。各規則は行数を増やさない。
/// 閾値表にないマーカーはその規則だけを読み飛ばし、`warnings` に記録する。
/// 列そのものが見つからない場合は [`GatingError::ChannelNotFound`]。
pub fn apply_marker_rules(
    table: &EventTable,
    population: &str,
    positive: &[String],
    negative: &[String],
    thresholds: &ThresholdTable,
    warnings: &mut Vec<GatingWarning>,
) -> GatingResult<EventTable> {
    let rules = positive
        .iter()
        .map(|m| (m, Polarity::Positive))
        .chain(negative.iter().map(|m| (m, Polarity::Negative)));

    let mut subset = table.clone();
    for (marker, polarity) in rules {
        let Some((key, threshold)) = thresholds.lookup(marker) else {
            let warning = GatingWarning::MissingThreshold {
                population: population.to_string(),
                marker: marker.clone(),
                polarity,
            };
            log::warn!("{warning}");
            warnings.push(warning);
            continue;
        };

        // 閾値のキーは実列名なので、まずそれで引き、駄目なら要求名から解決する
        let col = match subset.column_index(key) {
            Some(c) => c,
            None => {
                let resolved = resolve_channel(marker, subset.columns())?;
                subset.column_index(&resolved).ok_or_else(|| GatingError::ChannelNotFound {
                    requested: marker.clone(),
                    available: subset.columns().to_vec(),
                })?
            }
        };

        let before = subset.len();
        subset = match polarity {
            Polarity::Positive => subset.select(|row| row.get(col) > threshold),
            Polarity::Negative => subset.select(|row| row.get(col) <= threshold),
        };
        log::debug!(
            "[{population}] {marker} {polarity} (threshold {threshold}): {before} -> {} events",
            subset.len()
        );
    }
    Ok(subset)
}
