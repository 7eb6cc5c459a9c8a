//! イベントテーブル
//!
//! 列ごとの `f64` 値を `Arc` で共有し、各テーブルは「どの行を含むか」だけを持つ。
//! ゲートを通すたびに行インデックスの部分集合を持つ新しいテーブルができ、親は変更されない。

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GatingError, GatingResult};

/// 列データ本体（全行）
#[derive(Debug)]
struct ColumnStore {
    names: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<f64>>,
    n_rows: usize,
}

impl ColumnStore {
    fn new(names: Vec<String>, columns: Vec<Vec<f64>>) -> GatingResult<Self> {
        if names.len() != columns.len() {
            return Err(GatingError::InvalidTable(format!(
                "{} column names but {} columns",
                names.len(),
                columns.len()
            )));
        }
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(GatingError::InvalidTable(format!("duplicate column name '{name}'")));
            }
        }
        let n_rows = columns.first().map_or(0, Vec::len);
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != n_rows) {
            return Err(GatingError::InvalidTable(format!(
                "column '{}' has {} values, expected {}",
                names[i],
                col.len(),
                n_rows
            )));
        }
        Ok(Self {
            names,
            index,
            columns,
            n_rows,
        })
    }
}

/// 1細胞 = 1行の測定値テーブル
///
/// `Clone` は `Arc` のコピーだけで済む。
#[derive(Debug, Clone)]
pub struct EventTable {
    store: Arc<ColumnStore>,
    /// 元テーブルでの行番号（昇順）
    rows: Arc<[usize]>,
}

impl EventTable {
    /// 列名と列ごとの値から作る
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> GatingResult<Self> {
        let store = ColumnStore::new(names, columns)?;
        let rows: Arc<[usize]> = (0..store.n_rows).collect();
        Ok(Self {
            store: Arc::new(store),
            rows,
        })
    }

    /// 列名と行ごとの値から作る
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<f64>>) -> GatingResult<Self> {
        let width = names.len();
        let mut columns = vec![Vec::with_capacity(rows.len()); width];
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(GatingError::InvalidTable(format!(
                    "row {r} has {} values, expected {width}",
                    row.len()
                )));
            }
            for (c, v) in row.into_iter().enumerate() {
                columns[c].push(v);
            }
        }
        Self::from_columns(names, columns)
    }

    /// 列名（取得順）
    pub fn columns(&self) -> &[String] {
        &self.store.names
    }

    pub fn n_columns(&self) -> usize {
        self.store.names.len()
    }

    /// 行数
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 列名から列番号
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.store.index.get(name).copied()
    }

    /// 元テーブルでの行番号
    pub fn row_ids(&self) -> &[usize] {
        &self.rows
    }

    /// 指定列の値（このテーブルに含まれる行のみ、行順）
    pub fn values(&self, name: &str) -> Option<impl Iterator<Item = f64> + '_> {
        let col = &self.store.columns[self.column_index(name)?];
        Some(self.rows.iter().map(move |&r| col[r]))
    }

    /// `pos` 番目の行
    pub fn row(&self, pos: usize) -> Option<RowView<'_>> {
        self.rows.get(pos).map(|&row| RowView {
            store: &self.store,
            row,
        })
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        self.rows.iter().map(|&row| RowView {
            store: &self.store,
            row,
        })
    }

    /// `keep` が true を返す行だけを含む新しいテーブルを返す
    pub fn select<F>(&self, mut keep: F) -> EventTable
    where
        F: FnMut(RowView<'_>) -> bool,
    {
        let rows: Arc<[usize]> = self
            .rows
            .iter()
            .copied()
            .filter(|&row| {
                keep(RowView {
                    store: &self.store,
                    row,
                })
            })
            .collect();
        EventTable {
            store: Arc::clone(&self.store),
            rows,
        }
    }

    /// `keep` に含まれる列だけを持つテーブルを作る（列順は元の順）
    ///
    /// 列データは複製される。ルート段階での列落としに使う。
    pub fn retain_columns<F>(&self, mut keep: F) -> EventTable
    where
        F: FnMut(&str) -> bool,
    {
        let (names, columns): (Vec<String>, Vec<Vec<f64>>) = self
            .store
            .names
            .iter()
            .zip(&self.store.columns)
            .filter(|(name, _)| keep(name.as_str()))
            .map(|(name, col)| (name.clone(), col.clone()))
            .unzip();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.insert(name.clone(), i);
        }
        EventTable {
            store: Arc::new(ColumnStore {
                names,
                index,
                columns,
                n_rows: self.store.n_rows,
            }),
            rows: Arc::clone(&self.rows),
        }
    }

    /// 同じ列データを共有しているか
    pub fn shares_storage_with(&self, other: &EventTable) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

/// テーブルの1行への参照
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    store: &'a ColumnStore,
    row: usize,
}

impl RowView<'_> {
    /// 列番号で値を取る
    #[inline]
    pub fn get(&self, col: usize) -> f64 {
        self.store.columns[col][self.row]
    }

    /// 元テーブルでの行番号
    #[inline]
    pub fn id(&self) -> usize {
        self.row
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.store.columns.iter().map(|c| c[self.row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_rows_and_values() {
        let t = EventTable::from_rows(
            names(&["FSC-A", "CD3"]),
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]],
        )
        .unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.n_columns(), 2);
        assert_eq!(t.values("CD3").unwrap().collect::<Vec<_>>(), vec![10.0, 20.0, 30.0]);
        assert!(t.values("CD4").is_none());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = EventTable::from_columns(names(&["A", "A"]), vec![vec![], vec![]]).unwrap_err();
        assert!(matches!(err, GatingError::InvalidTable(_)));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = EventTable::from_rows(names(&["A", "B"]), vec![vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("row 0"));
    }

    #[test]
    fn test_select_is_nested_and_shares_storage() {
        let t = EventTable::from_columns(names(&["X"]), vec![vec![5.0, 1.0, 7.0, 3.0]]).unwrap();
        let big = t.select(|r| r.get(0) > 2.0);
        assert_eq!(big.row_ids(), &[0, 2, 3]);
        let bigger = big.select(|r| r.get(0) > 4.0);
        assert_eq!(bigger.row_ids(), &[0, 2]);
        assert!(bigger.shares_storage_with(&t));
        // 親は変わらない
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn test_row_keeps_original_id() {
        let t = EventTable::from_columns(names(&["X", "Y"]), vec![vec![5.0, 1.0, 7.0], vec![0.5, 0.1, 0.7]])
            .unwrap();
        let sub = t.select(|r| r.get(0) > 2.0);
        let second = sub.row(1).unwrap();
        assert_eq!(second.id(), 2);
        assert_eq!(second.values().collect::<Vec<_>>(), vec![7.0, 0.7]);
        assert_eq!(sub.row(0).map(|r| r.id()), Some(0));
        assert!(sub.row(2).is_none());
    }

    #[test]
    fn test_retain_columns_keeps_rows() {
        let t = EventTable::from_columns(names(&["A", "B", "C"]), vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])
            .unwrap();
        let sub = t.select(|r| r.get(0) > 1.5);
        let dropped = sub.retain_columns(|n| n != "B");
        assert_eq!(dropped.columns(), &names(&["A", "C"])[..]);
        assert_eq!(dropped.row_ids(), &[1]);
        assert_eq!(dropped.values("C").unwrap().collect::<Vec<_>>(), vec![6.0]);
    }
}
