use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// 未確定を表すシートのセンチネル値。
pub const UNDECIDED_SENTINEL: &str = "TBC";

/// ある日付のロストセクター。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    pub location: Option<String>,
    pub shortlink: Option<String>,
    pub reward: Option<String>,
    pub champions: Vec<String>,
    pub shields: Vec<String>,
    pub burn: Option<String>,
    pub modifiers: Vec<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("rotation lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("rotation source unavailable")]
    Unavailable(#[source] anyhow::Error),
}

/// 日付からその日のローテーションを引く。
///
/// `Ok(None)` は未確定（TBC）を表し、エラーではない。
#[async_trait]
pub trait RotationOracle: Send + Sync {
    async fn lookup(&self, date: NaiveDate) -> Result<Option<Sector>, OracleError>;
}

/// 日付ごとのローテーション表。`None` は未確定の行。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationTable {
    rows: BTreeMap<NaiveDate, Option<Sector>>,
}

impl RotationTable {
    #[must_use]
    pub fn new(rows: BTreeMap<NaiveDate, Option<Sector>>) -> Self {
        Self { rows }
    }

    /// シートの行（文字列セル）から表を組み立てる。
    ///
    /// 列順: date, name, location, shortlink, reward, champions, shields, burn, modifiers, image。
    /// 日付を解釈できない行は読み飛ばす。
    #[must_use]
    pub fn from_sheet_rows(values: &[Vec<String>]) -> Self {
        let mut rows = BTreeMap::new();

        for (index, row) in values.iter().enumerate() {
            let raw_date = cell(row, 0);
            let Some(raw_date) = raw_date else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d") else {
                warn!(row = index, value = raw_date, "skipping rotation row with unparsable date");
                continue;
            };

            rows.insert(date, parse_sector(row));
        }

        Self { rows }
    }

    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&Sector> {
        self.rows.get(&date).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RotationOracle for RotationTable {
    async fn lookup(&self, date: NaiveDate) -> Result<Option<Sector>, OracleError> {
        Ok(self.get(date).cloned())
    }
}

fn parse_sector(row: &[String]) -> Option<Sector> {
    let name = cell(row, 1)?;
    if name.eq_ignore_ascii_case(UNDECIDED_SENTINEL) {
        return None;
    }

    Some(Sector {
        name: name.to_string(),
        location: cell(row, 2).map(str::to_string),
        shortlink: cell(row, 3).map(str::to_string),
        reward: cell(row, 4).map(str::to_string),
        champions: list_cell(row, 5),
        shields: list_cell(row, 6),
        burn: cell(row, 7).map(str::to_string),
        modifiers: list_cell(row, 8),
        image_url: cell(row, 9).map(str::to_string),
    })
}

fn cell(row: &[String], index: usize) -> Option<&str> {
    row.get(index)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn list_cell(row: &[String], index: usize) -> Vec<String> {
    cell(row, index)
        .map(|value| {
            value
                .split(';')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
