use std::{collections::BTreeMap, sync::Arc};

use super::{error::WindowError, page::Page, period::DateKey};

/// ある時点のページ集合のスナップショット。構築後は変更されない。
///
/// キーは `today-(history_len-1) ..= today+lookahead_len` の連続区間を隙間なく覆う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    today: DateKey,
    history_len: usize,
    lookahead_len: usize,
    pages: BTreeMap<DateKey, Arc<Page>>,
}

impl Window {
    pub(crate) fn new(
        today: DateKey,
        history_len: usize,
        lookahead_len: usize,
        pages: BTreeMap<DateKey, Arc<Page>>,
    ) -> Self {
        debug_assert_eq!(pages.len(), history_len + lookahead_len);
        Self {
            today,
            history_len,
            lookahead_len,
            pages,
        }
    }

    #[must_use]
    pub fn today(&self) -> DateKey {
        self.today
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    #[must_use]
    pub fn lookahead_len(&self) -> usize {
        self.lookahead_len
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// 最も古い履歴キー。
    #[must_use]
    pub fn first_key(&self) -> DateKey {
        history_start(self.today, self.history_len)
    }

    /// 最も先の先読みキー。
    #[must_use]
    pub fn last_key(&self) -> DateKey {
        lookahead_end(self.today, self.lookahead_len)
    }

    #[must_use]
    pub fn contains(&self, key: DateKey) -> bool {
        self.pages.contains_key(&key)
    }

    #[must_use]
    pub fn get(&self, key: DateKey) -> Option<&Arc<Page>> {
        self.pages.get(&key)
    }

    /// キー順のイテレータ。
    pub fn iter(&self) -> impl Iterator<Item = (DateKey, &Arc<Page>)> {
        self.pages.iter().map(|(key, page)| (*key, page))
    }

    /// 今日を0とした相対位置のページ。
    ///
    /// # Errors
    /// 範囲外の場合は [`WindowError::OutOfWindow`] を返す。範囲内に丸めることはしない。
    pub fn page_at(&self, offset: i64) -> Result<Arc<Page>, WindowError> {
        let out_of_window = || WindowError::OutOfWindow {
            offset,
            history_len: self.history_len,
            lookahead_len: self.lookahead_len,
        };

        let oldest = -(len_as_i64(self.history_len) - 1);
        if offset < oldest || offset > len_as_i64(self.lookahead_len) {
            return Err(out_of_window());
        }

        self.pages
            .get(&self.today.offset(offset))
            .cloned()
            .ok_or_else(out_of_window)
    }
}

pub(crate) fn history_start(today: DateKey, history_len: usize) -> DateKey {
    today.offset(-(len_as_i64(history_len) - 1))
}

pub(crate) fn lookahead_end(today: DateKey, lookahead_len: usize) -> DateKey {
    today.offset(len_as_i64(lookahead_len))
}

fn len_as_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(today: i64, history_len: usize, lookahead_len: usize) -> Window {
        let today = DateKey::new(today);
        let pages = (history_start(today, history_len).index()
            ..=lookahead_end(today, lookahead_len).index())
            .map(|index| {
                let page = Page {
                    title: format!("page {index}"),
                    ..Page::default()
                };
                (DateKey::new(index), Arc::new(page))
            })
            .collect();
        Window::new(today, history_len, lookahead_len, pages)
    }

    #[test]
    fn page_at_resolves_relative_offsets() {
        let window = window(100, 3, 2);

        assert_eq!(window.page_at(0).unwrap().title, "page 100");
        assert_eq!(window.page_at(-2).unwrap().title, "page 98");
        assert_eq!(window.page_at(2).unwrap().title, "page 102");
        assert_eq!(window.first_key(), DateKey::new(98));
        assert_eq!(window.last_key(), DateKey::new(102));
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn page_at_rejects_offsets_outside_bounds() {
        let window = window(0, 3, 2);

        let error = window.page_at(-3).expect_err("too old");
        assert!(error.is_out_of_window());
        assert!(window.page_at(3).expect_err("too far").is_out_of_window());
    }
}
