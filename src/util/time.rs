use chrono::{DateTime, Datelike, Utc};

/// 日付の序数接尾辞（1st, 2nd, 3rd, 11th ...）を返す。
pub(crate) fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// `July 20th` 形式の表示用日付。
pub(crate) fn long_date_label(date: DateTime<Utc>) -> String {
    format!(
        "{}{}",
        date.format("%B %-d"),
        ordinal_suffix(date.day())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(1, "st")]
    #[case(2, "nd")]
    #[case(3, "rd")]
    #[case(4, "th")]
    #[case(11, "th")]
    #[case(12, "th")]
    #[case(13, "th")]
    #[case(21, "st")]
    #[case(22, "nd")]
    #[case(23, "rd")]
    #[case(30, "th")]
    #[case(31, "st")]
    fn ordinal_suffix_matches_english_rules(#[case] day: u32, #[case] expected: &str) {
        assert_eq!(ordinal_suffix(day), expected);
    }

    #[test]
    fn long_date_label_drops_zero_padding() {
        let date = Utc.with_ymd_and_hms(2023, 8, 2, 17, 0, 0).unwrap();
        assert_eq!(long_date_label(date), "August 2nd");
    }
}
