use crate::config::QUOTE_PAGE_BASE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeTone {
    Up,
    Down,
    Flat,
}

/// Intensity buckets used for the small history chips.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeBand {
    StrongUp,
    Up,
    MildUp,
    Flat,
    MildDown,
    Down,
    StrongDown,
}

/// `1234567.5` -> `"1,234,567.5"`. At most three fraction digits, like ko-KR locale output.
pub fn format_price(price: f64) -> String {
    if !price.is_finite() {
        return "-".to_string();
    }

    let fixed = format!("{:.3}", price.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::new();
    if price < 0.0 && (int_part != "0" || !frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_volume(volume: u64) -> String {
    if volume >= 1_000_000 {
        format!("{:.1}M", volume as f64 / 1_000_000.0)
    } else if volume >= 1_000 {
        format!("{}K", volume / 1_000)
    } else {
        volume.to_string()
    }
}

/// Fixed two decimals with an explicit `+` on gains: `"+3.25%"`, `"-1.10%"`, `"0.00%"`.
pub fn format_change_rate(rate: f64) -> String {
    let sign = if rate > 0.0 { "+" } else { "" };
    format!("{}{:.2}%", sign, rate)
}

/// Compact signed return, trailing zeros dropped: `2.5` -> `"+2.5%"`, `-3.0` -> `"-3%"`.
pub fn format_return(ret: f64) -> String {
    let sign = if ret > 0.0 { "+" } else { "" };
    let body = format!("{:.2}", ret);
    let body = if body.contains('.') {
        body.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        body
    };
    format!("{}{}%", sign, body)
}

pub fn change_tone(rate: f64) -> ChangeTone {
    if rate > 0.0 {
        ChangeTone::Up
    } else if rate < 0.0 {
        ChangeTone::Down
    } else {
        ChangeTone::Flat
    }
}

pub fn change_band(rate: f64) -> ChangeBand {
    if rate >= 10.0 {
        ChangeBand::StrongUp
    } else if rate >= 5.0 {
        ChangeBand::Up
    } else if rate > 0.0 {
        ChangeBand::MildUp
    } else if rate <= -10.0 {
        ChangeBand::StrongDown
    } else if rate <= -5.0 {
        ChangeBand::Down
    } else if rate < 0.0 {
        ChangeBand::MildDown
    } else {
        ChangeBand::Flat
    }
}

pub fn quote_url(code: &str) -> String {
    format!("{}/{}/total", QUOTE_PAGE_BASE, code.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price_groups_thousands() {
        assert_eq!(format_price(0.0), "0");
        assert_eq!(format_price(950.0), "950");
        assert_eq!(format_price(71_500.0), "71,500");
        assert_eq!(format_price(1_234_567.0), "1,234,567");
        assert_eq!(format_price(1_234.5), "1,234.5");
        assert_eq!(format_price(-12_000.25), "-12,000.25");
        assert_eq!(format_price(1.23456), "1.235");
    }

    #[test]
    fn test_format_volume_units() {
        assert_eq!(format_volume(999), "999");
        assert_eq!(format_volume(1_000), "1K");
        assert_eq!(format_volume(45_999), "45K");
        assert_eq!(format_volume(1_000_000), "1.0M");
        assert_eq!(format_volume(12_345_678), "12.3M");
    }

    #[test]
    fn test_change_rate_sign() {
        assert_eq!(format_change_rate(3.254), "+3.25%");
        assert_eq!(format_change_rate(-1.1), "-1.10%");
        assert_eq!(format_change_rate(0.0), "0.00%");
    }

    #[test]
    fn test_format_return_is_compact() {
        assert_eq!(format_return(2.5), "+2.5%");
        assert_eq!(format_return(-3.0), "-3%");
        assert_eq!(format_return(0.0), "0%");
        assert_eq!(format_return(1.234), "+1.23%");
    }

    #[test]
    fn test_change_band_edges() {
        assert_eq!(change_band(10.0), ChangeBand::StrongUp);
        assert_eq!(change_band(5.0), ChangeBand::Up);
        assert_eq!(change_band(0.01), ChangeBand::MildUp);
        assert_eq!(change_band(0.0), ChangeBand::Flat);
        assert_eq!(change_band(-0.5), ChangeBand::MildDown);
        assert_eq!(change_band(-5.0), ChangeBand::Down);
        assert_eq!(change_band(-10.0), ChangeBand::StrongDown);
        assert_eq!(change_tone(-0.1), ChangeTone::Down);
    }

    #[test]
    fn test_quote_url() {
        assert_eq!(
            quote_url("005930"),
            "https://m.stock.naver.com/domestic/stock/005930/total"
        );
    }
}
