use crate::schema::{CellValue, MonthKey};

/// Parses a month header such as "Jan", "january" or " DEC ".
pub fn parse_month_label(label: &str) -> Option<MonthKey> {
    label
        .trim()
        .parse::<chrono::Month>()
        .ok()
        .map(MonthKey::from)
}

pub fn month_from_number(number: u32) -> Option<MonthKey> {
    if !(1..=12).contains(&number) {
        return None;
    }
    MonthKey::from_index(number as usize - 1)
}

/// Classifies a raw categorical cell. Whole numbers exported as floats ("2023.0")
/// are kept as integers so year filters still match.
pub fn parse_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return CellValue::Integer(n);
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            return CellValue::Integer(f as i64);
        }
    }

    CellValue::Text(trimmed.to_string())
}

/// Parses a month amount. Accepts thousands separators, a leading currency sign
/// and accounting-style negatives "(1,234.50)". Returns `None` for blank cells and
/// `NaN` null markers; infinities are rejected.
pub fn parse_amount(raw: &str) -> Option<std::result::Result<f64, String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| *c != ',' && *c != '$' && !c.is_whitespace())
        .collect();

    if cleaned.eq_ignore_ascii_case("nan") {
        return None;
    }

    let parsed = cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| if negative { -v } else { v })
        .ok_or_else(|| format!("'{}' is not a number", raw.trim()));

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month_label_variants() {
        assert_eq!(parse_month_label("Jan"), Some(MonthKey::Jan));
        assert_eq!(parse_month_label("february"), Some(MonthKey::Feb));
        assert_eq!(parse_month_label(" DEC "), Some(MonthKey::Dec));
        assert_eq!(parse_month_label("Year"), None);
        assert_eq!(parse_month_label("Dece"), None);
    }

    #[test]
    fn test_month_from_number() {
        assert_eq!(month_from_number(1), Some(MonthKey::Jan));
        assert_eq!(month_from_number(12), Some(MonthKey::Dec));
        assert_eq!(month_from_number(0), None);
        assert_eq!(month_from_number(13), None);
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("2023"), CellValue::Integer(2023));
        assert_eq!(parse_cell("2023.0"), CellValue::Integer(2023));
        assert_eq!(parse_cell(" Sales "), CellValue::Text("Sales".to_string()));
        assert_eq!(parse_cell(""), CellValue::Empty);
        assert_eq!(parse_cell("1.5"), CellValue::Text("1.5".to_string()));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.50"), Some(Ok(1234.5)));
        assert_eq!(parse_amount("-42"), Some(Ok(-42.0)));
        assert_eq!(parse_amount("(1,000)"), Some(Ok(-1000.0)));
        assert_eq!(parse_amount("$ 12"), Some(Ok(12.0)));
        assert_eq!(parse_amount("   "), None);
        assert!(matches!(parse_amount("n/a"), Some(Err(_))));
    }

    #[test]
    fn test_parse_amount_non_finite() {
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("nan"), None);
        assert!(matches!(parse_amount("inf"), Some(Err(_))));
        assert!(matches!(parse_amount("-Infinity"), Some(Err(_))));
        assert!(matches!(parse_amount("1e400"), Some(Err(_))));
    }
}
