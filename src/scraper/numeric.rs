use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a value rendered with `.` as thousands grouping and `,` as the
/// decimal separator, e.g. `"57.482,35"` -> `57482.35`. Non-numeric residue
/// yields `None`, never a panic.
pub fn parse_grouped(text: &str) -> Option<Decimal> {
    let cleaned = text.trim().replace('.', "").replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Pull the first number token out of arbitrary surrounding text and parse
/// it, e.g. `"Dólar  36,5012 Bs."` -> `36.5012`. The token must carry a
/// fractional part; bare integers in prose are ignored.
pub fn parse_embedded(text: &str) -> Option<Decimal> {
    let token = first_number_token(text)?;
    Decimal::from_str(&normalize_token(token)).ok()
}

fn normalize_token(token: &str) -> String {
    // Both separators present means grouped rendering; a lone separator is
    // the decimal mark whichever character it is.
    if token.contains('.') && token.contains(',') {
        token.replace('.', "").replace(',', ".")
    } else {
        token.replace(',', ".")
    }
}

fn first_number_token(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != ',')
        .unwrap_or(rest.len());
    let token = rest[..end].trim_end_matches(['.', ',']);

    // require digits after the last separator, mirroring d+[.,]d+
    let has_fraction = token
        .rfind(['.', ','])
        .map(|at| at + 1 < token.len())
        .unwrap_or(false);
    has_fraction.then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn grouped_thousands_and_comma_decimal() {
        assert_eq!(parse_grouped("57.482,35"), Some(dec!(57482.35)));
        assert_eq!(parse_grouped("  36,5012  "), Some(dec!(36.5012)));
        assert_eq!(parse_grouped("1.234.567,89"), Some(dec!(1234567.89)));
    }

    #[test]
    fn grouped_rejects_non_numeric_residue() {
        assert_eq!(parse_grouped(""), None);
        assert_eq!(parse_grouped("N/A"), None);
        assert_eq!(parse_grouped("Bs. pendiente"), None);
    }

    #[test]
    fn embedded_token_in_prose() {
        assert_eq!(parse_embedded("Dólar  36,5012 Bs."), Some(dec!(36.5012)));
        assert_eq!(parse_embedded("Euro: 42.10"), Some(dec!(42.10)));
        assert_eq!(parse_embedded("USD 57.482,35 al cierre"), Some(dec!(57482.35)));
    }

    #[test]
    fn embedded_ignores_bare_integers_and_junk() {
        assert_eq!(parse_embedded("actualizado 2024"), None);
        assert_eq!(parse_embedded("sin datos"), None);
        assert_eq!(parse_embedded(""), None);
    }

    #[test]
    fn embedded_trims_trailing_punctuation() {
        assert_eq!(parse_embedded("tasa 36,50."), Some(dec!(36.50)));
    }
}
