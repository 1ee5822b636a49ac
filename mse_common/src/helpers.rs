/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a strictly positive integer, or return `None` for anything else (including zero).
pub fn parse_positive_i64(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok().filter(|v| *v > 0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some(" off ".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn positive_integers() {
        assert_eq!(parse_positive_i64("25"), Some(25));
        assert_eq!(parse_positive_i64("0"), None);
        assert_eq!(parse_positive_i64("-3"), None);
        assert_eq!(parse_positive_i64("x"), None);
    }
}
