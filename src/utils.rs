use std::time::Duration;

/// Parses a duration such as "30s", "10m", "2h" or "1d".
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let Some(unit) = s.chars().last() else {
        return Err("Duration string cannot be empty".to_string());
    };

    let digits = &s[..s.len() - unit.len_utf8()];
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid numeric value in duration: '{}'", digits))?;

    let seconds_per_unit = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        other => {
            return Err(format!(
                "Unknown duration unit: '{}'. Use 's', 'm', 'h', or 'd'.",
                other
            ))
        }
    };

    let seconds = value
        .checked_mul(seconds_per_unit)
        .ok_or_else(|| format!("Invalid numeric value in duration: '{}' is too large", digits))?;

    Ok(Duration::from_secs(seconds))
}

/// Parses a boolean flag value ("true"/"false", "1"/"0", "yes"/"no").
pub fn parse_bool_flag(s: &str) -> Result<bool, String> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(format!("Invalid boolean value: '{}'", other)),
    }
}

/// Splits a comma-separated header list; `\,` stands for a literal comma.
///
/// Blank entries are skipped; surrounding whitespace is preserved for the
/// caller to trim.
pub fn parse_headers_with_escapes(headers_str: &str) -> Vec<String> {
    let mut headers = Vec::new();
    let mut current = String::new();
    let mut chars = headers_str.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' && chars.peek() == Some(&',') {
            current.push(',');
            chars.next();
        } else if ch == ',' {
            if !current.trim().is_empty() {
                headers.push(std::mem::take(&mut current));
            }
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        headers.push(current);
    }

    headers
}
