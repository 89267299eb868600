/// 检查字符串是否为有效的整数
pub fn is_integer_number(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    let digits = s.strip_prefix(&['+', '-'][..]).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// 解析EDF时间字符串为100纳秒单位
///
/// Accepts an optional sign and up to seven decimals; further digits are cut.
pub fn parse_edf_time(s: &str) -> Result<i64, String> {
    let s = s.trim();
    let invalid = || format!("invalid EDF time {:?}", s);

    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (integer_part, decimal_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if integer_part.is_empty() && decimal_part.is_empty() {
        return Err(invalid());
    }
    if !integer_part.chars().chain(decimal_part.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let mut value = 0i64;
    if !integer_part.is_empty() {
        value = integer_part
            .parse::<i64>()
            .ok()
            .and_then(|v| v.checked_mul(crate::EDF_TIME_DIMENSION))
            .ok_or_else(invalid)?;
    }

    // 小数部分（最多7位精度）
    let decimals = &decimal_part[..decimal_part.len().min(7)];
    if !decimals.is_empty() {
        let fraction: i64 = decimals.parse().map_err(|_| invalid())?;
        value += fraction * 10i64.pow(7 - decimals.len() as u32);
    }

    Ok(if negative { -value } else { value })
}

/// 非本地化的整数解析（避免受系统locale影响）
pub fn atoi_nonlocalized(s: &str) -> i32 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    s.parse().unwrap_or(0)
}

/// 非本地化的浮点数解析
pub fn atof_nonlocalized(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    s.parse().unwrap_or(0.0)
}

/// 将字符串转换为 7-bit ASCII，非 ASCII 替换为 '_'
pub fn to_ascii(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect()
}

/// Renders `value` as exactly `width` ASCII bytes, truncating or space-padding.
pub fn fit_field(value: &str, width: usize) -> Vec<u8> {
    let mut bytes = to_ascii(value).into_bytes();
    bytes.truncate(width);
    bytes.resize(width, b' ');
    bytes
}

/// Reads a fixed-width text field, dropping the right padding.
pub fn field_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(&[' ', '\0'][..])
        .to_string()
}
