//! Hostlist expansion (`nid[001-003,007],login1` → individual host names).
use orun_model::ConfigError;

/// Expand a platform hostlist expression into host names, preserving order.
///
/// Supports comma separated items, any number of bracket groups per item, ranges (`a-b`) and zero padding taken from the lower bound.
/// Fails as soon as the expression yields more than `limit` hosts.
pub fn expand(expr: &str, limit: usize) -> Result<Vec<String>, ConfigError> {
    let mut hosts = Vec::new();
    for item in split_top_level(expr)? {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        expand_item(item, limit, &mut hosts)?;
    }
    Ok(hosts)
}

fn split_top_level(expr: &str) -> Result<Vec<&str>, ConfigError> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ConfigError::InvalidNodelist(format!("unbalanced ']' in {expr:?}"))
                })?;
            }
            ',' if depth == 0 => {
                items.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ConfigError::InvalidNodelist(format!(
            "unbalanced '[' in {expr:?}"
        )));
    }
    items.push(&expr[start..]);
    Ok(items)
}

fn expand_item(item: &str, limit: usize, out: &mut Vec<String>) -> Result<(), ConfigError> {
    let Some(open) = item.find('[') else {
        if out.len() >= limit {
            return Err(too_many(limit));
        }
        out.push(item.to_string());
        return Ok(());
    };
    let close = item[open..]
        .find(']')
        .map(|i| open + i)
        .ok_or_else(|| ConfigError::InvalidNodelist(format!("missing ']' in {item:?}")))?;

    let prefix = &item[..open];
    let body = &item[open + 1..close];
    let rest = &item[close + 1..];

    for part in body.split(',') {
        for n in expand_range(part.trim(), item, limit)? {
            expand_item(&format!("{prefix}{n}{rest}"), limit, out)?;
        }
    }
    Ok(())
}

fn too_many(limit: usize) -> ConfigError {
    ConfigError::InvalidNodelist(format!("expands to more than {limit} hosts"))
}

fn expand_range(part: &str, item: &str, limit: usize) -> Result<Vec<String>, ConfigError> {
    let invalid = || ConfigError::InvalidNodelist(format!("bad range {part:?} in {item:?}"));

    let (lo, hi) = match part.split_once('-') {
        Some((lo, hi)) => (lo, hi),
        None => (part, part),
    };
    if lo.is_empty() || !lo.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let width = lo.len();
    let lo_n: u64 = lo.parse().map_err(|_| invalid())?;
    let hi_n: u64 = hi.parse().map_err(|_| invalid())?;
    if hi_n < lo_n {
        return Err(invalid());
    }
    if u128::from(hi_n - lo_n) >= limit as u128 {
        return Err(too_many(limit));
    }

    Ok((lo_n..=hi_n).map(|n| format!("{n:0width$}")).collect())
}
