use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicI64, Ordering};

static SLUG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap_or_else(|e| panic!("invalid slug pattern: {}", e))
});

static LAST_SUFFIX_MILLIS: AtomicI64 = AtomicI64::new(0);

/// 从名称生成列表 slug
///
/// ASCII-folded, lowercased name with non-alphanumeric runs collapsed to a
/// single hyphen, followed by a base-36 millisecond suffix. The suffix clock
/// never repeats within the process, so identical names created in the same
/// millisecond still get distinct slugs.
pub fn generate_list_slug(name: &str) -> String {
    let mut base = slug::slugify(name);
    if base.is_empty() {
        base = "list".to_string();
    }
    format!("{}-{}", base, to_base36(next_suffix_millis()))
}

fn next_suffix_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_SUFFIX_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_SUFFIX_MILLIS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

pub fn to_base36(mut value: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// 验证 slug 格式是否正确
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= 200 && SLUG_REGEX.is_match(slug)
}
