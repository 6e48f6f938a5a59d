/// Version tag leading the canonical serialization.
pub const CHECKSUM_VERSION: &str = "TRL_v1";

const DJB2_SEED: u32 = 5381;

/// Render a float the way the profile consumers print it: shortest
/// round-trip digits, a trailing `.0` for integral values, and scientific
/// notation with a signed two-digit exponent outside `1e-4..1e16`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0".into() } else { "0.0".into() };
    }

    let sci = format!("{value:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }

    let plain = value.to_string();
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

/// `TRL_v1|key:value|...` with keys in ascending order. The separator after
/// the version tag is always present, so an empty set renders as `TRL_v1|`.
pub fn canonical_form<K, I>(dimensions: I) -> String
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, f64)>,
{
    let mut pairs: Vec<(K, f64)> = dimensions.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    let body: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("{}:{}", key.as_ref(), format_float(*value)))
        .collect();
    format!("{CHECKSUM_VERSION}|{}", body.join("|"))
}

/// DJB2 over the canonical form, as 8 lowercase hex digits.
///
/// Independent of input order: equal dimension sets always hash the same.
pub fn checksum<K, I>(dimensions: I) -> String
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, f64)>,
{
    let hash = canonical_form(dimensions)
        .chars()
        .fold(DJB2_SEED, |h, c| h.wrapping_mul(33).wrapping_add(c as u32));
    format!("{hash:08x}")
}
