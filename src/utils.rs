const UNITS: [&str; 6] = ["", "K", "M", "G", "T", "P"];

/// Compact integer with a unit suffix: the value is divided by `base` until
/// it is below 10000, e.g. 8 GiB with base 1024 is `"8192M"`.
pub fn format_units(value: f64, base: f64) -> String {
    let mut num = value;
    for unit in UNITS {
        if num.abs() < 10000.0 {
            return format!("{}{}", num.trunc() as i64, unit);
        }
        num /= base;
    }
    format!("{}{}", num.trunc() as i64, UNITS[UNITS.len() - 1])
}
