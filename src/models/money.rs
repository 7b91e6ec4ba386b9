//! Денежные суммы храним и считаем в минорных единицах (копейки/центы, i64).
//! В строку с десятичной точкой конвертируем только на границе API.

/// Итог брони: цена за место × число мест, без плавающей точки.
/// `None` при переполнении i64.
pub fn total_minor(price_minor: i64, seats: usize) -> Option<i64> {
    price_minor.checked_mul(i64::try_from(seats).ok()?)
}

/// 3750 -> "37.50"
pub fn format_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
