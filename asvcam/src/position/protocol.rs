//! Wire format of the GPS service.

use serde_json::Value;

use super::{Position, SENTINEL_COORDINATE};

/// Query written to the service.
pub const QUERY_TOKEN: &[u8; 3] = b"GPS";

/// Largest reply read from the service (64 KiB).
pub const RESPONSE_LIMIT: usize = 1 << 16;

/// Parse a service reply into a position.
///
/// Missing coordinates default to `"0"`. Strings are kept verbatim. Numbers
/// are accepted but re-rendered as `f64`/integer (`45.50` becomes `45.5`),
/// so producers that care about precision send strings. Other JSON types
/// count as missing.
pub fn parse_position(raw: &[u8]) -> Result<Position, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    Ok(Position::new(
        coordinate(&value, "lat"),
        coordinate(&value, "lon"),
    ))
}

fn coordinate(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => SENTINEL_COORDINATE.to_string(),
    }
}
