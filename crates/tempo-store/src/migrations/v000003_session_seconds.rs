//! v000003 -- Store session durations as whole seconds.
//!
//! Durations used to be kept only as text such as `"1h30m0s"`.  This adds a
//! `duration_secs` column and fills it by parsing every existing row, which is
//! why it is written in Rust rather than SQL.

use rusqlite::{params, Transaction};
use tempo_migrate::StepResult;

pub fn up(tx: &Transaction<'_>) -> StepResult {
    tx.execute_batch(
        "ALTER TABLE sessions ADD COLUMN duration_secs INTEGER NOT NULL DEFAULT 0;",
    )?;

    let mut select = tx.prepare("SELECT id, duration FROM sessions")?;
    let rows = select.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut update = tx.prepare("UPDATE sessions SET duration_secs = ?1 WHERE id = ?2")?;
    let mut converted = 0usize;
    for row in rows {
        let (id, text) = row?;
        let secs = parse_duration(&text)
            .ok_or_else(|| format!("session {id} has an unreadable duration {text:?}"))?;
        let secs = i64::try_from(secs)
            .map_err(|_| format!("session {id} duration {text:?} is out of range"))?;
        update.execute(params![secs, id])?;
        converted += 1;
    }

    tracing::info!(sessions = converted, "converted session durations to seconds");
    Ok(())
}

pub fn down(tx: &Transaction<'_>) -> StepResult {
    tx.execute_batch("ALTER TABLE sessions DROP COLUMN duration_secs;")?;
    Ok(())
}

/// Parse `h`/`m`/`s` duration text such as `"1h30m0s"`, `"45m"` or `"90s"`.
fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let value: u64 = digits.parse().ok()?;
        total = total.checked_add(value.checked_mul(unit)?)?;
        digits.clear();
    }

    // Trailing digits without a unit.
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_text() {
        assert_eq!(parse_duration("1h30m0s"), Some(5400));
        assert_eq!(parse_duration("45m"), Some(2700));
        assert_eq!(parse_duration("90s"), Some(90));
        assert_eq!(parse_duration(" 2h "), Some(7200));
        assert_eq!(parse_duration("0s"), Some(0));
    }

    #[test]
    fn rejects_malformed_duration_text() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("15"), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("1.5h"), None);
    }
}
