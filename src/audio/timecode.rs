use crate::error::{PlayerError, PlayerResult};

/// Margen final que un seek no puede sobrepasar.
pub const SEEK_TAIL_SECS: i64 = 5;

/// Convierte `SS`, `MM:SS` o `HH:MM:SS` a segundos.
pub fn parse_timestamp(input: &str) -> PlayerResult<u64> {
    let trimmed = input.trim();
    let invalid = || PlayerError::InvalidTime(trimmed.to_string());

    let parts: Vec<u64> = trimmed
        .split(':')
        .map(|p| {
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            p.parse::<u64>().map_err(|_| invalid())
        })
        .collect::<PlayerResult<_>>()?;

    match parts.as_slice() {
        [seconds] => Ok(*seconds),
        [minutes, seconds] if *seconds < 60 => Ok(minutes * 60 + seconds),
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            Ok(hours * 3600 + minutes * 60 + seconds)
        }
        _ => Err(invalid()),
    }
}

/// Ajusta un objetivo de seek a `[0, max(0, duration - 5)]`.
///
/// Unknown durations (0) only clamp the lower bound.
pub fn clamp_seek_target(target: i64, duration: u64) -> u64 {
    if target <= 0 {
        return 0;
    }
    if duration == 0 {
        return target as u64;
    }
    let ceiling = (duration as i64 - SEEK_TAIL_SECS).max(0);
    target.min(ceiling) as u64
}
