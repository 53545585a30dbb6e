//! Object id recovery
//!
//! When the scanner meets an `obj` keyword without having seen the object number and
//! generation as separate tokens, the id is rebuilt by walking backwards from the
//! keyword over at most two separator-delimited integers.

use super::lexer::{is_delimiter, is_separator};
use super::objects::ObjectId;
use tracing::{error, warn};

/// Recovered id and the offset of its first digit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredId {
    pub id: ObjectId,
    pub start: usize,
}

/// Walk backwards from `obj_pos` (the offset of the `obj` keyword).
///
/// Two integers read as `number generation`; a single one is taken as the number with
/// generation 0; anything else yields the undefined id `(0, 0)`.
pub fn recover_object_id(data: &[u8], obj_pos: usize) -> RecoveredId {
    let mut integers: Vec<i64> = Vec::new();
    let mut pending: Option<i64> = None;
    let mut scale: i64 = 1;
    let mut boundaries = 0;
    let mut in_separator = false;
    let mut start = obj_pos;
    let mut pos = obj_pos.min(data.len());

    let close = |pending: &mut Option<i64>, scale: &mut i64, integers: &mut Vec<i64>| {
        if let Some(value) = pending.take() {
            integers.push(value);
        }
        *scale = 1;
    };

    while pos > 0 {
        pos -= 1;
        let b = data[pos];
        if is_separator(b) {
            close(&mut pending, &mut scale, &mut integers);
            in_separator = true;
            continue;
        }
        if in_separator {
            in_separator = false;
            boundaries += 1;
            if boundaries == 3 {
                break;
            }
        }
        if b.is_ascii_digit() {
            let digit = i64::from(b - b'0');
            let accumulated = scale
                .checked_mul(digit)
                .and_then(|d| d.checked_add(pending.unwrap_or(0)));
            match accumulated {
                Some(value) => {
                    pending = Some(value);
                    scale = scale.saturating_mul(10);
                    start = pos;
                    continue;
                }
                None => {
                    error!(position = pos, "object number overflow while recovering id");
                    pending = None;
                    break;
                }
            }
        }
        if is_delimiter(b) && boundaries == 2 {
            break;
        }
        error!(position = pos, byte = b, "unexpected byte while recovering object id");
        pending = None;
        break;
    }
    close(&mut pending, &mut scale, &mut integers);

    let as_i32 = |value: i64| i32::try_from(value).ok();
    let id = match integers.as_slice() {
        [generation, number] => match (as_i32(*number), as_i32(*generation)) {
            (Some(number), Some(generation)) => Some(ObjectId::new(number, generation)),
            _ => None,
        },
        [number] => {
            warn!(position = obj_pos, "only one integer found before obj, generation set to 0");
            as_i32(*number).map(|number| ObjectId::new(number, 0))
        }
        _ => None,
    };
    let id = id.unwrap_or_else(|| {
        error!(
            position = obj_pos,
            found = integers.len(),
            "unable to recover object id"
        );
        ObjectId::default()
    });
    RecoveredId { id, start }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recover(input: &[u8]) -> RecoveredId {
        let pos = input.windows(3).rposition(|w| w == b"obj").unwrap();
        recover_object_id(input, pos)
    }

    #[test]
    fn test_well_formed_id() {
        let recovered = recover(b"1 0 obj");
        assert_eq!(recovered.id, ObjectId::new(1, 0));
        assert_eq!(recovered.start, 0);
    }

    #[test]
    fn test_id_after_previous_object() {
        let input = b"endobj\n12 3 obj";
        let recovered = recover(input);
        assert_eq!(recovered.id, ObjectId::new(12, 3));
        assert_eq!(recovered.start, 7);
    }

    #[test]
    fn test_multi_separator_runs() {
        let recovered = recover(b"trailer\r\n 45  \r\n 0 \t obj");
        assert_eq!(recovered.id, ObjectId::new(45, 0));
    }

    #[test]
    fn test_delimiter_before_number() {
        let recovered = recover(b">>7 0 obj");
        assert_eq!(recovered.id, ObjectId::new(7, 0));
        assert_eq!(recovered.start, 2);
    }

    #[test]
    fn test_single_integer_defaults_generation() {
        let recovered = recover(b"endobj 9 obj");
        assert_eq!(recovered.id, ObjectId::new(9, 0));
    }

    #[test]
    fn test_garbage_yields_undefined_id() {
        assert!(recover(b"abc obj").id.is_undefined());
        assert!(recover(b"obj").id.is_undefined());
        // a letter glued to the number aborts the scan
        assert_eq!(recover(b"x1 0 obj").id, ObjectId::new(0, 0));
    }
}
