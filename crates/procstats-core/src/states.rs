//! The process/memory/screen state space and its encodings.
//!
//! A process bucket is a single byte combining the coarse process lifecycle
//! state with the device-wide memory factor:
//!
//! ```text
//! bucket = proc_state + mem_factor * STATE_COUNT
//! mem_factor = mem_level + (screen_on ? ADJ_SCREEN_ON : 0)
//! ```
//!
//! giving `8 * 10 = 80` possible buckets, all of which fit the 8-bit type
//! tag of a [`PackedOffset`](crate::long_pool::PackedOffset). The sentinel
//! [`STATE_NOTHING`] marks "not running / not tracked" and is never composed.

/// Sentinel for "no state": the process (or service mode, or memory factor)
/// is not currently being tracked.
pub const STATE_NOTHING: i32 = -1;

pub const STATE_PERSISTENT: i32 = 0;
pub const STATE_TOP: i32 = 1;
pub const STATE_FOREGROUND: i32 = 2;
pub const STATE_VISIBLE: i32 = 3;
pub const STATE_PERCEPTIBLE: i32 = 4;
pub const STATE_BACKUP: i32 = 5;
pub const STATE_SERVICE: i32 = 6;
pub const STATE_HOME: i32 = 7;
pub const STATE_PREVIOUS: i32 = 8;
pub const STATE_CACHED: i32 = 9;
/// Number of coarse process lifecycle states.
pub const STATE_COUNT: i32 = STATE_CACHED + 1;

/// Indices into a PSS slot group.
pub const PSS_SAMPLE_COUNT: usize = 0;
pub const PSS_MINIMUM: usize = 1;
pub const PSS_AVERAGE: usize = 2;
pub const PSS_MAXIMUM: usize = 3;
/// Longs reserved per PSS table entry.
pub const PSS_COUNT: usize = PSS_MAXIMUM + 1;

pub const ADJ_MEM_FACTOR_NORMAL: i32 = 0;
pub const ADJ_MEM_FACTOR_MODERATE: i32 = 1;
pub const ADJ_MEM_FACTOR_LOW: i32 = 2;
pub const ADJ_MEM_FACTOR_CRITICAL: i32 = 3;
pub const ADJ_MEM_FACTOR_COUNT: i32 = ADJ_MEM_FACTOR_CRITICAL + 1;
/// Stride between the screen-off and screen-on halves of the adj space.
pub const ADJ_SCREEN_MOD: i32 = ADJ_MEM_FACTOR_COUNT;
pub const ADJ_SCREEN_OFF: i32 = 0;
pub const ADJ_SCREEN_ON: i32 = ADJ_SCREEN_MOD;
/// Number of composite memory-factor states (mem level x screen).
pub const ADJ_COUNT: i32 = ADJ_SCREEN_ON * 2;

pub const ALL_PROC_STATES: [i32; STATE_COUNT as usize] = [
    STATE_PERSISTENT,
    STATE_TOP,
    STATE_FOREGROUND,
    STATE_VISIBLE,
    STATE_PERCEPTIBLE,
    STATE_BACKUP,
    STATE_SERVICE,
    STATE_HOME,
    STATE_PREVIOUS,
    STATE_CACHED,
];

pub const ALL_SCREEN_ADJ: [i32; 2] = [ADJ_SCREEN_OFF, ADJ_SCREEN_ON];

pub const ALL_MEM_ADJ: [i32; ADJ_MEM_FACTOR_COUNT as usize] = [
    ADJ_MEM_FACTOR_NORMAL,
    ADJ_MEM_FACTOR_MODERATE,
    ADJ_MEM_FACTOR_LOW,
    ADJ_MEM_FACTOR_CRITICAL,
];

// =============================================================================
// Display labels
// =============================================================================

/// Fixed-width state labels for the human dump.
pub const STATE_NAMES: [&str; STATE_COUNT as usize] = [
    "Persistent ",
    "Top        ",
    "Foreground ",
    "Visible    ",
    "Perceptible",
    "Backup     ",
    "Service    ",
    "Home       ",
    "Previous   ",
    "Cached     ",
];

/// CSV dimension words accepted by `--csv-screen`.
pub const ADJ_SCREEN_NAMES_CSV: [&str; 2] = ["off", "on"];

/// CSV dimension words accepted by `--csv-mem`.
pub const ADJ_MEM_NAMES_CSV: [&str; ADJ_MEM_FACTOR_COUNT as usize] =
    ["norm", "mod", "low", "crit"];

/// CSV dimension words accepted by `--csv-proc`.
pub const STATE_NAMES_CSV: [&str; STATE_COUNT as usize] = [
    "pers", "top", "fore", "vis", "percept", "backup", "service", "home", "prev", "cached",
];

/// Single-character screen tags for the checkin dump.
pub const ADJ_SCREEN_TAGS: [&str; 2] = ["0", "1"];

/// Single-character memory tags for the checkin dump.
pub const ADJ_MEM_TAGS: [&str; ADJ_MEM_FACTOR_COUNT as usize] = ["n", "m", "l", "c"];

/// Single-character process-state tags for the checkin dump.
pub const STATE_TAGS: [&str; STATE_COUNT as usize] =
    ["y", "t", "f", "v", "r", "b", "s", "h", "p", "c"];

// =============================================================================
// Composite-bucket math
// =============================================================================

/// Compose a process bucket from a composite memory factor (0..8) and a
/// process lifecycle state (0..10).
#[must_use]
pub const fn compose_bucket(mem_factor: i32, proc_state: i32) -> i32 {
    proc_state + mem_factor * STATE_COUNT
}

/// Compose a memory factor from a mem level (0..4) and the screen state.
#[must_use]
pub const fn compose_mem_factor(mem_level: i32, screen_on: bool) -> i32 {
    if screen_on {
        mem_level + ADJ_SCREEN_ON
    } else {
        mem_level
    }
}

/// Push one tag from `table`, selected by `value / modulus`, returning the
/// remainder. Out-of-range values render as `?`.
fn push_tag(out: &mut String, table: &[&str], value: i32, modulus: i32) -> i32 {
    let index = value / modulus;
    if index >= 0 && (index as usize) < table.len() {
        out.push_str(table[index as usize]);
    } else {
        out.push('?');
    }
    value - index * modulus
}

/// Render the 3-character checkin tag for a process bucket (screen, mem,
/// proc-state), e.g. bucket 61 -> `"1lt"`.
pub fn push_proc_state_tag(out: &mut String, bucket: i32) {
    let rest = push_tag(out, &ADJ_SCREEN_TAGS, bucket, ADJ_SCREEN_MOD * STATE_COUNT);
    let rest = push_tag(out, &ADJ_MEM_TAGS, rest, STATE_COUNT);
    push_tag(out, &STATE_TAGS, rest, 1);
}

/// Render the 2-character checkin tag for a composite memory factor
/// (screen, mem), e.g. factor 6 -> `"1l"`.
pub fn push_adj_tag(out: &mut String, factor: i32) {
    let rest = push_tag(out, &ADJ_SCREEN_TAGS, factor, ADJ_SCREEN_MOD);
    push_tag(out, &ADJ_MEM_TAGS, rest, 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_composition_covers_80_states() {
        assert_eq!(compose_bucket(0, STATE_PERSISTENT), 0);
        assert_eq!(compose_bucket(7, STATE_CACHED), 79);
        assert_eq!(
            compose_bucket(compose_mem_factor(ADJ_MEM_FACTOR_LOW, true), STATE_TOP),
            61
        );
    }

    #[test]
    fn mem_factor_composition() {
        assert_eq!(compose_mem_factor(ADJ_MEM_FACTOR_NORMAL, false), 0);
        assert_eq!(compose_mem_factor(ADJ_MEM_FACTOR_NORMAL, true), 4);
        assert_eq!(compose_mem_factor(ADJ_MEM_FACTOR_CRITICAL, true), 7);
    }

    #[test]
    fn proc_state_tags_decompose_by_division() {
        let mut tag = String::new();
        push_proc_state_tag(&mut tag, 0);
        assert_eq!(tag, "0ny");

        let mut tag = String::new();
        push_proc_state_tag(&mut tag, 61); // screen on, low, top
        assert_eq!(tag, "1lt");

        let mut tag = String::new();
        push_proc_state_tag(&mut tag, 79); // screen on, critical, cached
        assert_eq!(tag, "1cc");
    }

    #[test]
    fn adj_tags_decompose_by_division() {
        let mut tag = String::new();
        push_adj_tag(&mut tag, 0);
        assert_eq!(tag, "0n");

        let mut tag = String::new();
        push_adj_tag(&mut tag, 6);
        assert_eq!(tag, "1l");
    }

    #[test]
    fn every_bucket_renders_a_three_char_tag() {
        for bucket in 0..(ADJ_COUNT * STATE_COUNT) {
            let mut tag = String::new();
            push_proc_state_tag(&mut tag, bucket);
            assert_eq!(tag.len(), 3, "bucket {bucket} -> {tag:?}");
            assert!(!tag.contains('?'), "bucket {bucket} -> {tag:?}");
        }
    }
}
