//! Fixed pitch table: one octave of an equal-tempered scale.

/// The octave the table's reference frequencies are tuned to.
pub const REFERENCE_OCTAVE: i32 = 3;

/// Equal temperament scale at octave 3. `C'` is the octave-up C.
const PITCHES: [(&str, f32); 13] = [
    ("C", 130.813),
    ("C#", 138.591),
    ("D", 146.832),
    ("D#", 155.563),
    ("E", 164.814),
    ("F", 174.614),
    ("F#", 184.997),
    ("G", 195.998),
    ("G#", 207.652),
    ("A", 220.000),
    ("A#", 233.082),
    ("B", 246.942),
    ("C'", 261.626),
];

/// Look up the reference frequency for a note name.
///
/// Unknown names return `None`; callers treat that as a no-op rather than an
/// error, so pressing an unmapped key yields silence.
pub fn lookup(note: &str) -> Option<f32> {
    PITCHES
        .iter()
        .find(|(name, _)| *name == note)
        .map(|&(_, freq)| freq)
}

/// All note names the engine accepts, in ascending pitch order.
pub fn note_names() -> impl Iterator<Item = &'static str> {
    PITCHES.iter().map(|&(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_notes_resolve() {
        assert_eq!(lookup("A"), Some(220.0));
        assert_eq!(lookup("C"), Some(130.813));
        assert_eq!(lookup("C'"), Some(261.626));
    }

    #[test]
    fn unknown_note_is_none() {
        assert_eq!(lookup("H"), None);
        assert_eq!(lookup("Db"), None);
        assert_eq!(lookup(""), None);
    }

    #[test]
    fn table_has_thirteen_entries() {
        assert_eq!(note_names().count(), 13);
    }

    #[test]
    fn octave_up_c_doubles_low_c() {
        let c = lookup("C").unwrap();
        let c_up = lookup("C'").unwrap();
        assert!((c_up / c - 2.0).abs() < 0.001, "C' should be one octave above C");
    }

    #[test]
    fn semitone_ratios_are_equal_tempered() {
        let names: Vec<_> = note_names().collect();
        let semitone = 2.0_f32.powf(1.0 / 12.0);
        for pair in names.windows(2) {
            let lo = lookup(pair[0]).unwrap();
            let hi = lookup(pair[1]).unwrap();
            assert!(
                (hi / lo - semitone).abs() < 0.001,
                "{} -> {} should be one semitone",
                pair[0],
                pair[1]
            );
        }
    }
}
