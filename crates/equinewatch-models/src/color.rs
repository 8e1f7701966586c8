//! Deterministic display color assignment.

use serde::{Deserialize, Serialize};

/// A 24-bit RGB color, serialized as `#RRGGBB` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    pub fn from_hex(s: &str) -> Option<Rgb> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&s[0..2], 16).ok()?;
        let g = u8::from_str_radix(&s[2..4], 16).ok()?;
        let b = u8::from_str_radix(&s[4..6], 16).ok()?;
        Some(Rgb(r, g, b))
    }
}

/// A fixed, visually-distinct palette cycled by `numeric_label` so color
/// assignment is a pure function of the label (§3).
const PALETTE: &[(u8, u8, u8)] = &[
    (230, 25, 75),
    (60, 180, 75),
    (255, 225, 25),
    (0, 130, 200),
    (245, 130, 48),
    (145, 30, 180),
    (70, 240, 240),
    (240, 50, 230),
    (210, 245, 60),
    (250, 190, 212),
    (0, 128, 128),
    (220, 190, 255),
    (170, 110, 40),
    (255, 250, 200),
    (128, 0, 0),
    (170, 255, 195),
];

/// Choose a color deterministically from a track's `numeric_label`.
pub fn color_for_label(numeric_label: u32) -> Rgb {
    let (r, g, b) = PALETTE[(numeric_label as usize) % PALETTE.len()];
    Rgb(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_assignment_is_deterministic() {
        assert_eq!(color_for_label(5), color_for_label(5));
    }

    #[test]
    fn hex_round_trips() {
        let c = color_for_label(3);
        assert_eq!(Rgb::from_hex(&c.to_hex()).unwrap(), c);
    }
}
