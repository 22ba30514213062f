//! Backgrounds a merge job can be composited onto.

use std::fmt;
use std::str::FromStr;

/// Directory (relative to the media root) holding the background images.
pub const BACKGROUND_DIR: &str = "background-image";

/// Number of bundled backgrounds (`bg1` .. `bg6`).
pub const BACKGROUND_COUNT: u8 = 6;

/// A bundled background, identified by its 1-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Background(u8);

impl Background {
    /// All bundled backgrounds in order.
    pub fn all() -> impl Iterator<Item = Background> {
        (1..=BACKGROUND_COUNT).map(Background)
    }

    /// Name as stored in `background_name` (e.g. `bg3`).
    pub fn name(&self) -> String {
        format!("bg{}", self.0)
    }

    /// Media-relative path of the background image.
    pub fn relative_path(&self) -> String {
        format!("{}/bg{}.png", BACKGROUND_DIR, self.0)
    }
}

impl FromStr for Background {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("bg")
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| (1..=BACKGROUND_COUNT).contains(n) && s == format!("bg{}", n))
            .map(Background)
            .ok_or_else(|| format!("Unknown background: {}", s))
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bg{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_backgrounds() {
        let bg: Background = "bg1".parse().unwrap();
        assert_eq!(bg.name(), "bg1");
        assert_eq!(bg.relative_path(), "background-image/bg1.png");

        assert_eq!("bg6".parse::<Background>().unwrap().to_string(), "bg6");
        assert_eq!(Background::all().count(), 6);
    }

    #[test]
    fn test_reject_unknown_backgrounds() {
        for name in ["bg0", "bg7", "sea", "", "bg", "bg01", "BG1", "bg1 "] {
            assert!(name.parse::<Background>().is_err(), "{} should be rejected", name);
        }
    }
}
