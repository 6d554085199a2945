//! Clipboard identifiers.

use std::fmt;

/// Identifies one of the clipboards a screen can own.
///
/// Each identifier corresponds to one X selection: [`ClipboardId::CLIPBOARD`]
/// is the explicit copy/paste buffer, [`ClipboardId::SELECTION`] the
/// middle-click primary selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipboardId(pub u8);

impl ClipboardId {
    pub const CLIPBOARD: ClipboardId = ClipboardId(0);
    pub const SELECTION: ClipboardId = ClipboardId(1);

    /// Number of clipboard identifiers; slot arrays are sized with this.
    pub const COUNT: usize = 2;

    /// All identifiers in slot order.
    pub fn all() -> impl Iterator<Item = ClipboardId> {
        (0..Self::COUNT as u8).map(ClipboardId)
    }

    /// Index of this identifier in a slot array.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClipboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ClipboardId::CLIPBOARD => write!(f, "CLIPBOARD"),
            ClipboardId::SELECTION => write!(f, "PRIMARY"),
            ClipboardId(other) => write!(f, "clipboard {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_yields_one_id_per_slot() {
        let ids: Vec<_> = ClipboardId::all().collect();
        assert_eq!(ids, vec![ClipboardId::CLIPBOARD, ClipboardId::SELECTION]);
        assert!(ids.iter().enumerate().all(|(i, id)| id.index() == i));
    }
}
