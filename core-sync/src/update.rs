use crate::changed_fields::ChangedFields;
use bridge_traits::StatusSample;
use std::fmt;

/// Classified difference between an instance's last known state and a new
/// sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// The change is explained by ordinary playback progress.
    pub is_natural: bool,
    pub changed: ChangedFields,
    pub sample: StatusSample,
}

impl Update {
    /// Whether this update should be propagated to other players.
    pub fn is_manual(&self) -> bool {
        !self.is_natural && !self.changed.is_empty()
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_natural {
            f.write_str("NATURAL: ")?;
        }
        write!(f, "{{{}}} {}", self.changed, self.sample)
    }
}
