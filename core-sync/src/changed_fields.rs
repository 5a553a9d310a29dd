use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of status fields that differ between two observations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangedFields(u8);

impl ChangedFields {
    pub const FILE_URI: Self = Self(1 << 0);
    pub const POSITION: Self = Self(1 << 1);
    pub const STATE: Self = Self(1 << 2);
    pub const RATE: Self = Self(1 << 3);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::FILE_URI, "FileURI"),
        (Self::POSITION, "Position"),
        (Self::STATE, "State"),
        (Self::RATE, "Rate"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(Self::FILE_URI.0 | Self::POSITION.0 | Self::STATE.0 | Self::RATE.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether every field in `other` is also in `self`.
    pub const fn includes(self, other: Self) -> bool {
        self.contains(other)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for ChangedFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ChangedFields {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Display for ChangedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, name) in Self::NAMES {
            if self.contains(field) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChangedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangedFields({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_set_fields() {
        let fields = ChangedFields::POSITION | ChangedFields::FILE_URI;
        assert_eq!(fields.to_string(), "FileURI, Position");
        assert_eq!(ChangedFields::empty().to_string(), "");
    }

    #[test]
    fn test_includes() {
        let src = ChangedFields::STATE | ChangedFields::RATE;
        assert!(src.includes(ChangedFields::RATE));
        assert!(src.includes(ChangedFields::empty()));
        assert!(!src.includes(ChangedFields::RATE | ChangedFields::POSITION));
    }

    #[test]
    fn test_set_and_remove() {
        let mut fields = ChangedFields::all();
        fields.remove(ChangedFields::POSITION);
        assert!(!fields.contains(ChangedFields::POSITION));
        fields.set(ChangedFields::POSITION, true);
        assert_eq!(fields, ChangedFields::all());
        assert_eq!(
            fields.without(ChangedFields::FILE_URI | ChangedFields::RATE),
            ChangedFields::POSITION | ChangedFields::STATE
        );
    }
}
