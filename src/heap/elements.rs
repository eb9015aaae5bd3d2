//! Elements kinds
//!
//! The representation of an object's indexed storage. Kinds form a lattice that is the
//! product of a storage axis (`Smi < Double < Tagged`) and a packing axis
//! (`Packed < Holey`). Transitions only ever move up the lattice.

use std::fmt;

/// What an elements backing store can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementsStorage {
    /// Small integers only
    Smi,
    /// Unboxed doubles
    Double,
    /// Arbitrary tagged values
    Tagged,
}

/// Representation of an object's elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementsKind {
    PackedSmi,
    HoleySmi,
    PackedDouble,
    HoleyDouble,
    Packed,
    Holey,
}

impl ElementsKind {
    /// Every kind, ordered by storage then packing
    pub const ALL: [ElementsKind; 6] = [
        ElementsKind::PackedSmi,
        ElementsKind::HoleySmi,
        ElementsKind::PackedDouble,
        ElementsKind::HoleyDouble,
        ElementsKind::Packed,
        ElementsKind::Holey,
    ];

    pub fn from_parts(storage: ElementsStorage, holey: bool) -> Self {
        match (storage, holey) {
            (ElementsStorage::Smi, false) => ElementsKind::PackedSmi,
            (ElementsStorage::Smi, true) => ElementsKind::HoleySmi,
            (ElementsStorage::Double, false) => ElementsKind::PackedDouble,
            (ElementsStorage::Double, true) => ElementsKind::HoleyDouble,
            (ElementsStorage::Tagged, false) => ElementsKind::Packed,
            (ElementsStorage::Tagged, true) => ElementsKind::Holey,
        }
    }

    pub fn storage(self) -> ElementsStorage {
        match self {
            ElementsKind::PackedSmi | ElementsKind::HoleySmi => ElementsStorage::Smi,
            ElementsKind::PackedDouble | ElementsKind::HoleyDouble => ElementsStorage::Double,
            ElementsKind::Packed | ElementsKind::Holey => ElementsStorage::Tagged,
        }
    }

    pub fn is_holey(self) -> bool {
        matches!(
            self,
            ElementsKind::HoleySmi | ElementsKind::HoleyDouble | ElementsKind::Holey
        )
    }

    pub fn is_smi(self) -> bool {
        self.storage() == ElementsStorage::Smi
    }

    pub fn is_double(self) -> bool {
        self.storage() == ElementsStorage::Double
    }

    /// The holey counterpart of this kind
    pub fn to_holey(self) -> Self {
        Self::from_parts(self.storage(), true)
    }

    /// The least upper bound of two kinds
    pub fn union(self, other: ElementsKind) -> Self {
        Self::from_parts(
            self.storage().max(other.storage()),
            self.is_holey() || other.is_holey(),
        )
    }

    /// Whether `to` is a strictly more general kind than `self`
    pub fn is_more_general_transition(self, to: ElementsKind) -> bool {
        self != to && self.storage() <= to.storage() && (!self.is_holey() || to.is_holey())
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementsKind::PackedSmi => "FAST_SMI_ELEMENTS",
            ElementsKind::HoleySmi => "FAST_HOLEY_SMI_ELEMENTS",
            ElementsKind::PackedDouble => "FAST_DOUBLE_ELEMENTS",
            ElementsKind::HoleyDouble => "FAST_HOLEY_DOUBLE_ELEMENTS",
            ElementsKind::Packed => "FAST_ELEMENTS",
            ElementsKind::Holey => "FAST_HOLEY_ELEMENTS",
        }
    }
}

impl fmt::Display for ElementsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
