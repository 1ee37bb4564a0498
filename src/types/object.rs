//! Survey objects and their category taxonomies

use serde::{Deserialize, Serialize};

const BRICK_CATEGORIES: &[&str] = &[
    "Building/Construction",
    "Weapon/Defense",
    "Landscaping/Gardening",
    "Decoration",
    "Exercise/Weight",
    "Furniture Support/Leveling",
    "Cooking/Heating",
    "Breaking/Smashing",
    "Pathway/Walkway",
    "Anchoring/Weighting Down",
    "Toy/Play",
    "Art Installation",
];

const NEWSPAPER_CATEGORIES: &[&str] = &[
    "Insect Control",
    "Art and Craft",
    "Cleaning",
    "Decorations",
    "Wrapping/Packaging",
    "Fire-related Use",
    "Pet-related Use",
    "Reading/Writing",
    "Games/Entertainment",
    "Clothing",
    "Sculpturing",
    "Dog Care",
];

/// An object participants generate uses for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectId {
    Brick,
    Newspaper,
}

impl ObjectId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectId::Brick => "brick",
            ObjectId::Newspaper => "newspaper",
        }
    }

    /// Labels the classifier may assign
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            ObjectId::Brick => BRICK_CATEGORIES,
            ObjectId::Newspaper => NEWSPAPER_CATEGORIES,
        }
    }

    /// Labels offered as hints. Same set as the taxonomy.
    pub fn suggestions(&self) -> &'static [&'static str] {
        self.categories()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object pair for one participant: phases 0-1 use `first`, phase 2 `second`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectOrder {
    pub first: ObjectId,
    pub second: ObjectId,
}

impl ObjectOrder {
    pub fn new(first: ObjectId, second: ObjectId) -> Self {
        Self { first, second }
    }

    /// Object used by the phase at `phase_index`
    pub fn for_phase(&self, phase_index: usize) -> ObjectId {
        if phase_index < crate::TRANSFER_PHASE_INDEX {
            self.first
        } else {
            self.second
        }
    }
}
