//! Tariff classification and room-configuration bounds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Category, RoomConfiguration, RoomTypeConfig};

/// Highest nightly rate that still classifies as Silver.
pub const SILVER_MAX_RATE: u32 = 2_999;
/// Highest nightly rate that still classifies as Gold; anything above is Diamond.
pub const GOLD_MAX_RATE: u32 = 10_000;

pub const MAX_BEDS_PER_ROOM: u8 = 4;

/// Classify a homestay by its most expensive room.
pub fn classify(highest_rate: u32) -> Category {
    if highest_rate <= SILVER_MAX_RATE {
        Category::Silver
    } else if highest_rate <= GOLD_MAX_RATE {
        Category::Gold
    } else {
        Category::Diamond
    }
}

/// Classify a room configuration, `None` when no rooms are configured yet.
pub fn classify_rooms(rooms: &[RoomTypeConfig]) -> Option<Category> {
    rooms.highest_rate().map(classify)
}

/// Validation errors for room and fee inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one room must be configured")]
    NoRooms,
    #[error("room entry {index} has a zero count")]
    EmptyRoomEntry { index: usize },
    #[error("room entry {index} must have between 1 and {max} beds (found {found})")]
    BedsPerRoom { index: usize, max: u8, found: u8 },
    #[error("room entry {index} has no nightly rate")]
    MissingRate { index: usize },
    #[error("{category:?} homestays allow at most {max} rooms (found {found})")]
    TooManyRooms {
        category: Category,
        max: u32,
        found: u32,
    },
    #[error("{category:?} homestays allow at most {max} beds (found {found})")]
    TooManyBeds {
        category: Category,
        max: u32,
        found: u32,
    },
    #[error("declared category {declared:?} does not match highest rate {rate} ({derived:?})")]
    CategoryMismatch {
        declared: Category,
        derived: Category,
        rate: u32,
    },
    #[error("certificate validity must be 1 or 3 years (found {0})")]
    ValidityYears(u8),
    #[error("{0}")]
    Payload(String),
}

/// Room and bed maxima for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomLimits {
    pub max_rooms: u32,
    pub max_beds: u32,
}

/// Per-category maxima used when validating drafts and amendments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimits {
    limits: BTreeMap<Category, RoomLimits>,
}

impl Default for CategoryLimits {
    fn default() -> Self {
        let standard = RoomLimits {
            max_rooms: 6,
            max_beds: 12,
        };
        Self {
            limits: Category::ALL
                .into_iter()
                .map(|category| (category, standard))
                .collect(),
        }
    }
}

impl CategoryLimits {
    pub fn with_limit(mut self, category: Category, limits: RoomLimits) -> Self {
        self.limits.insert(category, limits);
        self
    }

    pub fn for_category(&self, category: Category) -> RoomLimits {
        self.limits
            .get(&category)
            .copied()
            .unwrap_or(RoomLimits {
                max_rooms: 0,
                max_beds: 0,
            })
    }

    /// Check entry shape and totals, returning the derived category.
    pub fn validate_rooms(&self, rooms: &[RoomTypeConfig]) -> Result<Category, ValidationError> {
        for (index, room) in rooms.iter().enumerate() {
            if room.count == 0 {
                return Err(ValidationError::EmptyRoomEntry { index });
            }
            if room.beds_per_room == 0 || room.beds_per_room > MAX_BEDS_PER_ROOM {
                return Err(ValidationError::BedsPerRoom {
                    index,
                    max: MAX_BEDS_PER_ROOM,
                    found: room.beds_per_room,
                });
            }
            if room.nightly_rate == 0 {
                return Err(ValidationError::MissingRate { index });
            }
        }

        let category = classify_rooms(rooms).ok_or(ValidationError::NoRooms)?;
        let limits = self.for_category(category);

        let total_rooms = rooms.total_rooms();
        if total_rooms > limits.max_rooms {
            return Err(ValidationError::TooManyRooms {
                category,
                max: limits.max_rooms,
                found: total_rooms,
            });
        }

        let total_beds = rooms.total_beds();
        if total_beds > limits.max_beds {
            return Err(ValidationError::TooManyBeds {
                category,
                max: limits.max_beds,
                found: total_beds,
            });
        }

        Ok(category)
    }
}

pub fn validate_validity_years(years: u8) -> Result<u8, ValidationError> {
    match years {
        1 | 3 => Ok(years),
        other => Err(ValidationError::ValidityYears(other)),
    }
}
