use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::super::domain::{Category, LocationType};

/// Annual base fee per (category, location type), in whole rupees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    annual_fees: BTreeMap<(Category, LocationType), u64>,
}

impl FeeSchedule {
    /// Tariff notified for homestay registration.
    pub fn standard() -> Self {
        let rows = [
            (Category::Silver, LocationType::GramPanchayat, 3_000),
            (Category::Silver, LocationType::TownPlanningArea, 5_000),
            (Category::Silver, LocationType::MunicipalCorporation, 8_000),
            (Category::Gold, LocationType::GramPanchayat, 6_000),
            (Category::Gold, LocationType::TownPlanningArea, 8_000),
            (Category::Gold, LocationType::MunicipalCorporation, 12_000),
            (Category::Diamond, LocationType::GramPanchayat, 10_000),
            (Category::Diamond, LocationType::TownPlanningArea, 12_000),
            (Category::Diamond, LocationType::MunicipalCorporation, 18_000),
        ];

        Self {
            annual_fees: rows
                .into_iter()
                .map(|(category, location, fee)| ((category, location), fee))
                .collect(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FeeScheduleError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse a `category,location_type,annual_fee` CSV. Every combination must be present.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FeeScheduleError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut annual_fees = BTreeMap::new();

        for (index, record) in csv_reader.deserialize::<ScheduleRow>().enumerate() {
            let row = record?;
            let line = index + 2;
            let category = row
                .category
                .parse::<Category>()
                .map_err(|reason| FeeScheduleError::InvalidRow { line, reason })?;
            let location = row
                .location_type
                .parse::<LocationType>()
                .map_err(|reason| FeeScheduleError::InvalidRow { line, reason })?;

            if annual_fees.insert((category, location), row.annual_fee).is_some() {
                return Err(FeeScheduleError::InvalidRow {
                    line,
                    reason: format!(
                        "duplicate entry for {} / {}",
                        category.label(),
                        location.label()
                    ),
                });
            }
        }

        for category in Category::ALL {
            for location in LocationType::ALL {
                if !annual_fees.contains_key(&(category, location)) {
                    return Err(FeeScheduleError::Incomplete { category, location });
                }
            }
        }

        Ok(Self { annual_fees })
    }

    pub fn annual_fee(&self, category: Category, location: LocationType) -> u64 {
        self.annual_fees
            .get(&(category, location))
            .copied()
            .unwrap_or_default()
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleRow {
    category: String,
    location_type: String,
    annual_fee: u64,
}

#[derive(Debug)]
pub enum FeeScheduleError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: usize, reason: String },
    Incomplete {
        category: Category,
        location: LocationType,
    },
}

impl std::fmt::Display for FeeScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeScheduleError::Io(err) => write!(f, "failed to read fee schedule: {}", err),
            FeeScheduleError::Csv(err) => write!(f, "invalid fee schedule CSV: {}", err),
            FeeScheduleError::InvalidRow { line, reason } => {
                write!(f, "fee schedule line {}: {}", line, reason)
            }
            FeeScheduleError::Incomplete { category, location } => write!(
                f,
                "fee schedule has no entry for {} / {}",
                category.label(),
                location.label()
            ),
        }
    }
}

impl std::error::Error for FeeScheduleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeeScheduleError::Io(err) => Some(err),
            FeeScheduleError::Csv(err) => Some(err),
            FeeScheduleError::InvalidRow { .. } | FeeScheduleError::Incomplete { .. } => None,
        }
    }
}

impl From<std::io::Error> for FeeScheduleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for FeeScheduleError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}
