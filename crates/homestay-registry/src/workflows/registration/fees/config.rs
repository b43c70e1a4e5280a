use serde::{Deserialize, Serialize};

/// Discount percentages, each applied to the pre-discount total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    pub three_year_discount_percent: u8,
    pub female_owner_discount_percent: u8,
    pub sub_division_discount_percent: u8,
    pub discounted_sub_divisions: Vec<String>,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            three_year_discount_percent: 10,
            female_owner_discount_percent: 5,
            sub_division_discount_percent: 50,
            discounted_sub_divisions: vec!["Pangi".to_string()],
        }
    }
}

impl FeePolicy {
    pub fn with_sub_divisions(mut self, names: Vec<String>) -> Self {
        self.discounted_sub_divisions = names;
        self
    }

    pub fn sub_division_discounted(&self, sub_division: Option<&str>) -> bool {
        match sub_division.map(str::trim) {
            Some(name) if !name.is_empty() => self
                .discounted_sub_divisions
                .iter()
                .any(|listed| listed.trim().eq_ignore_ascii_case(name)),
            _ => false,
        }
    }
}
