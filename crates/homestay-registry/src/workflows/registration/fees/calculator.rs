use super::super::domain::{Gender, OwnerAttributes};
use super::config::FeePolicy;

/// Raw amounts in hundredths of a rupee, before output rounding.
pub(crate) struct FeeAmounts {
    pub total_before_discount: u64,
    pub validity_discount: u64,
    pub female_owner_discount: u64,
    pub sub_division_discount: u64,
    pub total_fee: u64,
}

/// Apply the stacked discounts to `base_fee` for the given validity.
///
/// Every discount is a percentage of the pre-discount total; nothing compounds.
pub(crate) fn compute_amounts(
    base_fee: u64,
    validity_years: u8,
    owner: &OwnerAttributes,
    policy: &FeePolicy,
) -> FeeAmounts {
    let multiplier = if validity_years == 3 { 3 } else { 1 };
    let before = base_fee.saturating_mul(multiplier);

    let percent_of = |percent: u8| before.saturating_mul(percent as u64);

    let validity_discount = if validity_years == 3 {
        percent_of(policy.three_year_discount_percent)
    } else {
        0
    };
    let female_owner_discount = if owner.gender == Gender::Female {
        percent_of(policy.female_owner_discount_percent)
    } else {
        0
    };
    let sub_division_discount = if policy.sub_division_discounted(owner.sub_division.as_deref()) {
        percent_of(policy.sub_division_discount_percent)
    } else {
        0
    };

    let total_before_discount = before.saturating_mul(100);
    let total_fee = total_before_discount
        .saturating_sub(validity_discount)
        .saturating_sub(female_owner_discount)
        .saturating_sub(sub_division_discount);

    FeeAmounts {
        total_before_discount,
        validity_discount,
        female_owner_discount,
        sub_division_discount,
        total_fee,
    }
}

/// Half-up rounding from hundredths to whole rupees.
pub(crate) fn to_rupees(hundredths: u64) -> u64 {
    hundredths.saturating_add(50) / 100
}

pub(crate) fn savings_percentage(savings: u64, before: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    let percent = savings as f64 / before as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}
