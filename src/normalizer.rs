use crate::model::{IngestError, NewFuelPrice, Product};
use crate::utils::collapse_whitespace;

/// Shortest state name accepted at ingestion.
const MIN_STATE_LEN: usize = 2;

pub fn normalize_all(records: &mut [NewFuelPrice]) {
    for record in records.iter_mut() {
        normalize(record);
    }
}

pub fn normalize(record: &mut NewFuelPrice) {
    record.state = collapse_whitespace(&record.state);
}

/// Checks the invariants every stored record must satisfy.
pub fn validate(record: &NewFuelPrice) -> Result<(), IngestError> {
    if record.state.chars().count() < MIN_STATE_LEN {
        return Err(IngestError::Invalid(format!(
            "state must be at least {} characters, got {:?}",
            MIN_STATE_LEN, record.state
        )));
    }

    for product in Product::ALL {
        let price = record.price(product);
        if !price.is_finite() || price < 0.0 {
            return Err(IngestError::Invalid(format!(
                "{} must be >= 0 for {} on {}, got {}",
                product, record.state, record.period, price
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;
    use chrono::NaiveDate;

    fn sample() -> NewFuelPrice {
        NewFuelPrice {
            state: "  Akwa   Ibom ".to_string(),
            region: Region::SouthSouth,
            period: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            pms: 680.0,
            ago: 1200.0,
            dpk: 1300.0,
            lpg: 950.0,
        }
    }

    #[test]
    fn normalize_collapses_state_whitespace() {
        let mut records = vec![sample()];
        normalize_all(&mut records);
        assert_eq!(records[0].state, "Akwa Ibom");
    }

    #[test]
    fn validate_rejects_negative_and_nan_prices() {
        let mut record = sample();
        record.dpk = -1.0;
        assert!(matches!(validate(&record), Err(IngestError::Invalid(_))));

        record.dpk = f64::NAN;
        assert!(validate(&record).is_err());
    }

    #[test]
    fn validate_rejects_short_state() {
        let mut record = sample();
        record.state = "L".to_string();
        assert!(validate(&record).is_err());
        record.state = "Lagos".to_string();
        assert!(validate(&record).is_ok());
    }
}
