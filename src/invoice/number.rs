use chrono::Datelike;
use rand::Rng;

/// Builds `PREFIX-YYMM-NNN` from the issue date and a random suffix.
///
/// Nothing here prevents two invoices in the same month from drawing the same
/// suffix; the `invoices.invoice_number` unique index rejects the duplicate
/// and the caller draws again.
pub fn generate_invoice_number<D: Datelike, R: Rng>(
    prefix: &str,
    date: &D,
    rng: &mut R,
) -> String {
    let suffix: u16 = rng.gen_range(0..1000);
    format!(
        "{}-{:02}{:02}-{:03}",
        prefix,
        date.year().rem_euclid(100),
        date.month(),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matches_pattern(number: &str) -> bool {
        let parts: Vec<&str> = number.split('-').collect();
        parts.len() == 3
            && parts[0] == "INV"
            && parts[1].len() == 4
            && parts[1].chars().all(|c| c.is_ascii_digit())
            && parts[2].len() == 3
            && parts[2].chars().all(|c| c.is_ascii_digit())
    }

    #[test]
    fn always_matches_inv_yymm_nnn() {
        let mut rng = StdRng::seed_from_u64(7);
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        for _ in 0..2000 {
            let number = generate_invoice_number("INV", &date, &mut rng);
            assert!(matches_pattern(&number), "{}", number);
            assert!(number.starts_with("INV-2603-"));
        }
    }

    #[test]
    fn pads_small_years_and_suffixes() {
        let mut rng = StdRng::seed_from_u64(1);
        let date = NaiveDate::from_ymd_opt(2005, 11, 1).unwrap();
        let number = generate_invoice_number("INV", &date, &mut rng);
        assert!(number.starts_with("INV-0511-"));
        assert_eq!(number.len(), "INV-0511-000".len());
    }
}
