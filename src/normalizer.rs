use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Result, SudsError};
use crate::models::{
    Purchase, PurchaseDetail, RawEntry, WashBayPurchase, BAY_NUMBERS, VACUUM_NUMBERS,
};

/// Turns one raw source entry into a typed purchase.
///
/// `position` is the entry's index in the raw history; it only feeds error
/// messages for entries that arrive without a transaction id.
pub trait Normalizer {
    fn normalize(&self, raw: &RawEntry, position: usize) -> Result<Purchase>;
}

/// Failure reason for a single field; the caller attaches the record.
type Field<T> = std::result::Result<T, String>;

const DATETIME_FORMAT: &str = "%m/%d/%Y, %I:%M %p";

fn first_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("valid number regex"))
}

fn bay_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bay[^0-9]*([0-9]+)").expect("valid bay regex"))
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

/// `"11/26/2025, 9:32 PM"` -> `(2025-11-26, 21:32:00)`. No fuzzy matching.
pub fn parse_datetime(raw: &str) -> Field<(NaiveDate, NaiveTime)> {
    let dt = NaiveDateTime::parse_from_str(raw.trim(), DATETIME_FORMAT)
        .map_err(|e| format!("bad datetime {raw:?}: {e}"))?;
    Ok((dt.date(), dt.time()))
}

/// `"EMV-TAP (0420)"` -> `("EMV-TAP", "0420")`.
pub fn parse_cardholder(raw: &str) -> Field<(String, String)> {
    let (name, rest) = raw
        .split_once('(')
        .ok_or_else(|| format!("cardholder {raw:?} has no '('"))?;
    let last4 = rest.trim().trim_end_matches(')').trim();
    Ok((name.trim().to_string(), last4.to_string()))
}

/// `"$3,200.75"` -> `3200.75`, always carrying exactly two decimal places.
pub fn parse_money(raw: &str) -> Field<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    let value =
        Decimal::from_str(&cleaned).map_err(|_| format!("bad money amount {raw:?}"))?;
    let mut value = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    value.rescale(2);
    Ok(value)
}

fn tab_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split('\t').map(str::trim).filter(|p| !p.is_empty())
}

/// A bay or vacuum number, which must be one that actually exists on site.
fn equipment_number(digits: &str, range: &RangeInclusive<u8>, what: &str, line: &str) -> Field<u8> {
    digits
        .parse::<u8>()
        .ok()
        .filter(|n| range.contains(n))
        .ok_or_else(|| {
            format!(
                "{what} number {digits} outside {}..={} in {line:?}",
                range.start(),
                range.end()
            )
        })
}

// ---------------------------------------------------------------------------
// Details grammar
// ---------------------------------------------------------------------------

/// Line prefixes that classify a details block.
#[derive(Debug, Clone)]
pub struct DetailsGrammar {
    pub vacuum_marker: String,
    pub wash_marker: String,
}

impl Default for DetailsGrammar {
    fn default() -> Self {
        Self {
            vacuum_marker: "Vac".to_string(),
            wash_marker: "Wash Bay".to_string(),
        }
    }
}

impl DetailsGrammar {
    /// Classifies a details block as a vacuum use or one-or-more bay washes.
    ///
    /// A vacuum line wins over bay lines if both are somehow present.
    pub fn parse_details_text(&self, details_text: &str) -> Field<PurchaseDetail> {
        let lines: Vec<&str> = details_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        if let Some(line) = lines.iter().find(|l| l.starts_with(&self.vacuum_marker)) {
            // 'Vac\t(vacuum 3)\t$1.50'
            let part = tab_fields(line)
                .find(|p| p.to_lowercase().contains("vacuum"))
                .unwrap_or(*line);
            let caps = first_number_re()
                .captures(part)
                .ok_or_else(|| format!("vacuum line {line:?} has no vacuum number"))?;
            let vacuum_number = equipment_number(&caps[1], &VACUUM_NUMBERS, "vacuum", line)?;
            return Ok(PurchaseDetail::Vacuum { vacuum_number });
        }

        let mut wash_bay_purchases = Vec::new();
        for line in lines.iter().filter(|l| l.starts_with(&self.wash_marker)) {
            // 'Wash Bay\t(bay 5)\t$3.75'
            let caps = bay_number_re()
                .captures(line)
                .ok_or_else(|| format!("bay line {line:?} has no bay number"))?;
            let bay_number = equipment_number(&caps[1], &BAY_NUMBERS, "bay", line)?;
            let money = tab_fields(line)
                .find(|p| p.contains('$'))
                .ok_or_else(|| format!("bay line {line:?} has no amount"))?;
            wash_bay_purchases.push(WashBayPurchase {
                bay_number,
                wash_purchase_total: parse_money(money)?,
            });
        }

        if wash_bay_purchases.is_empty() {
            return Err(if lines.is_empty() {
                "empty details text".to_string()
            } else {
                format!("unknown details shape: {:?}", lines[0])
            });
        }
        Ok(PurchaseDetail::Wash { wash_bay_purchases })
    }
}

/// Vacuum purchases trust the raw total; washes are the sum of their bay
/// lines, which must agree with the raw total.
pub fn compute_total_amount(raw_total: &str, detail: &PurchaseDetail) -> Field<Decimal> {
    match detail {
        PurchaseDetail::Vacuum { .. } => parse_money(raw_total),
        PurchaseDetail::Wash { wash_bay_purchases } => {
            let sum: Decimal = wash_bay_purchases
                .iter()
                .map(|b| b.wash_purchase_total)
                .sum();
            let mut sum = sum.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
            sum.rescale(2);
            Ok(sum)
        }
    }
}

// ---------------------------------------------------------------------------
// TextNormalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    pub grammar: DetailsGrammar,
}

impl Normalizer for TextNormalizer {
    fn normalize(&self, raw: &RawEntry, position: usize) -> Result<Purchase> {
        let label = raw.label(position);
        let fail = |reason: String| SudsError::parse(label.clone(), reason);

        let id = raw.transaction_id.trim();
        if id.is_empty() {
            return Err(fail("missing transaction id".to_string()));
        }
        let transaction_id = id
            .parse::<i64>()
            .map_err(|_| fail(format!("transaction id {id:?} is not an integer")))?;
        let (purchase_date, purchase_time) = parse_datetime(&raw.datetime).map_err(fail)?;
        let (cardholder_name, cardholder_last4) =
            parse_cardholder(&raw.cardholder).map_err(fail)?;
        let detail = self
            .grammar
            .parse_details_text(&raw.details_text)
            .map_err(fail)?;
        let total_amount = compute_total_amount(&raw.total, &detail).map_err(fail)?;

        if let PurchaseDetail::Wash { .. } = detail {
            let raw_total = parse_money(&raw.total).map_err(fail)?;
            if raw_total != total_amount {
                return Err(SudsError::Integrity(format!(
                    "transaction {transaction_id}: bay lines sum to {total_amount} but source total is {raw_total}"
                )));
            }
        }

        let purchase = Purchase {
            transaction_id,
            purchase_date,
            purchase_time,
            cardholder_name,
            cardholder_last4,
            total_amount,
            detail,
        };
        purchase.validate()?;
        Ok(purchase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PurchaseType;
    use rust_decimal_macros::dec;

    fn raw(id: &str, total: &str, details: &str) -> RawEntry {
        RawEntry {
            transaction_id: id.into(),
            datetime: "11/26/2025, 9:32 PM".into(),
            cardholder: "EMV-TAP (0420)".into(),
            total: total.into(),
            details_text: details.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_datetime() {
        let (d, t) = parse_datetime("11/26/2025, 9:32 PM").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 11, 26).unwrap());
        assert_eq!(t, NaiveTime::from_hms_opt(21, 32, 0).unwrap());
        let (_, t) = parse_datetime("01/02/2025, 12:05 AM").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(0, 5, 0).unwrap());
    }

    #[test]
    fn test_parse_datetime_is_strict() {
        assert!(parse_datetime("2025-11-26 21:32").is_err());
        assert!(parse_datetime("11/26/2025 9:32 PM").is_err());
        assert!(parse_datetime("13/26/2025, 9:32 PM").is_err());
        assert!(parse_datetime("").is_err());
    }

    #[test]
    fn test_parse_cardholder_keeps_leading_zeros() {
        assert_eq!(
            parse_cardholder("EMV-TAP (0420)").unwrap(),
            ("EMV-TAP".to_string(), "0420".to_string())
        );
        assert_eq!(
            parse_cardholder("JANE Q DOE ( 0007 )").unwrap(),
            ("JANE Q DOE".to_string(), "0007".to_string())
        );
        assert!(parse_cardholder("NO CARD").is_err());
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("$3,200.75").unwrap(), dec!(3200.75));
        assert_eq!(parse_money("$0.05").unwrap(), dec!(0.05));
        assert_eq!(parse_money("$5").unwrap().to_string(), "5.00");
        assert_eq!(parse_money("$0.05").unwrap().scale(), 2);
        assert!(parse_money("five dollars").is_err());
        assert!(parse_money("").is_err());
    }

    #[test]
    fn test_parse_money_rounds_half_even() {
        assert_eq!(parse_money("$1.005").unwrap(), dec!(1.00));
        assert_eq!(parse_money("$1.015").unwrap(), dec!(1.02));
    }

    #[test]
    fn test_details_vacuum() {
        let g = DetailsGrammar::default();
        let d = g.parse_details_text("Vac\t(vacuum 2)\t$1.50").unwrap();
        assert_eq!(d, PurchaseDetail::Vacuum { vacuum_number: 2 });
    }

    #[test]
    fn test_details_multiple_bays() {
        let g = DetailsGrammar::default();
        let text = "Transaction ID: 99\n\nWash Bay\t(bay 5)\t$3.75\nWash Bay\t(bay 2)\t$1,000.00\n";
        let d = g.parse_details_text(text).unwrap();
        let PurchaseDetail::Wash { wash_bay_purchases } = d else {
            panic!("expected wash");
        };
        assert_eq!(wash_bay_purchases.len(), 2);
        assert_eq!(wash_bay_purchases[0].bay_number, 5);
        assert_eq!(wash_bay_purchases[1].wash_purchase_total, dec!(1000.00));
    }

    #[test]
    fn test_details_classification_is_exclusive() {
        let g = DetailsGrammar::default();
        for text in [
            "Vac\t(vacuum 1)\t$1.00",
            "Wash Bay\t(bay 1)\t$2.00",
            "Vac\t(vacuum 4)\t$1.00\nWash Bay\t(bay 1)\t$2.00",
            "Wash Bay\t(bay 6)\t$2.00\nWash Bay\t(bay 7)\t$2.00",
        ] {
            match g.parse_details_text(text).unwrap() {
                PurchaseDetail::Vacuum { vacuum_number } => assert!(vacuum_number > 0),
                PurchaseDetail::Wash { wash_bay_purchases } => {
                    assert!(!wash_bay_purchases.is_empty())
                }
            }
        }
    }

    #[test]
    fn test_details_unknown_shape() {
        let g = DetailsGrammar::default();
        let err = g.parse_details_text("Soap\t(dispenser 1)\t$1.00").unwrap_err();
        assert!(err.contains("unknown details shape"));
        assert_eq!(g.parse_details_text("  \n ").unwrap_err(), "empty details text");
    }

    #[test]
    fn test_details_bay_without_money() {
        let g = DetailsGrammar::default();
        let err = g.parse_details_text("Wash Bay\t(bay 3)\tpending").unwrap_err();
        assert!(err.contains("no amount"));
    }

    #[test]
    fn test_custom_grammar() {
        let g = DetailsGrammar {
            vacuum_marker: "Vacuum".into(),
            wash_marker: "Bay".into(),
        };
        let d = g.parse_details_text("Bay\t(bay 4)\t$2.25").unwrap();
        assert_eq!(d.purchase_type(), PurchaseType::Wash);
    }

    #[test]
    fn test_normalize_wash() {
        let n = TextNormalizer::default();
        let p = n
            .normalize(&raw("2", "$5.00", "Wash Bay\t(bay 3)\t$5.00"), 0)
            .unwrap();
        assert_eq!(p.transaction_id, 2);
        assert_eq!(p.total_amount, dec!(5.00));
        assert_eq!(p.cardholder_last4, "0420");
        assert_eq!(p.wash_bay_purchases()[0].bay_number, 3);
    }

    #[test]
    fn test_normalize_vacuum_uses_raw_total() {
        let n = TextNormalizer::default();
        let p = n
            .normalize(&raw("1", "$1.50", "Vac\t(vacuum 2)\t$1.25"), 0)
            .unwrap();
        assert_eq!(p.total_amount, dec!(1.50));
        assert_eq!(p.vacuum_number(), Some(2));
    }

    #[test]
    fn test_normalize_flags_wash_total_mismatch() {
        let n = TextNormalizer::default();
        let err = n
            .normalize(
                &raw("3", "$9.00", "Wash Bay\t(bay 3)\t$5.00\nWash Bay\t(bay 4)\t$3.00"),
                0,
            )
            .unwrap_err();
        match err {
            SudsError::Integrity(msg) => assert!(msg.contains("transaction 3")),
            other => panic!("expected integrity error, got {other}"),
        }
    }

    #[test]
    fn test_normalize_rejects_out_of_range_bay() {
        let n = TextNormalizer::default();
        for bay in ["0", "8", "9", "300"] {
            let details = format!("Wash Bay\t(bay {bay})\t$2.00");
            match n.normalize(&raw("4", "$2.00", &details), 0).unwrap_err() {
                SudsError::Parse { record, reason } => {
                    assert_eq!(record, "4");
                    assert!(reason.contains("bay number"), "{reason}");
                }
                other => panic!("expected parse error for bay {bay}, got {other}"),
            }
        }
    }

    #[test]
    fn test_normalize_rejects_out_of_range_vacuum() {
        let n = TextNormalizer::default();
        for vacuum in ["0", "7", "9", "300"] {
            let details = format!("Vac\t(vacuum {vacuum})\t$1.00");
            match n.normalize(&raw("5", "$1.00", &details), 0).unwrap_err() {
                SudsError::Parse { record, reason } => {
                    assert_eq!(record, "5");
                    assert!(reason.contains("vacuum number"), "{reason}");
                }
                other => panic!("expected parse error for vacuum {vacuum}, got {other}"),
            }
        }
        assert!(n.normalize(&raw("5", "$1.00", "Vac\t(vacuum 6)\t$1.00"), 0).is_ok());
    }

    #[test]
    fn test_normalize_empty_details_names_record() {
        let n = TextNormalizer::default();
        let err = n.normalize(&raw("77", "$1.00", ""), 5).unwrap_err();
        match err {
            SudsError::Parse { record, reason } => {
                assert_eq!(record, "77");
                assert_eq!(reason, "empty details text");
            }
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn test_normalize_missing_id_uses_position() {
        let n = TextNormalizer::default();
        let err = n
            .normalize(&raw("", "$1.00", "Vac\t(vacuum 1)\t$1.00"), 12)
            .unwrap_err();
        match err {
            SudsError::Parse { record, .. } => assert!(record.starts_with("#12")),
            other => panic!("expected parse error, got {other}"),
        }
    }
}
