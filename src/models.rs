use std::ops::RangeInclusive;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SudsError};

pub const BAY_NUMBERS: RangeInclusive<u8> = 1..=7;
pub const VACUUM_NUMBERS: RangeInclusive<u8> = 1..=6;

/// One purchase row exactly as the source rendered it. Nothing is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub datetime: String,
    #[serde(default)]
    pub cardholder: String,
    /// Source-side type column; carried through but never interpreted.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub details_text: String,
}

/// Dedup identity for raw entries. The source reuses transaction ids now and
/// then, so the id alone is not enough.
pub type RawKey = (String, String, String, String);

impl RawEntry {
    pub fn key(&self) -> RawKey {
        (
            self.transaction_id.trim().to_string(),
            self.datetime.trim().to_string(),
            self.cardholder.trim().to_string(),
            self.total.trim().to_string(),
        )
    }

    /// Human-readable handle for error messages: the id when there is one,
    /// otherwise the position plus the fields a person would search for.
    pub fn label(&self, index: usize) -> String {
        let id = self.transaction_id.trim();
        if id.is_empty() {
            format!(
                "#{index} ({}, {})",
                self.datetime.trim(),
                self.cardholder.trim()
            )
        } else {
            id.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseType {
    #[serde(rename = "V")]
    Vacuum,
    #[serde(rename = "W")]
    Wash,
}

impl PurchaseType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Vacuum => "V",
            Self::Wash => "W",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "V" => Some(Self::Vacuum),
            "W" => Some(Self::Wash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WashBayPurchase {
    pub bay_number: u8,
    pub wash_purchase_total: Decimal,
}

/// What was bought. A purchase is a vacuum or a set of bay washes, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purchase_type")]
pub enum PurchaseDetail {
    #[serde(rename = "V")]
    Vacuum { vacuum_number: u8 },
    #[serde(rename = "W")]
    Wash {
        wash_bay_purchases: Vec<WashBayPurchase>,
    },
}

impl PurchaseDetail {
    pub fn purchase_type(&self) -> PurchaseType {
        match self {
            Self::Vacuum { .. } => PurchaseType::Vacuum,
            Self::Wash { .. } => PurchaseType::Wash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub transaction_id: i64,
    pub purchase_date: NaiveDate,
    pub purchase_time: NaiveTime,
    pub cardholder_name: String,
    /// Text, so "0420" keeps its leading zero.
    pub cardholder_last4: String,
    pub total_amount: Decimal,
    #[serde(flatten)]
    pub detail: PurchaseDetail,
}

impl Purchase {
    pub fn purchase_type(&self) -> PurchaseType {
        self.detail.purchase_type()
    }

    pub fn vacuum_number(&self) -> Option<u8> {
        match &self.detail {
            PurchaseDetail::Vacuum { vacuum_number } => Some(*vacuum_number),
            PurchaseDetail::Wash { .. } => None,
        }
    }

    pub fn wash_bay_purchases(&self) -> &[WashBayPurchase] {
        match &self.detail {
            PurchaseDetail::Vacuum { .. } => &[],
            PurchaseDetail::Wash { wash_bay_purchases } => wash_bay_purchases,
        }
    }

    /// Checks the invariants every stored purchase must hold.
    pub fn validate(&self) -> Result<()> {
        let id = self.transaction_id;
        match &self.detail {
            PurchaseDetail::Vacuum { vacuum_number } => {
                if !VACUUM_NUMBERS.contains(vacuum_number) {
                    return Err(SudsError::Integrity(format!(
                        "transaction {id}: vacuum number {vacuum_number} outside {}..={}",
                        VACUUM_NUMBERS.start(),
                        VACUUM_NUMBERS.end()
                    )));
                }
            }
            PurchaseDetail::Wash { wash_bay_purchases } => {
                if wash_bay_purchases.is_empty() {
                    return Err(SudsError::Integrity(format!(
                        "transaction {id}: wash purchase without bay lines"
                    )));
                }
                if let Some(bad) = wash_bay_purchases
                    .iter()
                    .find(|b| !BAY_NUMBERS.contains(&b.bay_number))
                {
                    return Err(SudsError::Integrity(format!(
                        "transaction {id}: bay number {} outside {}..={}",
                        bad.bay_number,
                        BAY_NUMBERS.start(),
                        BAY_NUMBERS.end()
                    )));
                }
                let sum: Decimal = wash_bay_purchases
                    .iter()
                    .map(|b| b.wash_purchase_total)
                    .sum();
                if sum.round_dp(2) != self.total_amount.round_dp(2) {
                    return Err(SudsError::Integrity(format!(
                        "transaction {id}: bay totals sum to {sum} but total is {}",
                        self.total_amount
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wash(total: Decimal, bays: &[(u8, Decimal)]) -> Purchase {
        Purchase {
            transaction_id: 7,
            purchase_date: NaiveDate::from_ymd_opt(2025, 11, 26).unwrap(),
            purchase_time: NaiveTime::from_hms_opt(21, 32, 0).unwrap(),
            cardholder_name: "EMV-TAP".into(),
            cardholder_last4: "0420".into(),
            total_amount: total,
            detail: PurchaseDetail::Wash {
                wash_bay_purchases: bays
                    .iter()
                    .map(|(n, t)| WashBayPurchase {
                        bay_number: *n,
                        wash_purchase_total: *t,
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn test_raw_key_trims_fields() {
        let a = RawEntry {
            transaction_id: " 12 ".into(),
            datetime: "11/26/2025, 9:32 PM".into(),
            cardholder: "EMV-TAP (0420)".into(),
            total: "$3.75 ".into(),
            ..Default::default()
        };
        let b = RawEntry {
            transaction_id: "12".into(),
            total: "$3.75".into(),
            ..a.clone()
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_label_falls_back_to_position() {
        let entry = RawEntry {
            datetime: "11/26/2025, 9:32 PM".into(),
            cardholder: "EMV-TAP (0420)".into(),
            ..Default::default()
        };
        assert_eq!(entry.label(4), "#4 (11/26/2025, 9:32 PM, EMV-TAP (0420))");
    }

    #[test]
    fn test_validate_wash_sum_mismatch() {
        let p = wash(dec!(5.00), &[(3, dec!(3.00)), (4, dec!(1.00))]);
        let err = p.validate().unwrap_err();
        assert!(matches!(err, SudsError::Integrity(_)));
    }

    #[test]
    fn test_validate_bay_range() {
        let p = wash(dec!(1.00), &[(8, dec!(1.00))]);
        assert!(p.validate().is_err());
        let ok = wash(dec!(2.50), &[(7, dec!(1.25)), (1, dec!(1.25))]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_json_shape_vacuum() {
        let p = Purchase {
            detail: PurchaseDetail::Vacuum { vacuum_number: 3 },
            total_amount: dec!(1.50),
            ..wash(dec!(0), &[])
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["purchase_type"], "V");
        assert_eq!(json["vacuum_number"], 3);
        assert_eq!(json["cardholder_last4"], "0420");
        assert_eq!(json["purchase_date"], "2025-11-26");
        assert_eq!(json["purchase_time"], "21:32:00");
        assert!(json.get("wash_bay_purchases").is_none());
    }

    #[test]
    fn test_reads_legacy_records_with_both_fields() {
        let json = r#"{
            "transaction_id": 2085361712,
            "purchase_date": "2025-11-26",
            "purchase_time": "22:31:00",
            "cardholder_name": "EMV-TAP",
            "cardholder_last4": "0420",
            "total_amount": 3.75,
            "purchase_type": "W",
            "vacuum_number": null,
            "wash_bay_purchases": [{"bay_number": 5, "wash_purchase_total": 3.75}]
        }"#;
        let p: Purchase = serde_json::from_str(json).unwrap();
        assert_eq!(p.purchase_type(), PurchaseType::Wash);
        assert_eq!(p.wash_bay_purchases()[0].bay_number, 5);
        assert_eq!(p.total_amount, dec!(3.75));
        assert_eq!(p.vacuum_number(), None);
    }
}
