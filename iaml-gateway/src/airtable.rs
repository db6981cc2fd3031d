//! Airtable record shapes and field extraction.
//!
//! Airtable omits empty cells entirely, returns lookup fields as arrays, and
//! may hand back numbers as either integers or floats, so every getter here is
//! lenient about shape and strict about content.

use chrono::NaiveDate;
use iaml_core::calculations::dates::parse_local_date;
use iaml_core::{CouponRecord, DiscountType, Format, GatewayError, SessionRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

pub type Fields = Map<String, Value>;

// Sessions table
pub const SESSION_PROGRAM: &str = "Program Name";
pub const SESSION_FORMAT: &str = "Format";
pub const SESSION_START: &str = "Start Date";
pub const SESSION_END: &str = "End Date";
pub const SESSION_CITY: &str = "City";
pub const SESSION_STATE: &str = "State";
pub const SESSION_VENUE: &str = "Venue";

// Coupons table
pub const COUPON_CODE: &str = "Code";
pub const COUPON_ACTIVE: &str = "Active";
pub const COUPON_EXPIRES: &str = "Expiration Date";
pub const COUPON_AMOUNT: &str = "Discount Amount";
pub const COUPON_TYPE: &str = "Discount Type";

#[derive(Debug, Clone, Deserialize)]
pub struct AirtableRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AirtableList {
    #[serde(default)]
    pub records: Vec<AirtableRecord>,
    pub offset: Option<String>,
}

fn decode_err(
    field: &str,
    detail: impl std::fmt::Display,
) -> GatewayError {
    GatewayError::Decode(format!("field '{field}': {detail}"))
}

/// First scalar of a field, unwrapping single-element lookup arrays.
fn scalar<'a>(
    fields: &'a Fields,
    name: &str,
) -> Option<&'a Value> {
    match fields.get(name)? {
        Value::Array(items) => items.first(),
        Value::Null => None,
        value => Some(value),
    }
}

/// Trimmed text value. Numbers are rendered as text; blanks are `None`.
pub fn get_string(
    fields: &Fields,
    name: &str,
) -> Option<String> {
    let text = match scalar(fields, name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Decimal from an integer, float or numeric string. Missing cells are zero.
pub fn get_decimal(
    fields: &Fields,
    name: &str,
) -> Result<Decimal, GatewayError> {
    match scalar(fields, name) {
        None => Ok(Decimal::ZERO),
        Some(Value::Number(n)) => {
            if let Some(int) = n.as_i64() {
                return Ok(Decimal::from(int));
            }
            let float = n
                .as_f64()
                .ok_or_else(|| decode_err(name, format!("unsupported number {n}")))?;
            Decimal::try_from(float).map_err(|e| decode_err(name, e))
        }
        Some(Value::String(s)) => {
            let cleaned = s.trim().trim_start_matches('$').replace(',', "");
            if cleaned.is_empty() {
                return Ok(Decimal::ZERO);
            }
            cleaned.parse::<Decimal>().map_err(|e| decode_err(name, e))
        }
        Some(other) => Err(decode_err(name, format!("expected a number, got {other}"))),
    }
}

pub fn get_optional_decimal(
    fields: &Fields,
    name: &str,
) -> Result<Option<Decimal>, GatewayError> {
    if scalar(fields, name).is_none() {
        return Ok(None);
    }
    get_decimal(fields, name).map(Some)
}

/// Checkbox value. Airtable leaves unchecked boxes out of the record.
pub fn get_bool(
    fields: &Fields,
    name: &str,
) -> bool {
    match scalar(fields, name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        _ => false,
    }
}

/// Calendar date from a `YYYY-MM-DD` or ISO timestamp cell.
pub fn get_date(
    fields: &Fields,
    name: &str,
) -> Result<Option<NaiveDate>, GatewayError> {
    get_string(fields, name)
        .map(|s| parse_local_date(&s).map_err(|e| decode_err(name, e)))
        .transpose()
}

pub fn session_from_record(record: &AirtableRecord) -> Result<SessionRecord, GatewayError> {
    let f = &record.fields;
    Ok(SessionRecord {
        id: record.id.clone(),
        program: get_string(f, SESSION_PROGRAM),
        format: get_string(f, SESSION_FORMAT).and_then(|s| Format::parse(&s)),
        start_date: get_date(f, SESSION_START)?,
        end_date: get_date(f, SESSION_END)?,
        city: get_string(f, SESSION_CITY),
        state: get_string(f, SESSION_STATE),
        venue: get_string(f, SESSION_VENUE),
    })
}

pub fn coupon_from_record(record: &AirtableRecord) -> Result<CouponRecord, GatewayError> {
    let f = &record.fields;
    let code = get_string(f, COUPON_CODE)
        .ok_or_else(|| decode_err(COUPON_CODE, "missing coupon code"))?;
    let discount_type = match get_string(f, COUPON_TYPE) {
        Some(t) if t.to_ascii_lowercase().starts_with("percent") => DiscountType::Percent,
        _ => DiscountType::Flat,
    };

    Ok(CouponRecord {
        code,
        active: get_bool(f, COUPON_ACTIVE),
        expiration_date: get_date(f, COUPON_EXPIRES)?,
        discount_amount: get_decimal(f, COUPON_AMOUNT)?,
        discount_type,
    })
}

/// Escapes a value for use inside a single-quoted Airtable formula string.
pub fn formula_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    // get_decimal tests

    #[test]
    fn test_get_decimal_from_integer() {
        let f = fields(json!({ "Discount Amount": 500 }));
        assert_eq!(get_decimal(&f, "Discount Amount"), Ok(dec!(500)));
    }

    #[test]
    fn test_get_decimal_from_float() {
        let f = fields(json!({ "Discount Amount": 12.5 }));
        assert_eq!(get_decimal(&f, "Discount Amount"), Ok(dec!(12.5)));
    }

    #[test]
    fn test_get_decimal_from_currency_string() {
        let f = fields(json!({ "Discount Amount": "$1,250.00" }));
        assert_eq!(get_decimal(&f, "Discount Amount"), Ok(dec!(1250.00)));
    }

    #[test]
    fn test_get_decimal_missing_returns_zero() {
        let f = fields(json!({}));
        assert_eq!(get_decimal(&f, "Discount Amount"), Ok(Decimal::ZERO));
    }

    #[test]
    fn test_get_decimal_rejects_text() {
        let f = fields(json!({ "Discount Amount": "lots" }));
        assert!(matches!(get_decimal(&f, "Discount Amount"), Err(GatewayError::Decode(_))));
    }

    // get_optional_decimal tests

    #[test]
    fn test_get_optional_decimal_null_is_none() {
        let f = fields(json!({ "Discount Amount": null }));
        assert_eq!(get_optional_decimal(&f, "Discount Amount"), Ok(None));
    }

    #[test]
    fn test_get_optional_decimal_present() {
        let f = fields(json!({ "Discount Amount": 10 }));
        assert_eq!(get_optional_decimal(&f, "Discount Amount"), Ok(Some(dec!(10))));
    }

    // other getters

    #[test]
    fn test_get_string_unwraps_lookup_arrays() {
        let f = fields(json!({ "Program Name": ["Certificate in Employee Relations Law"] }));
        assert_eq!(
            get_string(&f, "Program Name").as_deref(),
            Some("Certificate in Employee Relations Law")
        );
    }

    #[test]
    fn test_get_string_blank_is_none() {
        let f = fields(json!({ "City": "   " }));
        assert_eq!(get_string(&f, "City"), None);
    }

    #[test]
    fn test_get_bool_missing_is_false() {
        let f = fields(json!({ "Active": true }));
        assert!(get_bool(&f, "Active"));
        assert!(!get_bool(&f, "Inactive"));
    }

    #[test]
    fn test_get_date_reads_calendar_part_of_timestamp() {
        let f = fields(json!({ "Start Date": "2025-03-10T00:00:00.000Z" }));
        assert_eq!(
            get_date(&f, "Start Date"),
            Ok(NaiveDate::from_ymd_opt(2025, 3, 10))
        );
    }

    #[test]
    fn test_get_date_invalid() {
        let f = fields(json!({ "Start Date": "next tuesday" }));
        assert!(matches!(get_date(&f, "Start Date"), Err(GatewayError::Decode(_))));
    }

    // record conversion

    #[test]
    fn test_session_from_record() {
        let record: AirtableRecord = serde_json::from_value(json!({
            "id": "recDEN0325",
            "fields": {
                "Program Name": ["Certificate in Employee Relations Law"],
                "Format": "In-Person",
                "Start Date": "2025-03-10",
                "End Date": "2025-03-14",
                "City": "Denver",
                "State": "CO"
            }
        }))
        .unwrap();

        let session = session_from_record(&record).unwrap();

        assert_eq!(session.id, "recDEN0325");
        assert_eq!(session.format, Some(Format::InPerson));
        assert_eq!(session.end_date, NaiveDate::from_ymd_opt(2025, 3, 14));
        assert_eq!(session.venue, None);
        assert_eq!(session.location(), "Denver, CO");
    }

    #[test]
    fn test_coupon_from_record() {
        let record: AirtableRecord = serde_json::from_value(json!({
            "id": "recC1",
            "fields": {
                "Code": "SPRING25",
                "Active": true,
                "Expiration Date": "2025-04-30",
                "Discount Amount": 25,
                "Discount Type": "Percentage"
            }
        }))
        .unwrap();

        let coupon = coupon_from_record(&record).unwrap();

        assert_eq!(
            coupon,
            CouponRecord {
                code: "SPRING25".to_string(),
                active: true,
                expiration_date: NaiveDate::from_ymd_opt(2025, 4, 30),
                discount_amount: dec!(25),
                discount_type: DiscountType::Percent,
            }
        );
    }

    #[test]
    fn test_coupon_without_code_is_decode_error() {
        let record: AirtableRecord =
            serde_json::from_value(json!({ "id": "recC2", "fields": { "Active": true } })).unwrap();

        assert!(matches!(coupon_from_record(&record), Err(GatewayError::Decode(_))));
    }

    #[test]
    fn test_formula_literal_escapes_quotes() {
        assert_eq!(formula_literal("o'brien"), "o\\'brien");
    }
}
