//! Record normalization and validation
//!
//! Maps a raw record (header → value) onto the canonical report fields using
//! ordered alias lists, then validates the result. Every problem found in a
//! record is reported, not just the first one.
//!
//! Pure and deterministic: no I/O, no clock.

use std::collections::HashMap;

use crate::models::Report;

/// One parsed source record: column header → cell text
pub type RawRecord = HashMap<String, String>;

pub const MISSING_ORGANIZATION: &str = "Missing NGO ID";
pub const MISSING_MONTH: &str = "Missing month";
pub const MALFORMED_MONTH: &str = "Month must be YYYY-MM";

/// Canonical report fields and the headers accepted for each, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    OrganizationId,
    Month,
    PeopleHelped,
    EventsConducted,
    FundsUtilized,
}

impl Field {
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::OrganizationId => &[
                "ngo_id",
                "NGO_ID",
                "ngoId",
                "NGO ID",
                "organization_id",
                "organizationId",
                "Organization ID",
            ],
            Field::Month => &["month", "Month", "MONTH"],
            Field::PeopleHelped => &[
                "people_helped",
                "peopleHelped",
                "People_Helped",
                "People Helped",
            ],
            Field::EventsConducted => &[
                "events_conducted",
                "eventsConducted",
                "Events_Conducted",
                "Events Conducted",
            ],
            Field::FundsUtilized => &[
                "funds_utilized",
                "fundsUtilized",
                "Funds_Utilized",
                "Funds Utilized",
            ],
        }
    }

    /// Name used in validation messages
    pub fn label(&self) -> &'static str {
        match self {
            Field::OrganizationId => "organization_id",
            Field::Month => "month",
            Field::PeopleHelped => "people_helped",
            Field::EventsConducted => "events_conducted",
            Field::FundsUtilized => "funds_utilized",
        }
    }

    /// First alias with a non-empty value
    pub fn lookup<'a>(&self, record: &'a RawRecord) -> Option<&'a str> {
        self.aliases()
            .iter()
            .filter_map(|alias| record.get(*alias))
            .map(String::as_str)
            .find(|value| !value.trim().is_empty())
    }
}

/// Canonical form of one record plus everything wrong with it
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    /// Trimmed; empty when absent
    pub organization_id: String,
    /// Trimmed; empty when absent
    pub month: String,
    pub people_helped: f64,
    pub events_conducted: f64,
    pub funds_utilized: f64,
    pub errors: Vec<String>,
}

impl NormalizedRow {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Report for a valid row, or the row's errors
    pub fn into_report(self) -> Result<Report, Vec<String>> {
        if !self.is_valid() {
            return Err(self.errors);
        }
        Ok(Report {
            organization_id: self.organization_id,
            month: self.month,
            people_helped: self.people_helped,
            events_conducted: self.events_conducted,
            funds_utilized: self.funds_utilized,
        })
    }
}

/// `YYYY-MM` with ASCII digits; the month number itself is not range-checked
pub fn is_month_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

/// Parse an optional amount; absent or blank means 0
fn parse_amount(value: Option<&str>, field: Field, errors: &mut Vec<String>) -> f64 {
    let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) else {
        return 0.0;
    };

    match text.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => n,
        _ => {
            errors.push(format!("{} must be a non-negative number", field.label()));
            0.0
        }
    }
}

/// Normalize and validate one raw record
pub fn normalize(record: &RawRecord) -> NormalizedRow {
    let mut errors = Vec::new();

    let organization_id = Field::OrganizationId
        .lookup(record)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if organization_id.is_empty() {
        errors.push(MISSING_ORGANIZATION.to_string());
    }

    let month = Field::Month
        .lookup(record)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if month.is_empty() {
        errors.push(MISSING_MONTH.to_string());
    }
    if !is_month_shape(&month) {
        errors.push(MALFORMED_MONTH.to_string());
    }

    let people_helped = parse_amount(Field::PeopleHelped.lookup(record), Field::PeopleHelped, &mut errors);
    let events_conducted =
        parse_amount(Field::EventsConducted.lookup(record), Field::EventsConducted, &mut errors);
    let funds_utilized = parse_amount(Field::FundsUtilized.lookup(record), Field::FundsUtilized, &mut errors);

    NormalizedRow {
        organization_id,
        month,
        people_helped,
        events_conducted,
        funds_utilized,
        errors,
    }
}
