use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Date, Month, format_description::BorrowedFormatItem, macros::format_description};

use crate::UnknownVariant;

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
	#[default]
	New,
	MarkedForReview,
	Excluded,
}
impl ResultStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::New => "new",
			Self::MarkedForReview => "marked_for_review",
			Self::Excluded => "excluded",
		}
	}
}
impl fmt::Display for ResultStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for ResultStatus {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"new" => Ok(Self::New),
			"marked_for_review" => Ok(Self::MarkedForReview),
			"excluded" => Ok(Self::Excluded),
			other => Err(UnknownVariant { kind: "result status", value: other.to_string() }),
		}
	}
}

/// Trims a portal document number; blank numbers identify nothing and are dropped.
pub fn normalize_document_number(raw: &str) -> Option<String> {
	let trimmed = raw.trim();

	if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Parses the recording dates portals emit.
///
/// Accepts `YYYY-MM-DD` (optionally followed by a time part) and US style `MM/DD/YYYY`. Anything
/// else yields `None` so the row is kept with an unknown date.
pub fn parse_recording_date(raw: &str) -> Option<Date> {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return None;
	}
	if let Some(date) = trimmed.get(..10).and_then(|head| Date::parse(head, ISO_DATE).ok()) {
		return Some(date);
	}

	parse_us_date(trimmed)
}

fn parse_us_date(raw: &str) -> Option<Date> {
	let mut parts = raw.split('/');
	let month = parts.next()?.trim().parse::<u8>().ok()?;
	let day = parts.next()?.trim().parse::<u8>().ok()?;
	let year = parts.next()?.trim().parse::<i32>().ok()?;

	if parts.next().is_some() || !(1000..=9999).contains(&year) {
		return None;
	}

	let month = Month::try_from(month).ok()?;

	Date::from_calendar_date(year, month, day).ok()
}
