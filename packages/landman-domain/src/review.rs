use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
	MeetsCriteria,
	ProbableMatch,
	Exclude,
	#[default]
	Pending,
}
impl Assessment {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::MeetsCriteria => "meets_criteria",
			Self::ProbableMatch => "probable_match",
			Self::Exclude => "exclude",
			Self::Pending => "pending",
		}
	}

	pub fn is_analyzed(self) -> bool {
		self != Self::Pending
	}
}
impl fmt::Display for Assessment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Assessment {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"meets_criteria" => Ok(Self::MeetsCriteria),
			"probable_match" => Ok(Self::ProbableMatch),
			"exclude" => Ok(Self::Exclude),
			"pending" => Ok(Self::Pending),
			other => Err(UnknownVariant { kind: "assessment", value: other.to_string() }),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
	Approved,
	Rejected,
	NeedsReview,
}
impl Decision {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Approved => "approved",
			Self::Rejected => "rejected",
			Self::NeedsReview => "needs_review",
		}
	}
}
impl fmt::Display for Decision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Decision {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"approved" => Ok(Self::Approved),
			"rejected" => Ok(Self::Rejected),
			"needs_review" => Ok(Self::NeedsReview),
			other => Err(UnknownVariant { kind: "decision", value: other.to_string() }),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadProgress {
	InProgress,
	Complete,
}

/// An explicit flag wins; otherwise approval implies a download.
pub fn resolve_download_mark(decision: Decision, explicit: Option<bool>) -> bool {
	explicit.unwrap_or(decision == Decision::Approved)
}

pub fn analysis_complete(analyzed: i64, total: i64) -> bool {
	total > 0 && analyzed == total
}

pub fn download_progress(downloaded: i64, total_marked: i64) -> DownloadProgress {
	if downloaded == total_marked {
		DownloadProgress::Complete
	} else {
		DownloadProgress::InProgress
	}
}
