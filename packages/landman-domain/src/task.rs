use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::UnknownVariant;

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 10;
pub const DEFAULT_PRIORITY: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
	Queued,
	Running,
	Completed,
	Paused,
	Failed,
}
impl TaskStatus {
	pub const ALL: [Self; 5] =
		[Self::Queued, Self::Running, Self::Completed, Self::Paused, Self::Failed];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Paused => "paused",
			Self::Failed => "failed",
		}
	}

	/// Completed and failed tasks keep their search parameters frozen.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}
}
impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for TaskStatus {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|status| status.as_str() == value)
			.ok_or_else(|| UnknownVariant { kind: "task status", value: value.to_string() })
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
	Grantor,
	Grantee,
	#[default]
	Both,
}
impl PartyRole {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Grantor => "grantor",
			Self::Grantee => "grantee",
			Self::Both => "both",
		}
	}
}
impl fmt::Display for PartyRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for PartyRole {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"grantor" => Ok(Self::Grantor),
			"grantee" => Ok(Self::Grantee),
			"both" => Ok(Self::Both),
			other => Err(UnknownVariant { kind: "party role", value: other.to_string() }),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskRuleError {
	#[error("priority must be between 1 and 10, got {0}.")]
	PriorityOutOfRange(i32),
	#[error("date_from must be on or before date_to.")]
	InvalidDateRange,
	#[error("Cannot move a task from {from} to {to}.")]
	IllegalTransition { from: TaskStatus, to: TaskStatus },
	#[error("Tasks in status {0} cannot be edited.")]
	NotEditable(TaskStatus),
	#[error("Only queued tasks can be deleted; task is {0}.")]
	NotDeletable(TaskStatus),
}
impl TaskRuleError {
	/// Rejections caused by the task's current state rather than the request payload.
	pub fn is_conflict(self) -> bool {
		matches!(
			self,
			Self::IllegalTransition { .. } | Self::NotEditable(_) | Self::NotDeletable(_)
		)
	}
}

pub fn validate_priority(priority: i32) -> Result<i32, TaskRuleError> {
	if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
		Ok(priority)
	} else {
		Err(TaskRuleError::PriorityOutOfRange(priority))
	}
}

pub fn validate_date_range(date_from: Date, date_to: Date) -> Result<(), TaskRuleError> {
	if date_from > date_to {
		return Err(TaskRuleError::InvalidDateRange);
	}

	Ok(())
}

/// Transitions the worker drives while executing a claimed task.
pub fn check_scheduler_transition(from: TaskStatus, to: TaskStatus) -> Result<(), TaskRuleError> {
	match (from, to) {
		(TaskStatus::Queued, TaskStatus::Running)
		| (TaskStatus::Running, TaskStatus::Completed)
		| (TaskStatus::Running, TaskStatus::Failed) => Ok(()),
		_ => Err(TaskRuleError::IllegalTransition { from, to }),
	}
}

/// Transitions a task owner may request.
///
/// Owners can pause and resume queued work and re-queue finished or failed tasks. A running task
/// belongs to the worker until it reaches a terminal state.
pub fn check_user_override(from: TaskStatus, to: TaskStatus) -> Result<(), TaskRuleError> {
	let allowed = match to {
		TaskStatus::Queued => !matches!(from, TaskStatus::Running),
		TaskStatus::Paused => matches!(from, TaskStatus::Queued | TaskStatus::Paused),
		TaskStatus::Running | TaskStatus::Completed | TaskStatus::Failed => false,
	};

	if allowed { Ok(()) } else { Err(TaskRuleError::IllegalTransition { from, to }) }
}

pub fn check_editable(status: TaskStatus) -> Result<(), TaskRuleError> {
	if status.is_terminal() {
		return Err(TaskRuleError::NotEditable(status));
	}

	Ok(())
}

pub fn check_deletable(status: TaskStatus) -> Result<(), TaskRuleError> {
	if status != TaskStatus::Queued {
		return Err(TaskRuleError::NotDeletable(status));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_strings_round_trip() {
		for status in TaskStatus::ALL {
			assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
		}

		assert!("cancelled".parse::<TaskStatus>().is_err());
	}
}
