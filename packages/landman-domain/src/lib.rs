//! Pure rules of the discovery pipeline: status vocabularies, task state machine checks, result
//! normalization, and parsing of assessment responses.

pub mod assessment;
pub mod result;
pub mod review;
pub mod task;

/// Returned when a stored or requested status string is not part of a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value {value:?}.")]
pub struct UnknownVariant {
	pub kind: &'static str,
	pub value: String,
}
