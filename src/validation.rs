//! Input validation for the Mutation API.
//!
//! Drafts and patches arrive from forms or deserialized commands. Everything
//! here runs before the store is touched, so a rejected command never leaves
//! a partial write behind.

use crate::bus::{Bus, BusDraft, BusPatch};
use crate::error::ValidationError;
use crate::presence::PresenceState;
use crate::student::{Student, StudentDraft, StudentPatch};

/// Conservative upper bound for free-form text fields.
pub const MAX_TEXT_LEN: usize = 4 * 1024;

/// Upper bound for caller-supplied ids.
pub const MAX_ID_LEN: usize = 128;

fn validate_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        return Err(ValidationError::FieldTooLong {
            field: field.to_string(),
            max_length: max,
        });
    }
    Ok(())
}

/// Validate a non-empty trimmed string field.
fn validate_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }
    validate_len(field, value, MAX_TEXT_LEN)
}

fn validate_optional_non_empty(field: &'static str, value: Option<&String>) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |v| validate_non_empty(field, v))
}

fn validate_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }
    validate_len(field, value, MAX_ID_LEN)
}

/// Validate a bus draft.
pub fn validate_bus_draft(draft: &BusDraft) -> Result<(), ValidationError> {
    if let Some(id) = &draft.id {
        validate_id("id", id.as_str())?;
    }
    validate_non_empty("name", &draft.name)?;
    validate_non_empty("driver_name", &draft.driver_name)?;
    draft.location.validate()
}

/// Validate a bus patch.
pub fn validate_bus_patch(patch: &BusPatch) -> Result<(), ValidationError> {
    validate_optional_non_empty("name", patch.name.as_ref())?;
    validate_optional_non_empty("driver_name", patch.driver_name.as_ref())?;
    patch.location.map_or(Ok(()), |l| l.validate())
}

/// Validate a student draft.
pub fn validate_student_draft(draft: &StudentDraft) -> Result<(), ValidationError> {
    if let Some(id) = &draft.id {
        validate_id("id", id.as_str())?;
    }
    validate_non_empty("name", &draft.name)?;
    validate_non_empty("address", &draft.address)?;
    validate_id("bus_id", draft.bus_id.as_str())?;
    if let Some(link) = &draft.maps_link {
        validate_len("maps_link", link, MAX_TEXT_LEN)?;
    }
    draft.location.validate()
}

/// Validate a student patch.
pub fn validate_student_patch(patch: &StudentPatch) -> Result<(), ValidationError> {
    validate_optional_non_empty("name", patch.name.as_ref())?;
    validate_optional_non_empty("address", patch.address.as_ref())?;
    validate_optional_non_empty("maps_link", patch.maps_link.as_ref())?;
    if let Some(bus_id) = &patch.bus_id {
        validate_id("bus_id", bus_id.as_str())?;
    }
    patch.location.map_or(Ok(()), |l| l.validate())
}

/// Validate a complete bus record, as found in an imported snapshot.
pub fn validate_bus(bus: &Bus) -> Result<(), ValidationError> {
    validate_id("id", bus.id.as_str())?;
    validate_non_empty("name", &bus.name)?;
    validate_non_empty("driver_name", &bus.driver_name)?;
    bus.location.validate()
}

/// Validate a complete student record, including its presence pair.
pub fn validate_student(student: &Student) -> Result<(), ValidationError> {
    validate_id("id", student.id.as_str())?;
    validate_non_empty("name", &student.name)?;
    validate_non_empty("address", &student.address)?;
    validate_id("bus_id", student.bus_id.as_str())?;
    validate_len("maps_link", &student.maps_link, MAX_TEXT_LEN)?;
    student.location.validate()?;
    PresenceState::of(student).map(|_| ())
}
