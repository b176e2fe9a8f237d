//! Input checks for ids, file names and notes.
//!
//! The store accepts any string; everything that reaches it from the
//! network passes through here first.

use rand::Rng;
use thiserror::Error;
use uploader_core::RecordId;

/// Length of generated record ids
pub const RECORD_ID_LEN: usize = 10;

/// Characters used in record ids (no 0/O, 1/l/I)
pub const RECORD_ID_ALPHABET: &[u8] = b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Maximum note length in bytes
pub const MAX_NOTE_LEN: usize = 500;

/// Maximum file name length in bytes
pub const MAX_FILE_NAME_LEN: usize = 255;

const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', '<', '>', ':', '"', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Rejected user input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid record id")]
    InvalidId,

    #[error("File name is required")]
    EmptyFilename,

    #[error("File name is longer than {MAX_FILE_NAME_LEN} bytes")]
    FilenameTooLong,

    #[error("File name must not start with a dot")]
    HiddenFilename,

    #[error("File name contains an illegal character: {0:?}")]
    IllegalCharacter(char),

    #[error("File name must not end with a space or a dot")]
    TrailingSpaceOrDot,

    #[error("File name is reserved: {0}")]
    ReservedName(String),

    #[error("Note is longer than {MAX_NOTE_LEN} bytes")]
    NoteTooLong,

    #[error("Note is not a valid value")]
    InvalidNote,

    #[error("Note contains markup that is not allowed")]
    UnsafeNote,
}

/// Mint a fresh record id
pub fn generate_record_id() -> RecordId {
    let mut rng = rand::thread_rng();
    let id: String = (0..RECORD_ID_LEN)
        .map(|_| RECORD_ID_ALPHABET[rng.gen_range(0..RECORD_ID_ALPHABET.len())] as char)
        .collect();
    RecordId::new(id)
}

/// Accept only ids this server could have generated
pub fn parse_record_id(raw: &str) -> Result<RecordId, ValidationError> {
    if raw.len() != RECORD_ID_LEN || !raw.bytes().all(|b| RECORD_ID_ALPHABET.contains(&b)) {
        return Err(ValidationError::InvalidId);
    }
    Ok(RecordId::from(raw))
}

/// Check a file name is safe to store and to hand back in a header
pub fn validate_filename(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyFilename);
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(ValidationError::FilenameTooLong);
    }
    // Covers "." and ".." too
    if name.starts_with('.') {
        return Err(ValidationError::HiddenFilename);
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || ILLEGAL_FILENAME_CHARS.contains(c))
    {
        return Err(ValidationError::IllegalCharacter(c));
    }
    if name.ends_with(' ') || name.ends_with('.') {
        return Err(ValidationError::TrailingSpaceOrDot);
    }

    let stem = name.split('.').next().unwrap_or(name).trim_end();
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return Err(ValidationError::ReservedName(stem.to_string()));
    }

    Ok(())
}

/// Check a note. Empty notes are fine.
pub fn validate_note(note: &str) -> Result<(), ValidationError> {
    if note.len() > MAX_NOTE_LEN {
        return Err(ValidationError::NoteTooLong);
    }
    if note == "null" || note == "undefined" {
        return Err(ValidationError::InvalidNote);
    }

    let lower = note.to_ascii_lowercase();
    if ["<script", "</script", "<iframe", "</iframe"]
        .iter()
        .any(|tag| lower.contains(tag))
    {
        return Err(ValidationError::UnsafeNote);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_parse() {
        for _ in 0..100 {
            let id = generate_record_id();
            assert_eq!(id.as_str().len(), RECORD_ID_LEN);
            assert_eq!(parse_record_id(id.as_str()).unwrap(), id);
        }
    }

    #[test]
    fn test_bad_ids() {
        for raw in ["", "short", "abcdefghijk", "abcdefghi0", "abcdefghI1", "abc/efghij"] {
            assert_eq!(parse_record_id(raw), Err(ValidationError::InvalidId), "{raw:?}");
        }
    }

    #[test]
    fn test_valid_filenames() {
        for name in ["report.pdf", "photo 1.jpg", "archive.tar.gz", "Ünïcødé.txt", "CONSOLE.txt"] {
            assert_eq!(validate_filename(name), Ok(()), "{name:?}");
        }
    }

    #[test]
    fn test_invalid_filenames() {
        assert_eq!(validate_filename(""), Err(ValidationError::EmptyFilename));
        assert_eq!(
            validate_filename(&"a".repeat(MAX_FILE_NAME_LEN + 1)),
            Err(ValidationError::FilenameTooLong)
        );
        assert_eq!(validate_filename("."), Err(ValidationError::HiddenFilename));
        assert_eq!(validate_filename(".."), Err(ValidationError::HiddenFilename));
        assert_eq!(validate_filename(".env"), Err(ValidationError::HiddenFilename));
        assert_eq!(
            validate_filename("a/b.txt"),
            Err(ValidationError::IllegalCharacter('/'))
        );
        assert_eq!(
            validate_filename("tab\there"),
            Err(ValidationError::IllegalCharacter('\t'))
        );
        assert_eq!(
            validate_filename("what?.txt"),
            Err(ValidationError::IllegalCharacter('?'))
        );
        assert_eq!(validate_filename("name "), Err(ValidationError::TrailingSpaceOrDot));
        assert_eq!(validate_filename("name."), Err(ValidationError::TrailingSpaceOrDot));
        assert_eq!(
            validate_filename("con.txt"),
            Err(ValidationError::ReservedName("con".into()))
        );
        assert_eq!(
            validate_filename("LPT9"),
            Err(ValidationError::ReservedName("LPT9".into()))
        );
    }

    #[test]
    fn test_notes() {
        assert_eq!(validate_note(""), Ok(()));
        assert_eq!(validate_note("quarterly numbers"), Ok(()));
        assert_eq!(validate_note(&"x".repeat(MAX_NOTE_LEN)), Ok(()));
        assert_eq!(
            validate_note(&"x".repeat(MAX_NOTE_LEN + 1)),
            Err(ValidationError::NoteTooLong)
        );
        assert_eq!(validate_note("null"), Err(ValidationError::InvalidNote));
        assert_eq!(validate_note("undefined"), Err(ValidationError::InvalidNote));
        assert_eq!(
            validate_note("hi <SCRIPT>alert(1)</SCRIPT>"),
            Err(ValidationError::UnsafeNote)
        );
        assert_eq!(
            validate_note("<iframe src=x>"),
            Err(ValidationError::UnsafeNote)
        );
    }
}
