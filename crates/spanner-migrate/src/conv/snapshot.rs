//! JSON session snapshots of the conversion state.
//!
//! [`Conv::to_json`]/[`Conv::from_json`] are the plain round trip.
//! [`Session`] wraps a state with the configuration hash it was produced
//! under and an HMAC signature, so a resumed run can detect both a changed
//! configuration and an edited file.

use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use super::Conv;
use crate::error::{MigrateError, Result};

type HmacSha256 = Hmac<Sha256>;

impl Conv {
    /// Serialize the state as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore a state from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save the state to a file (atomic write).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomic(path.as_ref(), &self.to_json()?)
    }

    /// Load a state saved with [`Conv::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    // Write to a temp file, then rename over the target.
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// A saved migration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub session_id: String,

    /// SHA256 hash of the configuration the state was built with.
    pub config_hash: String,

    /// When the session was last saved.
    pub saved_at: DateTime<Utc>,

    /// The conversion state.
    pub conv: Conv,

    /// HMAC-SHA256 over the serialized session (excluding this field),
    /// keyed by `config_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl Session {
    pub fn new(conv: Conv, config_hash: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            config_hash: config_hash.into(),
            saved_at: Utc::now(),
            conv,
            hmac: None,
        }
    }

    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;
        let content = serde_json::to_string(&unsigned)?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::Session(format!("HMAC key error: {}", e)))?;
        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Save the session (atomic write with HMAC).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.saved_at = Utc::now();
        self.hmac = None;
        self.hmac = Some(self.compute_hmac()?);
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path.as_ref(), &content)
    }

    /// Load a session, validating its HMAC when present.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let session: Self = serde_json::from_str(&content)?;

        match &session.hmac {
            Some(stored) => {
                if stored != &session.compute_hmac()? {
                    return Err(MigrateError::Session(
                        "Session file integrity check failed: HMAC mismatch".to_string(),
                    ));
                }
            }
            None => warn!("Session file has no HMAC signature, integrity cannot be verified"),
        }

        Ok(session)
    }

    /// Check that the session was produced under the same configuration.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::Session(
                "Configuration changed since the session was saved".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::{SchemaIssue, SyntheticPk};
    use crate::target::schema::{Sequence, TargetDialect};
    use crate::typemap::SourceDialect;
    use tempfile::NamedTempFile;

    fn sample_conv() -> Conv {
        let mut conv = Conv::new(SourceDialect::Postgres, TargetDialect::PostgreSql);
        let t = conv.next_id("t");
        conv.add_table_issue(&t, SchemaIssue::MissingPrimaryKey);
        let pk_col = conv.next_id("c");
        conv.synthetic_pks.insert(
            t.clone(),
            SyntheticPk {
                col_id: pk_col,
                sequence: 42,
            },
        );
        let id_col = conv.next_id("c");
        conv.add_column_issue(&t, &id_col, SchemaIssue::AutoIncrement);
        conv.sequences.insert(
            format!("{}_seq", id_col),
            Sequence {
                id: format!("{}_seq", id_col),
                name: "users_id_seq".to_string(),
                kind: "bit_reversed_positive".to_string(),
                start_with: Some(1000),
            },
        );
        conv.set_row_count("users", 10);
        conv
    }

    #[test]
    fn test_json_round_trip() {
        let conv = sample_conv();
        let restored = Conv::from_json(&conv.to_json().unwrap()).unwrap();
        assert_eq!(restored, conv);
        assert_eq!(restored.sequences["c3_seq"].start_with, Some(1000));
        assert!(restored
            .column_issues("t1", "c3")
            .contains(&SchemaIssue::AutoIncrement));
    }

    #[test]
    fn test_save_load() {
        let conv = sample_conv();
        let file = NamedTempFile::new().unwrap();
        conv.save(file.path()).unwrap();
        assert_eq!(Conv::load(file.path()).unwrap(), conv);
    }

    #[test]
    fn test_session_save_load() {
        let mut session = Session::new(sample_conv(), "abc123");
        let file = NamedTempFile::new().unwrap();
        session.save(file.path()).unwrap();

        let loaded = Session::load(file.path()).unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.conv, session.conv);
        assert!(loaded.validate_config("abc123").is_ok());
        assert!(loaded.validate_config("different").is_err());
    }

    #[test]
    fn test_session_tamper_detected() {
        let mut session = Session::new(sample_conv(), "abc123");
        let file = NamedTempFile::new().unwrap();
        session.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let tampered = content.replace("\"sequence\": 42", "\"sequence\": 0");
        assert_ne!(content, tampered);
        std::fs::write(file.path(), tampered).unwrap();

        let err = Session::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("HMAC mismatch"));
    }
}
