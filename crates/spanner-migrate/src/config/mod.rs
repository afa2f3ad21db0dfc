//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for session validation.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(feature = "postgres")]
impl SourceConfig {
    /// Build a connection string for tokio-postgres.
    pub fn pg_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={}",
            self.host,
            self.effective_port(),
            self.database,
            self.user,
            self.password,
            self.ssl_mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::ConvMode;
    use crate::convert::rules::TransformationRule;
    use crate::target::schema::TargetDialect;
    use crate::typemap::SourceDialect;

    const YAML: &str = r#"
source:
  type: postgres
  host: db.internal
  database: shop
  user: migrator
  password: secret
target:
  dialect: postgresql
  database: shop
writer:
  write_limit: 8
migration:
  mode: schema_only
  interleave: false
  rules:
    - kind: add_shard_id_column
      shard_id: shard-7
"#;

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.r#type, SourceDialect::Postgres);
        assert_eq!(config.source.effective_port(), 5432);
        assert_eq!(config.source.effective_schema(), "public");
        assert_eq!(config.target.dialect, TargetDialect::PostgreSql);
        assert_eq!(config.writer.write_limit, 8);
        assert_eq!(config.writer.mutation_limit, 80_000);
        assert_eq!(config.migration.mode, ConvMode::SchemaOnly);
        assert!(!config.migration.interleave);
        assert_eq!(config.migration.null_marker, "NULL");
        assert!(matches!(
            config.migration.rules[0],
            TransformationRule::AddShardIdColumn { .. }
        ));
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(Config::from_yaml("source: [").is_err());
        let missing_host = YAML.replace("  host: db.internal\n", "");
        assert!(Config::from_yaml(&missing_host).is_err());
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = Config::from_yaml(YAML).unwrap();
        let b = Config::from_yaml(YAML).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);

        let c = Config::from_yaml(&YAML.replace("write_limit: 8", "write_limit: 9")).unwrap();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.database, "shop");
    }
}
