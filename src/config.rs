use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("quizo".to_string())
}

fn default_use_transactions() -> bool {
    env::var("MONGODB_TRANSACTIONS")
        .map(|it| it != "0" && !it.eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

/// Smallest accepted `join_code_length`.
pub const MIN_JOIN_CODE_LENGTH: usize = 4;

fn default_join_code_length() -> usize {
    6
}

#[cfg(debug_assertions)]
fn default_admin_usernames() -> Vec<String> {
    vec![String::from("admin")]
}
#[cfg(not(debug_assertions))]
fn default_admin_usernames() -> Vec<String> {
    vec![]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    /// Multi-document transactions need a replica set; standalone servers
    /// must turn this off.
    #[serde(default = "default_use_transactions")]
    pub use_transactions: bool,

    #[serde(default = "default_join_code_length")]
    pub join_code_length: usize,

    /// Users registering with one of these names are made admins.
    #[serde(default = "default_admin_usernames")]
    pub admin_usernames: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            use_transactions: default_use_transactions(),
            join_code_length: default_join_code_length(),
            admin_usernames: default_admin_usernames(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        Self::load_from(config_dir())
    }

    pub fn load_from(dir: impl AsRef<Path>) -> Result<Config, ConfigurationError> {
        let dir = dir.as_ref();
        let config_file =
            util::find_first_subpath(dir, &["settings.yml", "settings.yaml"], Path::exists)
                .ok_or_else(|| ConfigurationError::NotFound(dir.to_path_buf()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.join_code_length < MIN_JOIN_CODE_LENGTH {
            return Err(ConfigurationError::Invalid(format!(
                "join_code_length must be at least {}, got {}",
                MIN_JOIN_CODE_LENGTH, self.join_code_length
            )));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}
