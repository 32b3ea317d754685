use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "datacenters file not found. Looked in:\n\
        - $CLUSTERNET_DATACENTERS\n\
        - ./datacenters.yaml, ./datacenters.yml\n\
        - ./.clusternet/datacenters.yaml\n\
        - ~/.config/clusternet/datacenters.yaml"
    )]
    DatacentersFileNotFound,

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid datacenter {name:?}: {message}")]
    InvalidDatacenter { name: String, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
