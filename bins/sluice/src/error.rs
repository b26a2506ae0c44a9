use sluice_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("'{0}' is not a .sql file")]
    NotSqlFile(String),

    #[error("read '{path}': {source}")]
    ReadQuery {
        path: String,
        source: std::io::Error,
    },

    #[error("no query given, pass --sql or --file")]
    NoQuery,

    #[error("write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("interrupted")]
    Interrupted,
}
