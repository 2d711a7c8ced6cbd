use thiserror::Error;

/// The closed set of error kinds the engine surfaces to its caller.
///
/// Recovery policy: errors scoped to one blocking strategy or one candidate
/// pair are absorbed by the caller and counted, never propagated as this
/// type. Everything that reaches a `Result<_, Error>` boundary is fatal to
/// the current run.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration: unknown field, missing threshold, weights
    /// that cannot yield a finite log-odds (`m_prob`/`u_prob` in {0,1}),
    /// an identifier that fails the `[A-Za-z_][A-Za-z0-9_]*` grammar.
    #[error("configuration error: {0}")]
    Config(String),

    /// Index/view creation failed. `artifacts` lists what was already
    /// created before the failure, so a caller can decide whether to retry
    /// just the missing piece.
    #[error("setup error: {message} (created: {artifacts:?})")]
    Setup {
        message: String,
        artifacts: Vec<String>,
    },

    /// A referenced collection, view, analyzer, or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record/edge/cluster store round-trip failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// An input pair or record violates a structural invariant (duplicated
    /// id, edge endpoint missing, `a == b`). The caller drops the item and
    /// counts it; the run continues.
    #[error("validation error: {0}")]
    Validation(String),

    /// Explicit cancellation. Not a failure: terminates the run with
    /// whatever partial results were already written.
    #[error("run cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("tantivy query parse error: {0}")]
    TantivyQuery(#[from] tantivy::query::QueryParserError),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
