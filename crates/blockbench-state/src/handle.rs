//! SurrealDB Handle - Connection and Schema
//!
//! Supports both local (in-memory) and remote (WebSocket) connections. The
//! storage trait implementations live in `surreal_store`.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

const DEFAULT_NAMESPACE: &str = "blockbench";
const DEFAULT_DATABASE: &str = "registry";

/// Configuration for a remote SurrealDB connection
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// WebSocket endpoint URL (e.g., "wss://db.example.com")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "blockbench")
    pub namespace: String,
    /// Database name (default: "registry")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl RemoteConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "blockbench")
    /// - SURREALDB_DATABASE (optional, default: "registry")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB connection handle
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect_url("mem://").await
    }

    /// Connect to a remote SurrealDB with credentials
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn setup_remote(config: RemoteConfig) -> Result<Self> {
        info!("Connecting to remote SurrealDB (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        let handle = SurrealHandle { db };
        handle.init_schema().await?;

        info!("Remote SurrealDB connected and schema initialized");
        Ok(handle)
    }

    /// Open (or create) an on-disk SurrealKV database at `path`.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn setup_local(path: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        let url = format!("surrealkv://{}", path.display());
        info!("Using local persistence: {}", url);
        Self::connect_url(&url).await
    }

    /// Connect using environment variables
    ///
    /// If SURREALDB_ENDPOINT is set, connects with credentials.
    /// If SURREALDB_URL is set, connects to that URL.
    /// If BLOCKBENCH_DB_PATH is set, opens a local SurrealKV store there.
    /// Otherwise, falls back to in-memory.
    #[instrument(skip_all)]
    pub async fn setup_from_env() -> Result<Self> {
        if let Ok(config) = RemoteConfig::from_env() {
            info!("Remote config found");
            return Self::setup_remote(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            return Self::connect_url(&url).await;
        }

        if let Ok(path) = std::env::var("BLOCKBENCH_DB_PATH") {
            return Self::setup_local(std::path::Path::new(&path)).await;
        }

        info!("No remote config found, using in-memory database");
        Self::setup_db().await
    }

    async fn connect_url(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let handle = SurrealHandle { db };
        handle.init_schema().await?;
        Ok(handle)
    }

    /// Access the underlying client.
    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Initialize tables and indexes. Idempotent.
    async fn init_schema(&self) -> Result<()> {
        debug!("Initializing BlockBench schema");

        let schema = r#"
            -- Block identities
            DEFINE TABLE IF NOT EXISTS blocks SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_block_slug ON blocks FIELDS slug UNIQUE;
            DEFINE INDEX IF NOT EXISTS idx_block_id ON blocks FIELDS block_id UNIQUE;

            -- Block versions (digest is immutable once written)
            DEFINE TABLE IF NOT EXISTS block_versions SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_version_id ON block_versions FIELDS version_id UNIQUE;
            DEFINE INDEX IF NOT EXISTS idx_block_version ON block_versions FIELDS block_id, version UNIQUE;
            DEFINE INDEX IF NOT EXISTS idx_version_status ON block_versions FIELDS status;

            -- Pipeline runs
            DEFINE TABLE IF NOT EXISTS pipeline_runs SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_run_id ON pipeline_runs FIELDS run_id UNIQUE;
            DEFINE INDEX IF NOT EXISTS idx_run_status ON pipeline_runs FIELDS status;

            -- Reviews
            DEFINE TABLE IF NOT EXISTS reviews SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_review_id ON reviews FIELDS review_id UNIQUE;
            DEFINE INDEX IF NOT EXISTS idx_review_target ON reviews FIELDS target_id;

            -- Paper candidates
            DEFINE TABLE IF NOT EXISTS paper_candidates SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_candidate_id ON paper_candidates FIELDS candidate_id UNIQUE;
        "#;

        self.db
            .query(schema)
            .await
            .and_then(|response| response.check())
            .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

        debug!("Schema initialized successfully");
        Ok(())
    }
}
