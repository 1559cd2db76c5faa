use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Consensus-critical parameters, named after the environment variables in
/// spec §6. Loaded once at startup and treated as an immutable record for
/// the lifetime of the process — changing these after genesis changes the
/// chain's rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub base_mining_reward: f64,
    pub base_difficulty: u32,
    pub max_difficulty: u32,
    pub difficulty_adjustment_interval: u64,
    pub halving_interval: u64,
    pub target_block_time: f64,
    pub max_pending_transactions: usize,
    pub min_transaction_fee: f64,
    pub max_block_size: usize,
    pub mining_timeout: u64,
    pub max_chain_reorg_depth: u64,
    pub block_validation_depth: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            base_mining_reward: 50.0,
            base_difficulty: 4,
            max_difficulty: 20,
            difficulty_adjustment_interval: 10,
            halving_interval: 100,
            target_block_time: 10.0,
            max_pending_transactions: 1000,
            min_transaction_fee: 0.001,
            max_block_size: 100,
            mining_timeout: 300,
            max_chain_reorg_depth: 10,
            block_validation_depth: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub api_port: u16,
    pub bind_address: String,
    pub db_path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            bind_address: "0.0.0.0".to_string(),
            db_path: "./cadcoin_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_secs: i64,
    pub enable_rate_limiting: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiry_secs: 86_400,
            enable_rate_limiting: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    pub node: NodeConfig,
    pub consensus: ConsensusConfig,
    pub security: SecurityConfig,
}

impl LedgerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;
        config.try_deserialize()
    }

    /// Load configuration, preferring `cadcoin.toml` in the working
    /// directory if present, then applying `CADCOIN__*` environment
    /// overrides (double underscore separates nested keys).
    pub fn load_with_overrides(config_file: Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        let file_path = config_file.unwrap_or_else(|| "cadcoin.toml".to_string());
        if Path::new(&file_path).exists() {
            builder = builder.add_source(File::from(Path::new(&file_path)));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CADCOIN")
                .separator("__")
                .try_parsing(true),
        );
        let built = builder.build()?;
        match built.try_deserialize::<LedgerConfig>() {
            Ok(cfg) => Ok(cfg),
            Err(_) if !Path::new(&file_path).exists() => Ok(LedgerConfig::default()),
            Err(e) => Err(e),
        }
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, toml_string)
    }

    pub fn validate(&self) -> Result<(), String> {
        let c = &self.consensus;
        if c.base_mining_reward <= 0.0 {
            return Err("base_mining_reward must be positive".into());
        }
        if c.base_difficulty == 0 {
            return Err("base_difficulty must be nonzero".into());
        }
        if c.max_difficulty < c.base_difficulty {
            return Err("max_difficulty must be >= base_difficulty".into());
        }
        if c.difficulty_adjustment_interval == 0 {
            return Err("difficulty_adjustment_interval must be nonzero".into());
        }
        if c.halving_interval == 0 {
            return Err("halving_interval must be nonzero".into());
        }
        if c.target_block_time <= 0.0 {
            return Err("target_block_time must be positive".into());
        }
        if c.max_pending_transactions == 0 {
            return Err("max_pending_transactions must be nonzero".into());
        }
        if c.min_transaction_fee < 0.0 {
            return Err("min_transaction_fee must be non-negative".into());
        }
        if c.max_block_size < 2 {
            return Err("max_block_size must allow at least one transaction plus the reward".into());
        }
        if c.mining_timeout == 0 {
            return Err("mining_timeout must be nonzero".into());
        }
        if self.node.api_port == 0 {
            return Err("api_port must be nonzero".into());
        }
        Ok(())
    }

    pub fn print_effective_config(&self) {
        tracing::info!(
            bind = %format!("{}:{}", self.node.bind_address, self.node.api_port),
            db_path = %self.node.db_path,
            base_mining_reward = self.consensus.base_mining_reward,
            base_difficulty = self.consensus.base_difficulty,
            max_difficulty = self.consensus.max_difficulty,
            target_block_time = self.consensus.target_block_time,
            halving_interval = self.consensus.halving_interval,
            max_block_size = self.consensus.max_block_size,
            mining_timeout = self.consensus.mining_timeout,
            rate_limiting = self.security.enable_rate_limiting,
            "effective configuration"
        );
    }
}
