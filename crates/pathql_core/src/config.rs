use std::collections::HashMap;
use std::sync::LazyLock;

use pathql_error::{QueryError, Result, ResultExt};
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::value::ScalarValue;

pub const DEFAULT_CHUNK_SIZE: usize = 64;
pub const DEFAULT_MAX_CHUNKS: usize = 16;
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Configuration for compiling and executing queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub dialect: Dialect,
    /// Run join extraction and From-Item rollup.
    pub enable_optimizer: bool,
    pub cache: CacheConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            dialect: Dialect::generic(),
            enable_optimizer: true,
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Rows per cache chunk.
    pub chunk_size: usize,
    /// Chunks fetched when filling the cache for one key.
    pub max_chunks: usize,
    /// Maximum number of cached keys.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Maximum rows held for a single key.
    pub fn max_cached_rows(&self) -> usize {
        self.chunk_size * self.max_chunks
    }
}

impl CompilerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse compiler config")
    }

    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| QueryError::config(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    /// Set a value from its textual form, e.g. from a command line flag.
    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<()> {
        let scalar = if let Ok(v) = value.parse::<i64>() {
            ScalarValue::Int64(v)
        } else if value.eq_ignore_ascii_case("true") {
            ScalarValue::Boolean(true)
        } else if value.eq_ignore_ascii_case("false") {
            ScalarValue::Boolean(false)
        } else {
            ScalarValue::Utf8(value.to_string())
        };
        self.set_from_scalar(name, scalar)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| QueryError::config(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();
        let scalar = def_conf.get_as_scalar(name)?;
        self.set_from_scalar(name, scalar)
    }
}

/// Name and description of every setting, sorted by name.
pub fn all_settings() -> Vec<(&'static str, &'static str)> {
    let mut settings: Vec<_> = GET_SET_FUNCTIONS
        .iter()
        .map(|(name, funcs)| (*name, funcs.description))
        .collect();
    settings.sort_by_key(|(name, _)| *name);
    settings
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()>,
    get: fn(conf: &CompilerConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: CompilerSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: CompilerSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<DialectName>(&mut map);
    insert_setting::<EnableOptimizer>(&mut map);
    insert_setting::<CacheEnabled>(&mut map);
    insert_setting::<CacheChunkSize>(&mut map);
    insert_setting::<CacheMaxChunks>(&mut map);
    insert_setting::<CacheCapacity>(&mut map);

    map
});

pub trait CompilerSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()>;
    fn get_as_scalar(conf: &CompilerConfig) -> ScalarValue;
}

fn try_as_bool(name: &str, scalar: &ScalarValue) -> Result<bool> {
    match scalar {
        ScalarValue::Boolean(v) => Ok(*v),
        other => Err(QueryError::config(format!(
            "Setting '{name}' expects a boolean, got {other}"
        ))),
    }
}

fn try_as_usize_in(name: &str, scalar: &ScalarValue, min: usize, max: usize) -> Result<usize> {
    let v = scalar.try_as_i64().ok_or_else(|| {
        QueryError::config(format!("Setting '{name}' expects an integer, got {scalar}"))
    })?;
    if v < min as i64 || v > max as i64 {
        return Err(QueryError::config(format!(
            "Setting '{name}' must be between {min} and {max}, got {v}"
        )));
    }
    Ok(v as usize)
}

pub struct DialectName;

impl CompilerSetting for DialectName {
    const NAME: &'static str = "dialect";
    const DESCRIPTION: &'static str = "SQL dialect of the generated statements";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()> {
        let name = scalar.try_as_str().ok_or_else(|| {
            QueryError::config(format!("Setting '{}' expects a string", Self::NAME))
        })?;
        conf.dialect = Dialect::from_name(name)?;
        Ok(())
    }

    fn get_as_scalar(conf: &CompilerConfig) -> ScalarValue {
        conf.dialect.name.clone().into()
    }
}

pub struct EnableOptimizer;

impl CompilerSetting for EnableOptimizer {
    const NAME: &'static str = "enable_optimizer";
    const DESCRIPTION: &'static str = "Controls if join elimination is enabled";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()> {
        conf.enable_optimizer = try_as_bool(Self::NAME, &scalar)?;
        Ok(())
    }

    fn get_as_scalar(conf: &CompilerConfig) -> ScalarValue {
        conf.enable_optimizer.into()
    }
}

pub struct CacheEnabled;

impl CompilerSetting for CacheEnabled {
    const NAME: &'static str = "cache_enabled";
    const DESCRIPTION: &'static str = "Controls if query results may be cached";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()> {
        conf.cache.enabled = try_as_bool(Self::NAME, &scalar)?;
        Ok(())
    }

    fn get_as_scalar(conf: &CompilerConfig) -> ScalarValue {
        conf.cache.enabled.into()
    }
}

pub struct CacheChunkSize;

impl CompilerSetting for CacheChunkSize {
    const NAME: &'static str = "cache_chunk_size";
    const DESCRIPTION: &'static str = "Number of rows per cache chunk";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()> {
        conf.cache.chunk_size = try_as_usize_in(Self::NAME, &scalar, 1, 4096)?;
        Ok(())
    }

    fn get_as_scalar(conf: &CompilerConfig) -> ScalarValue {
        (conf.cache.chunk_size as i64).into()
    }
}

pub struct CacheMaxChunks;

impl CompilerSetting for CacheMaxChunks {
    const NAME: &'static str = "cache_max_chunks";
    const DESCRIPTION: &'static str = "Maximum number of chunks cached per query and arguments";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()> {
        conf.cache.max_chunks = try_as_usize_in(Self::NAME, &scalar, 1, usize::MAX >> 1)?;
        Ok(())
    }

    fn get_as_scalar(conf: &CompilerConfig) -> ScalarValue {
        (conf.cache.max_chunks as i64).into()
    }
}

pub struct CacheCapacity;

impl CompilerSetting for CacheCapacity {
    const NAME: &'static str = "cache_capacity";
    const DESCRIPTION: &'static str = "Maximum number of cached result sets";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut CompilerConfig) -> Result<()> {
        conf.cache.capacity = try_as_usize_in(Self::NAME, &scalar, 1, usize::MAX >> 1)?;
        Ok(())
    }

    fn get_as_scalar(conf: &CompilerConfig) -> ScalarValue {
        (conf.cache.capacity as i64).into()
    }
}
