//! 存储配置模块
//!
//! 提供配置驱动的存储创建，支持：
//! - TOML/JSON 配置文件加载
//! - 文件 + 环境变量（`IFS__` 前缀）分层加载
//! - 配置验证（validator + 槽位布局解析）
//!
//! ```toml
//! default_author = "archive"
//!
//! [[stores]]
//! id = "mods"
//! kind = "versioning_metadata"
//! base_dir = "/data/metadata/mods"
//! slot_layout = "4-2-2"
//! repository_dir = "/data/history/mods"
//! ```

use crate::error::{Result, StoreError};
use crate::storage::files::FileStore;
use crate::storage::metadata_store::{MetadataOptions, MetadataStore};
use crate::storage::registry::{RegisteredStore, StoreRegistry};
use crate::storage::slot::SlotLayout;
use crate::storage::store::Store;
use crate::storage::versioning::{LocalHistoryRepository, VersioningMetadataStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::Validate;

/// 环境变量前缀，例如 `IFS__DEFAULT_AUTHOR`
pub const ENV_PREFIX: &str = "IFS";

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Metadata,
    VersioningMetadata,
    Files,
}

/// 单个存储的配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    /// 存储 ID（注册表中的键）
    #[validate(length(min = 1, max = 100))]
    pub id: String,

    pub kind: StoreKind,

    /// 存储根目录
    pub base_dir: PathBuf,

    /// 槽位布局，例如 `4-2-2`
    #[serde(default = "default_slot_layout")]
    #[validate(length(min = 1, max = 64))]
    pub slot_layout: String,

    /// 文件名前缀；元数据存储默认为 `<id>_`，文件存储默认为空
    #[serde(default)]
    pub prefix: Option<String>,

    /// 文件名后缀；元数据存储默认为 `.xml`
    #[serde(default)]
    pub suffix: Option<String>,

    /// 强制内容为 XML
    #[serde(default = "default_true")]
    pub force_xml: bool,

    #[serde(default)]
    pub force_doc_type: Option<String>,

    /// 是否格式化输出 XML
    #[serde(default = "default_true")]
    pub pretty: bool,

    /// 版本库目录（仅 versioning_metadata）
    #[serde(default)]
    pub repository_dir: Option<PathBuf>,

    /// 提交作者；未设置时使用全局 `default_author`
    #[serde(default)]
    #[validate(length(min = 1, max = 100))]
    pub author: Option<String>,
}

fn default_slot_layout() -> String {
    "4-2-2".to_string()
}

fn default_true() -> bool {
    true
}

fn default_author() -> String {
    "ifs-store".to_string()
}

impl StoreConfig {
    pub fn layout(&self) -> Result<SlotLayout> {
        self.slot_layout.parse()
    }

    pub fn effective_prefix(&self) -> String {
        match (&self.prefix, self.kind) {
            (Some(prefix), _) => prefix.clone(),
            (None, StoreKind::Files) => String::new(),
            (None, _) => format!("{}_", self.id),
        }
    }

    pub fn effective_suffix(&self) -> String {
        match (&self.suffix, self.kind) {
            (Some(suffix), _) => suffix.clone(),
            (None, StoreKind::Files) => String::new(),
            (None, _) => ".xml".to_string(),
        }
    }

    pub fn metadata_options(&self) -> MetadataOptions {
        MetadataOptions {
            force_xml: self.force_xml,
            force_doc_type: self.force_doc_type.clone(),
            pretty: self.pretty,
        }
    }

    /// 验证单个存储配置
    pub fn check(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| {
            StoreError::configuration(format!("Invalid configuration of store {}: {}", self.id, e))
        })?;
        if self.base_dir.as_os_str().is_empty() {
            return Err(StoreError::configuration(format!(
                "Store {} has no base_dir",
                self.id
            )));
        }
        self.layout()?;
        if self.kind == StoreKind::VersioningMetadata && self.repository_dir.is_none() {
            return Err(StoreError::configuration(format!(
                "Versioning store {} needs a repository_dir",
                self.id
            )));
        }
        Ok(())
    }

    /// 按配置打开存储（目录不存在时创建）
    pub fn open(&self, default_author: &str) -> Result<RegisteredStore> {
        self.check()?;
        let store = Store::new(
            self.id.clone(),
            self.base_dir.clone(),
            self.layout()?,
            self.effective_prefix(),
            self.effective_suffix(),
        )?;

        let opened = match self.kind {
            StoreKind::Metadata => MetadataStore::new(store, self.metadata_options()).into(),
            StoreKind::VersioningMetadata => {
                let repository_dir = self.repository_dir.clone().ok_or_else(|| {
                    StoreError::configuration(format!(
                        "Versioning store {} needs a repository_dir",
                        self.id
                    ))
                })?;
                let author = self.author.as_deref().unwrap_or(default_author);
                let repository = LocalHistoryRepository::open(repository_dir, author)?;
                VersioningMetadataStore::new(
                    MetadataStore::new(store, self.metadata_options()),
                    Arc::new(repository),
                )
                .into()
            }
            StoreKind::Files => FileStore::new(store).into(),
        };
        Ok(opened)
    }
}

/// 全部存储的配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoresConfig {
    #[serde(default = "default_author")]
    #[validate(length(min = 1, max = 100))]
    pub default_author: String,

    #[serde(default)]
    #[validate(nested)]
    pub stores: Vec<StoreConfig>,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            default_author: default_author(),
            stores: Vec::new(),
        }
    }
}

impl StoresConfig {
    /// 从 TOML 文件加载配置
    ///
    /// # Errors
    /// 如果文件不存在或格式错误，返回 `Configuration` 错误
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            StoreError::configuration(format!("Failed to parse TOML config {}: {}", path.display(), e))
        })?;

        tracing::info!("Loaded store configuration from: {}", path.display());
        Ok(config)
    }

    /// 从 JSON 文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            StoreError::configuration(format!("Failed to parse JSON config {}: {}", path.display(), e))
        })?;

        tracing::info!("Loaded store configuration from: {}", path.display());
        Ok(config)
    }

    /// 分层加载：配置文件（格式由扩展名决定），再由 `IFS__*` 环境变量覆盖
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|built| built.try_deserialize::<Self>())
            .map_err(|e| {
                StoreError::configuration(format!("Failed to load config {}: {}", path.display(), e))
            })?;

        tracing::info!("Loaded layered store configuration from: {}", path.display());
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| {
            StoreError::configuration(format!("Failed to serialize config to TOML: {}", e))
        })?;

        std::fs::write(path, content)
            .map_err(|e| StoreError::io_error("Failed to write config file", path, e))?;

        tracing::info!("Saved store configuration to: {}", path.display());
        Ok(())
    }

    /// 验证配置
    ///
    /// # Errors
    /// 字段无效、槽位布局无法解析或存储 ID 重复时返回 `Configuration` 错误
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| StoreError::configuration(format!("Invalid store configuration: {}", e)))?;

        let mut seen = HashSet::new();
        for store in &self.stores {
            store.check()?;
            if !seen.insert(store.id.as_str()) {
                return Err(StoreError::configuration(format!(
                    "Store id {} is configured twice",
                    store.id
                )));
            }
        }

        tracing::debug!("Store configuration validated successfully");
        Ok(())
    }

    /// 打开全部存储并注册到 `registry`
    pub fn build(&self, registry: &StoreRegistry) -> Result<Vec<RegisteredStore>> {
        self.validate()?;
        self.stores
            .iter()
            .map(|store| {
                let opened = store.open(&self.default_author)?;
                registry.register(opened)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_toml(root: &Path) -> String {
        format!(
            r#"
default_author = "archive"

[[stores]]
id = "mods"
kind = "versioning_metadata"
base_dir = "{root}/mods"
repository_dir = "{root}/history"

[[stores]]
id = "derivate"
kind = "files"
base_dir = "{root}/derivate"
slot_layout = "2-2"
"#,
            root = root.display()
        )
    }

    #[test]
    fn test_defaults_per_kind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stores.toml");
        std::fs::write(&path, sample_toml(temp_dir.path())).unwrap();

        let config = StoresConfig::from_toml_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_author, "archive");

        let mods = &config.stores[0];
        assert_eq!(mods.slot_layout, "4-2-2");
        assert_eq!(mods.effective_prefix(), "mods_");
        assert_eq!(mods.effective_suffix(), ".xml");
        assert!(mods.force_xml);

        let derivate = &config.stores[1];
        assert_eq!(derivate.effective_prefix(), "");
        assert_eq!(derivate.effective_suffix(), "");
    }

    #[test]
    fn test_build_registers_stores() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stores.toml");
        std::fs::write(&path, sample_toml(temp_dir.path())).unwrap();

        let registry = StoreRegistry::new();
        let config = StoresConfig::load(&path).unwrap();
        let stores = config.build(&registry).unwrap();

        assert_eq!(stores.len(), 2);
        assert!(registry.versioning("mods").is_some());
        assert!(registry.files("derivate").is_some());
    }

    #[test]
    fn test_invalid_layout_is_configuration_error() {
        let config = StoresConfig {
            stores: vec![StoreConfig {
                id: "bad".to_string(),
                kind: StoreKind::Metadata,
                base_dir: PathBuf::from("/tmp/bad"),
                slot_layout: "4--2".to_string(),
                prefix: None,
                suffix: None,
                force_xml: true,
                force_doc_type: None,
                pretty: true,
                repository_dir: None,
                author: None,
            }],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StoreError::Configuration(_))));
    }

    #[test]
    fn test_versioning_requires_repository() {
        let json = r#"{"stores":[{"id":"v","kind":"versioning_metadata","base_dir":"/tmp/v"}]}"#;
        let config: StoresConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(StoreError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"stores":[
            {"id":"a","kind":"metadata","base_dir":"/tmp/a"},
            {"id":"a","kind":"files","base_dir":"/tmp/b"}
        ]}"#;
        let config: StoresConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(StoreError::Configuration(_))));
    }

    #[test]
    fn test_json_and_toml_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let toml_path = temp_dir.path().join("stores.toml");
        std::fs::write(&toml_path, sample_toml(temp_dir.path())).unwrap();
        let config = StoresConfig::from_toml_file(&toml_path).unwrap();

        let saved = temp_dir.path().join("saved.toml");
        config.save_to_toml(&saved).unwrap();
        let reloaded = StoresConfig::from_toml_file(&saved).unwrap();
        assert_eq!(reloaded.stores.len(), 2);

        let json_path = temp_dir.path().join("stores.json");
        std::fs::write(&json_path, serde_json::to_string(&config).unwrap()).unwrap();
        let from_json = StoresConfig::from_json_file(&json_path).unwrap();
        assert_eq!(from_json.stores[1].id, "derivate");
    }
}
