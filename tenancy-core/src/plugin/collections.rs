use crate::access::SharedRule;
use crate::globals::GlobalConfig;
use crate::hooks::{CollectionHooks, HookStage, SharedHook};
use crate::policies::Operation;

/// Declared access rules of a collection.
#[derive(Clone, Default)]
pub struct CollectionAccess {
    pub create: Option<SharedRule>,
    pub read: Option<SharedRule>,
    pub update: Option<SharedRule>,
    pub delete: Option<SharedRule>,
    /// Admin panel visibility (auth collections).
    pub admin: Option<SharedRule>,
}

impl CollectionAccess {
    pub fn get(&self, op: Operation) -> Option<&SharedRule> {
        match op {
            Operation::Create => self.create.as_ref(),
            Operation::Read => self.read.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }

    pub fn set(&mut self, op: Operation, rule: SharedRule) {
        let slot = match op {
            Operation::Create => &mut self.create,
            Operation::Read => &mut self.read,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        };
        *slot = Some(rule);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Path (`/media`) or absolute URL files are served from.
    pub static_url: String,
}

/// A collection as declared by the application.
#[derive(Clone)]
pub struct CollectionConfig {
    pub slug: String,
    /// Holds authenticated users.
    pub auth: bool,
    pub upload: Option<UploadConfig>,
    pub versions: bool,
    pub hidden: bool,
    pub access: CollectionAccess,
    pub hooks: CollectionHooks,
}

impl CollectionConfig {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            auth: false,
            upload: None,
            versions: false,
            hidden: false,
            access: CollectionAccess::default(),
            hooks: CollectionHooks::new(),
        }
    }

    pub fn auth(mut self) -> Self {
        self.auth = true;
        self
    }

    pub fn upload(mut self, static_url: impl Into<String>) -> Self {
        self.upload = Some(UploadConfig {
            static_url: static_url.into(),
        });
        self
    }

    pub fn with_versions(mut self) -> Self {
        self.versions = true;
        self
    }

    pub fn with_access(mut self, op: Operation, rule: SharedRule) -> Self {
        self.access.set(op, rule);
        self
    }

    pub fn with_admin(mut self, rule: SharedRule) -> Self {
        self.access.admin = Some(rule);
        self
    }

    pub fn with_hook(mut self, stage: HookStage, hook: SharedHook) -> Self {
        self.hooks.push(stage, hook);
        self
    }
}

/// Everything the plugin transforms.
#[derive(Clone, Default)]
pub struct AppConfig {
    pub collections: Vec<CollectionConfig>,
    pub globals: Vec<GlobalConfig>,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, collection: CollectionConfig) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn global(mut self, global: GlobalConfig) -> Self {
        self.globals.push(global);
        self
    }
}

/// How the plugin treats a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Tenants,
    Users,
    Shared,
    Resource,
    /// Hidden per-tenant rows backing a global.
    GlobalRows,
}
