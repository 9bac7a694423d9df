use crate::model::ModelAsset;
use anyhow::{anyhow, Result};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Opaque identity of a GPU texture owned by the texture provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Everything model rendering needs to know about one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub handle: TextureHandle,
    /// Texture carries an alpha channel (RGBA), which makes the mesh two-sided and translucent.
    pub has_alpha: bool,
    /// Texture script hides the mesh entirely.
    pub hidden: bool,
    /// Texture script marks the mesh as a glowing blend mesh.
    pub bright: bool,
}

pub type PrepareFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

pub trait AssetProvider {
    /// `None` is a valid answer, e.g. an empty equipment slot.
    fn model(&self, id: &str) -> Option<Arc<ModelAsset>>;

    /// Resolves a mesh's texture reference against its model.
    fn texture_path(&self, model: &ModelAsset, mesh_texture: &str) -> String {
        let _ = model;
        mesh_texture.to_string()
    }
}

pub trait TextureProvider {
    /// Makes `path` resident so later `texture` calls do not stall.
    fn prepare<'a>(&'a self, path: &'a str) -> PrepareFuture<'a>;
    fn texture(&self, path: &str) -> Option<TextureInfo>;
}

/// In-memory registry of models and textures with retain/release bookkeeping.
pub struct AssetManager {
    models: HashMap<String, Arc<ModelAsset>>,
    model_refs: HashMap<String, usize>,
    textures: HashMap<String, TextureInfo>,
    prepared: RefCell<HashSet<String>>,
    next_handle: u32,
    prepare_calls: Cell<u64>,
    lazy_fetches: Cell<u64>,
}

impl Default for AssetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetManager {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            model_refs: HashMap::new(),
            textures: HashMap::new(),
            prepared: RefCell::new(HashSet::new()),
            next_handle: 1,
            prepare_calls: Cell::new(0),
            lazy_fetches: Cell::new(0),
        }
    }

    pub fn insert_model(&mut self, key: &str, model: ModelAsset) -> Arc<ModelAsset> {
        let model = Arc::new(model);
        self.models.insert(key.to_string(), Arc::clone(&model));
        model
    }

    pub fn retain_model(&mut self, key: &str) -> Result<Arc<ModelAsset>> {
        let model = self.models.get(key).cloned().ok_or_else(|| anyhow!("Model '{key}' is not registered"))?;
        *self.model_refs.entry(key.to_string()).or_insert(0) += 1;
        Ok(model)
    }

    /// Drops one reference; the model is unloaded once nothing retains it. Returns true on unload.
    pub fn release_model(&mut self, key: &str) -> bool {
        let Some(count) = self.model_refs.get_mut(key) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return false;
        }
        self.model_refs.remove(key);
        self.models.remove(key).is_some()
    }

    pub fn model_ref_count(&self, key: &str) -> usize {
        self.model_refs.get(key).copied().unwrap_or(0)
    }

    pub fn register_texture(&mut self, path: &str, has_alpha: bool) -> TextureHandle {
        self.register_scripted_texture(path, has_alpha, false, false)
    }

    pub fn register_scripted_texture(&mut self, path: &str, has_alpha: bool, hidden: bool, bright: bool) -> TextureHandle {
        if let Some(existing) = self.textures.get_mut(path) {
            existing.has_alpha = has_alpha;
            existing.hidden = hidden;
            existing.bright = bright;
            return existing.handle;
        }
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.textures.insert(path.to_string(), TextureInfo { handle, has_alpha, hidden, bright });
        handle
    }

    pub fn is_prepared(&self, path: &str) -> bool {
        self.prepared.borrow().contains(path)
    }

    pub fn prepare_calls(&self) -> u64 {
        self.prepare_calls.get()
    }

    /// Texture lookups that happened before the texture was prepared.
    pub fn lazy_fetches(&self) -> u64 {
        self.lazy_fetches.get()
    }
}

impl AssetProvider for AssetManager {
    fn model(&self, id: &str) -> Option<Arc<ModelAsset>> {
        self.models.get(id).cloned()
    }

    fn texture_path(&self, model: &ModelAsset, mesh_texture: &str) -> String {
        match model.name.rfind('/') {
            Some(split) if !mesh_texture.contains('/') => format!("{}/{}", &model.name[..split], mesh_texture),
            _ => mesh_texture.to_string(),
        }
    }
}

impl TextureProvider for AssetManager {
    fn prepare<'a>(&'a self, path: &'a str) -> PrepareFuture<'a> {
        Box::pin(async move {
            self.prepare_calls.set(self.prepare_calls.get() + 1);
            if !self.textures.contains_key(path) {
                return Err(anyhow!("Texture '{path}' is not registered"));
            }
            self.prepared.borrow_mut().insert(path.to_string());
            Ok(())
        })
    }

    fn texture(&self, path: &str) -> Option<TextureInfo> {
        let info = self.textures.get(path).copied()?;
        if !self.is_prepared(path) {
            self.lazy_fetches.set(self.lazy_fetches.get() + 1);
        }
        Some(info)
    }
}
