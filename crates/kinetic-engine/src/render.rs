//! Renderer seam and a headless implementation.
//!
//! The runtime never inspects pixels. It asks the [`Renderer`] for a sprite
//! handle, attaches and detaches it, moves it to follow its entity and reads
//! its display bounds for sprite collision.

use std::collections::{BTreeMap, HashMap};

use kinetic_core::entity::{AssetHandle, Size, Transform};
use kinetic_core::sprite::Rect;

/// Options for [`GameWorld::show_sprite`](crate::world::GameWorld::show_sprite).
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteOptions {
    /// Texture id known to the renderer.
    pub texture: String,
    /// Draw order; higher values are drawn on top.
    pub z_index: i32,
}

impl SpriteOptions {
    pub fn new(texture: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            z_index: 0,
        }
    }

    pub fn z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }
}

/// The visual side of the runtime.
pub trait Renderer {
    /// Create a sprite for `texture`. `None` if the texture is unknown.
    fn sprite(&mut self, texture: &str, z_index: i32) -> Option<AssetHandle>;

    /// Put a sprite on screen.
    fn add(&mut self, handle: AssetHandle);

    /// Take a sprite off screen and release it.
    fn remove(&mut self, handle: AssetHandle);

    /// Bounds of a sprite in device coordinates.
    fn display_bounds(&self, handle: AssetHandle) -> Option<Rect>;

    /// Move a sprite to an entity's transform (world units).
    fn place(&mut self, handle: AssetHandle, transform: &Transform);

    /// Device pixels per world unit, if the renderer knows it.
    fn device_scale(&self) -> Option<f64> {
        None
    }
}

// ---------------------------------------------------------------------------
// HeadlessRenderer
// ---------------------------------------------------------------------------

/// A sprite tracked by the [`HeadlessRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteState {
    pub texture: String,
    pub z_index: i32,
    pub size: Size,
    pub transform: Transform,
    pub attached: bool,
}

/// Renderer that keeps sprite state in memory. Used for tests, servers and
/// replays.
#[derive(Debug, Clone)]
pub struct HeadlessRenderer {
    scale: f64,
    textures: HashMap<String, Size>,
    sprites: BTreeMap<u64, SpriteState>,
    next_handle: u64,
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl HeadlessRenderer {
    /// `scale` converts world units to device pixels.
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            textures: HashMap::new(),
            sprites: BTreeMap::new(),
            next_handle: 0,
        }
    }

    /// Make a texture available, with its size in world units.
    pub fn register_texture(&mut self, id: impl Into<String>, width: f64, height: f64) {
        self.textures.insert(id.into(), Size { width, height });
    }

    pub fn with_texture(mut self, id: impl Into<String>, width: f64, height: f64) -> Self {
        self.register_texture(id, width, height);
        self
    }

    pub fn sprite_state(&self, handle: AssetHandle) -> Option<&SpriteState> {
        self.sprites.get(&handle.0)
    }

    pub fn is_attached(&self, handle: AssetHandle) -> bool {
        self.sprite_state(handle).is_some_and(|s| s.attached)
    }

    /// Number of sprites currently on screen.
    pub fn attached_count(&self) -> usize {
        self.sprites.values().filter(|s| s.attached).count()
    }

    /// Attached sprites in draw order (z-index, then creation order).
    pub fn draw_list(&self) -> Vec<AssetHandle> {
        let mut list: Vec<(i32, u64)> = self
            .sprites
            .iter()
            .filter(|(_, s)| s.attached)
            .map(|(&raw, s)| (s.z_index, raw))
            .collect();
        list.sort_unstable();
        list.into_iter().map(|(_, raw)| AssetHandle(raw)).collect()
    }
}

impl Renderer for HeadlessRenderer {
    fn sprite(&mut self, texture: &str, z_index: i32) -> Option<AssetHandle> {
        let size = *self.textures.get(texture)?;
        self.next_handle += 1;
        self.sprites.insert(
            self.next_handle,
            SpriteState {
                texture: texture.to_owned(),
                z_index,
                size,
                transform: Transform::default(),
                attached: false,
            },
        );
        Some(AssetHandle(self.next_handle))
    }

    fn add(&mut self, handle: AssetHandle) {
        match self.sprites.get_mut(&handle.0) {
            Some(sprite) => sprite.attached = true,
            None => tracing::warn!(handle = handle.0, "tried to add an unknown sprite"),
        }
    }

    fn remove(&mut self, handle: AssetHandle) {
        if self.sprites.remove(&handle.0).is_none() {
            tracing::warn!(handle = handle.0, "tried to remove an unknown sprite");
        }
    }

    fn display_bounds(&self, handle: AssetHandle) -> Option<Rect> {
        let sprite = self.sprites.get(&handle.0)?;
        Some(Rect::new(
            sprite.transform.x * self.scale,
            sprite.transform.y * self.scale,
            sprite.size.width * self.scale,
            sprite.size.height * self.scale,
        ))
    }

    fn place(&mut self, handle: AssetHandle, transform: &Transform) {
        if let Some(sprite) = self.sprites.get_mut(&handle.0) {
            sprite.transform = *transform;
        }
    }

    fn device_scale(&self) -> Option<f64> {
        Some(self.scale)
    }
}
