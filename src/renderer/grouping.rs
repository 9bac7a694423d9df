use super::blend::{BlendId, BlendRegistry};
use super::DrawPass;
use crate::assets::TextureHandle;
use crate::object::ModelObject;
use smallvec::SmallVec;

/// Render state shared by every mesh of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshStateKey {
    pub texture: TextureHandle,
    pub blend: BlendId,
    pub two_sided: bool,
}

#[derive(Debug, Clone)]
pub struct MeshGroup {
    pub key: MeshStateKey,
    pub meshes: SmallVec<[usize; 4]>,
}

/// Custom blend by name first, then the blend-mesh default, then opaque.
pub fn resolve_blend(object: &ModelObject, mesh: usize, registry: &BlendRegistry) -> BlendId {
    let custom = object
        .model
        .as_ref()
        .and_then(|model| model.meshes.get(mesh))
        .and_then(|mesh| mesh.blending_mode.as_deref())
        .and_then(|name| registry.resolve(name));
    if let Some(blend) = custom {
        return blend;
    }
    if object.is_blend_mesh(mesh) {
        return object.blend_mesh_state.unwrap_or_else(|| blend_mesh_default(object, mesh));
    }
    BlendId::Opaque
}

fn blend_mesh_default(object: &ModelObject, mesh: usize) -> BlendId {
    if object.meshes.get(mesh).is_some_and(|slot| slot.has_alpha()) {
        BlendId::AlphaBlend
    } else {
        BlendId::Additive
    }
}

/// Buckets the meshes drawn in `pass` by render state. Groups and the meshes inside
/// them keep first-seen order.
pub fn group_meshes(object: &ModelObject, pass: DrawPass, registry: &BlendRegistry) -> SmallVec<[MeshGroup; 4]> {
    let mut groups: SmallVec<[MeshGroup; 4]> = SmallVec::new();
    let Some(model) = object.model.as_ref() else {
        return groups;
    };
    for index in 0..model.meshes.len() {
        let Some(slot) = object.meshes.get(index) else {
            continue;
        };
        if object.is_hidden_mesh(index) {
            continue;
        }
        let blend_mesh = object.is_blend_mesh(index);
        if object.low_quality && blend_mesh {
            continue;
        }
        let translucent = slot.has_alpha() || blend_mesh;
        if translucent != (pass == DrawPass::Translucent) {
            continue;
        }
        let Some(texture) = slot.texture else {
            continue;
        };
        if slot.cache.buffers().is_none() {
            continue;
        }

        let key = MeshStateKey {
            texture: texture.handle,
            blend: resolve_blend(object, index, registry),
            two_sided: object.is_two_sided(index),
        };
        match groups.iter_mut().find(|group| group.key == key) {
            Some(group) => group.meshes.push(index),
            None => {
                let mut meshes = SmallVec::new();
                meshes.push(index);
                groups.push(MeshGroup { key, meshes });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::TextureInfo;
    use crate::model::ModelBuilder;
    use crate::object::{MeshSelector, ObjectClass};
    use crate::renderer::device::BufferId;
    use crate::skinning::MeshBufferCache;

    fn texture(handle: u32, has_alpha: bool) -> TextureInfo {
        TextureInfo { handle: TextureHandle(handle), has_alpha, hidden: false, bright: false }
    }

    fn object_with(textures: &[TextureInfo]) -> ModelObject {
        let mut builder = ModelBuilder::new("grouped");
        for _ in textures {
            builder = builder.quad(Some("tex.png"), 0, 1.0);
        }
        let mut object = ModelObject::new("grouped", ObjectClass::Other);
        object.model = Some(builder.shared());
        for (i, info) in textures.iter().enumerate() {
            let mut slot = crate::object::MeshSlot { texture: Some(*info), ..Default::default() };
            slot.cache = MeshBufferCache {
                vertex_buffer: Some(BufferId(i as u64 * 2 + 1)),
                index_buffer: Some(BufferId(i as u64 * 2 + 2)),
                index_count: 6,
                valid: true,
                ..Default::default()
            };
            object.meshes.push(slot);
        }
        object
    }

    #[test]
    fn shared_state_lands_in_one_group() {
        let object = object_with(&[texture(1, false), texture(2, false), texture(1, false)]);
        let groups = group_meshes(&object, DrawPass::Solid, &BlendRegistry::new());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].meshes.as_slice(), &[0, 2]);
        assert_eq!(groups[1].meshes.as_slice(), &[1]);
    }

    #[test]
    fn alpha_textures_move_to_translucent_pass() {
        let object = object_with(&[texture(1, false), texture(2, true)]);
        let registry = BlendRegistry::new();
        let solid = group_meshes(&object, DrawPass::Solid, &registry);
        let translucent = group_meshes(&object, DrawPass::Translucent, &registry);
        assert_eq!(solid.len(), 1);
        assert_eq!(translucent.len(), 1);
        assert!(translucent[0].key.two_sided);
        assert_eq!(translucent[0].key.blend, BlendId::Opaque);
    }

    #[test]
    fn blend_meshes_default_by_alpha_and_vanish_in_low_quality() {
        let mut object = object_with(&[texture(1, false), texture(2, true)]);
        object.blend_mesh = MeshSelector::All;
        let registry = BlendRegistry::new();
        let groups = group_meshes(&object, DrawPass::Translucent, &registry);
        assert_eq!(groups[0].key.blend, BlendId::Additive);
        assert_eq!(groups[1].key.blend, BlendId::AlphaBlend);
        object.low_quality = true;
        assert!(group_meshes(&object, DrawPass::Translucent, &registry).is_empty());
    }

    #[test]
    fn custom_blend_name_wins() {
        let mut object = object_with(&[texture(1, false)]);
        let mut model = (**object.model.as_ref().expect("model")).clone();
        model.meshes[0].blending_mode = Some("Multiply".into());
        object.model = Some(std::sync::Arc::new(model));
        assert_eq!(resolve_blend(&object, 0, &BlendRegistry::new()), BlendId::Multiply);
        assert!(object.is_two_sided(0));
    }

    #[test]
    fn hidden_and_unbuffered_meshes_are_excluded() {
        let mut object = object_with(&[texture(1, false), texture(1, false)]);
        object.hidden_mesh = MeshSelector::Index(0);
        object.meshes[1].cache = MeshBufferCache::default();
        assert!(group_meshes(&object, DrawPass::Solid, &BlendRegistry::new()).is_empty());
    }
}
